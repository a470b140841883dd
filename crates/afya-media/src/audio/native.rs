//! In-process audio decoding with symphonia.

use async_trait::async_trait;
use rubato::{FftFixedIn, Resampler};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::{AudioStrategy, AudioTrack, StrategyError, TARGET_SAMPLE_RATE};
use crate::cancel::CancelToken;
use crate::error::{MediaError, MediaResult};

const STRATEGY_NAME: &str = "native-decode";

/// Demux and decode the first audio track without leaving the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDecodeStrategy;

#[async_trait]
impl AudioStrategy for NativeDecodeStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn extract(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<AudioTrack, StrategyError> {
        if cancel.is_cancelled() {
            return Err(StrategyError::Cancelled);
        }

        let input = input.to_path_buf();
        let output = output.to_path_buf();
        let decoded =
            tokio::task::spawn_blocking(move || decode_to_wav(&input, &output, STRATEGY_NAME))
                .await
                .map_err(|e| StrategyError::failed(format!("decoder task failed: {}", e)))?;

        match decoded {
            Ok(track) => Ok(track),
            Err(MediaError::NoAudioTrack) => Err(StrategyError::NoAudioStream),
            Err(e) => Err(StrategyError::failed(e.to_string())),
        }
    }
}

/// Decode any supported audio or video file into a mono 16 kHz 16-bit WAV.
///
/// Blocking; call from `spawn_blocking` in async code.
fn decode_to_wav(input: &Path, output: &Path, strategy: &str) -> MediaResult<AudioTrack> {
    let (samples, source_rate) = decode_mono(input)?;
    if samples.is_empty() {
        return Err(MediaError::decode("Audio stream decoded to zero samples"));
    }

    let samples = if source_rate != TARGET_SAMPLE_RATE {
        debug!(
            "Resampling from {}Hz to {}Hz ({} samples)",
            source_rate,
            TARGET_SAMPLE_RATE,
            samples.len()
        );
        resample(&samples, source_rate, TARGET_SAMPLE_RATE)?
    } else {
        samples
    };

    write_wav(output, &samples)?;

    Ok(AudioTrack {
        path: PathBuf::from(output),
        sample_rate: TARGET_SAMPLE_RATE,
        channels: 1,
        bits_per_sample: 16,
        duration: samples.len() as f64 / TARGET_SAMPLE_RATE as f64,
        strategy: strategy.to_string(),
    })
}

/// Decode the first audio track to mono f32 samples at its native rate.
fn decode_mono(path: &Path) -> MediaResult<(Vec<f32>, u32)> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MediaError::decode(format!("Failed to probe container: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or(MediaError::NoAudioTrack)?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let sample_rate = codec_params.sample_rate.ok_or(MediaError::NoAudioTrack)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::decode(format!("Failed to create audio decoder: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::decode(format!("Error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(MediaError::decode(format!("Decoder failed: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        mono.extend(
            sample_buf
                .samples()
                .chunks(channels)
                .map(|chunk| chunk.iter().sum::<f32>() / channels as f32),
        );
    }

    Ok((mono, sample_rate))
}

/// Resample mono audio, aligned so output sample 0 matches input sample 0.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> MediaResult<Vec<f32>> {
    let resample_err = |e: rubato::ResampleError| MediaError::decode(format!("Resampling failed: {}", e));

    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, 1024, 2, 1)
        .map_err(|e| MediaError::decode(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + delay + 2048);

    let mut chunks = samples.chunks_exact(resampler.input_frames_next());
    for chunk in chunks.by_ref() {
        let frames_out = resampler.process(&[chunk], None).map_err(resample_err)?;
        output.extend_from_slice(&frames_out[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let frames_out = resampler
            .process_partial(Some(&[rest][..]), None)
            .map_err(resample_err)?;
        output.extend_from_slice(&frames_out[0]);
    }

    // Flush what the filter still holds.
    while output.len() < expected + delay {
        let frames_out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(resample_err)?;
        if frames_out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames_out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected.max(1).min(output.len()));
    Ok(output)
}

fn write_wav(path: &Path, samples: &[f32]) -> MediaResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_err = |e: hound::Error| MediaError::decode(format!("Failed to write WAV: {}", e));
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}
