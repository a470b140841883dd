//! Frame-by-frame visual analysis with a final summary.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use afya_media::{CancelToken, Frame, SampledFrames};
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, AnalyzerResult, InferenceResult};
use crate::gemini::{ImagePayload, InferenceClient};
use crate::prompts;

const JPEG_QUALITY: u8 = 85;

/// Runs one vision call per frame, then one summary call.
pub struct VisionAnalyzer {
    client: Arc<dyn InferenceClient>,
}

impl VisionAnalyzer {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }

    /// Analyze every frame in order and summarize the results.
    ///
    /// Failed frames are skipped. `on_progress(done, total)` is called after
    /// each frame. Fails with [`AnalysisError::NoUsableFrames`] when no frame
    /// produced text; falls back to the per-frame texts when the summary fails.
    pub async fn analyze_frames<F>(
        &self,
        frames: SampledFrames,
        language: &str,
        cancel: &CancelToken,
        on_progress: F,
    ) -> AnalyzerResult<String>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let total = frames.total();
        let mut analyses = Vec::with_capacity(total);

        for (i, frame) in frames.enumerate() {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            let n = i + 1;
            match self.analyze_frame(frame, n, total).await {
                Ok(Some(text)) => analyses.push(text),
                Ok(None) => {}
                Err(e) => warn!(frame = n, "Skipping frame: {}", e),
            }
            on_progress(n, total);
        }

        if analyses.is_empty() {
            return Err(AnalysisError::NoUsableFrames);
        }

        let joined = analyses.join("\n\n");

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let prompt = prompts::summary_prompt(analyses.len(), &joined, language);
        match self.client.generate_text(&prompt).await {
            Ok(summary) => {
                info!(frames = analyses.len(), "Visual summary generated");
                Ok(summary)
            }
            Err(e) => {
                warn!("Summary call failed, returning per-frame analyses: {}", e);
                Ok(joined)
            }
        }
    }

    /// Returns `Ok(None)` for a frame whose answer was blank.
    async fn analyze_frame(
        &self,
        frame: Frame,
        n: usize,
        total: usize,
    ) -> AnalyzerResult<Option<String>> {
        let timestamp = frame.timestamp;
        let index = frame.index;
        let data = tokio::task::spawn_blocking(move || encode_jpeg(&frame))
            .await
            .map_err(|e| AnalysisError::InvalidImage(format!("encoder task failed: {}", e)))??;

        debug!(frame = n, index, bytes = data.len(), "Analyzing frame");
        let text = self
            .client
            .describe_image(
                &prompts::frame_prompt(n, total, timestamp),
                &ImagePayload::jpeg(data),
            )
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "{}\n{}",
            prompts::frame_header(n, timestamp),
            text
        )))
    }

    /// Analyze a standalone image file.
    ///
    /// Text read off the image first is passed along with it; a failed or
    /// empty extraction only drops that part of the prompt.
    pub async fn analyze_image(&self, path: &Path, language: &str) -> AnalyzerResult<String> {
        let payload = load_image(path).await?;

        let extracted = match self.read_text(&payload).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!("Text extraction failed, analyzing image alone: {}", e);
                None
            }
        };

        let text = self
            .client
            .describe_image(
                &prompts::image_prompt(language, extracted.as_deref()),
                &payload,
            )
            .await?;
        Ok(text)
    }

    /// Return the text visible in an image file.
    pub async fn extract_text(&self, path: &Path) -> AnalyzerResult<String> {
        let payload = load_image(path).await?;
        Ok(self.read_text(&payload).await?)
    }

    async fn read_text(&self, payload: &ImagePayload) -> InferenceResult<String> {
        let text = self
            .client
            .describe_image(prompts::TEXT_EXTRACTION_PROMPT, payload)
            .await?;
        Ok(text.trim().to_string())
    }
}

async fn load_image(path: &Path) -> AnalyzerResult<ImagePayload> {
    let data = tokio::fs::read(path).await?;
    let format = image::guess_format(&data)
        .map_err(|e| AnalysisError::InvalidImage(format!("{}: {}", path.display(), e)))?;

    Ok(ImagePayload {
        mime_type: format.to_mime_type().to_string(),
        data,
    })
}

fn encode_jpeg(frame: &Frame) -> AnalyzerResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&frame.image)
        .map_err(|e| AnalysisError::InvalidImage(e.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers image prompts by frame number; fails the listed frames.
    struct FakeVision {
        failing_frames: Vec<usize>,
        summary_fails: bool,
        image_calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeVision {
        fn new(failing_frames: Vec<usize>, summary_fails: bool) -> Self {
            Self {
                failing_frames,
                summary_fails,
                image_calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InferenceClient for FakeVision {
        async fn generate_text(&self, prompt: &str) -> InferenceResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.summary_fails {
                Err(InferenceError::Timeout)
            } else {
                Ok("overall summary".to_string())
            }
        }

        async fn describe_image(
            &self,
            prompt: &str,
            image: &ImagePayload,
        ) -> InferenceResult<String> {
            let n = self.image_calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(image.mime_type, "image/jpeg");
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.failing_frames.contains(&n) {
                Err(InferenceError::EmptyResponse)
            } else {
                Ok(format!("saw frame {n}"))
            }
        }
    }

    fn frames(count: u64) -> SampledFrames {
        SampledFrames::from_frames(
            (0..count)
                .map(|i| Frame {
                    index: i * 2,
                    timestamp: i as f64,
                    image: RgbImage::new(8, 8),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_summary_over_all_frames() {
        let client = Arc::new(FakeVision::new(vec![], false));
        let analyzer = VisionAnalyzer::new(client.clone());
        let progress = Mutex::new(Vec::new());

        let summary = analyzer
            .analyze_frames(frames(3), "en", &CancelToken::never(), |done, total| {
                progress.lock().unwrap().push((done, total))
            })
            .await
            .unwrap();

        assert_eq!(summary, "overall summary");
        assert_eq!(*progress.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Frame 1/3 at 0.00 seconds"));
        assert!(prompts[2].starts_with("Frame 3/3 at 2.00 seconds"));
        assert!(prompts[3].contains("Frame 2 Analysis (at 1.00s):\nsaw frame 2"));
    }

    #[tokio::test]
    async fn test_failed_frames_are_skipped() {
        let client = Arc::new(FakeVision::new(vec![1, 3], false));
        let analyzer = VisionAnalyzer::new(client.clone());

        analyzer
            .analyze_frames(frames(3), "en", &CancelToken::never(), |_, _| {})
            .await
            .unwrap();

        let prompts = client.prompts.lock().unwrap();
        let summary_prompt = prompts.last().unwrap();
        assert!(summary_prompt.contains("analyzed 1 frames"));
        assert!(!summary_prompt.contains("Frame 1 Analysis"));
        assert!(summary_prompt.contains("Frame 2 Analysis"));
    }

    #[tokio::test]
    async fn test_all_frames_failing_is_no_usable_frames() {
        let client = Arc::new(FakeVision::new(vec![1, 2], false));
        let analyzer = VisionAnalyzer::new(client);

        let err = analyzer
            .analyze_frames(frames(2), "en", &CancelToken::never(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoUsableFrames));
    }

    #[tokio::test]
    async fn test_summary_failure_returns_concatenation() {
        let client = Arc::new(FakeVision::new(vec![], true));
        let analyzer = VisionAnalyzer::new(client);

        let text = analyzer
            .analyze_frames(frames(2), "en", &CancelToken::never(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(
            text,
            "Frame 1 Analysis (at 0.00s):\nsaw frame 1\n\nFrame 2 Analysis (at 1.00s):\nsaw frame 2"
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_between_frames() {
        let client = Arc::new(FakeVision::new(vec![], false));
        let analyzer = VisionAnalyzer::new(client.clone());
        let (source, token) = CancelToken::new();

        let err = analyzer
            .analyze_frames(frames(3), "en", &token, |done, _| {
                if done == 1 {
                    source.cancel();
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Cancelled));
        assert_eq!(client.image_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_image_detects_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        RgbImage::new(4, 4).save(&path).unwrap();

        struct PngCheck;
        #[async_trait]
        impl InferenceClient for PngCheck {
            async fn generate_text(&self, _prompt: &str) -> InferenceResult<String> {
                unreachable!()
            }
            async fn describe_image(
                &self,
                _prompt: &str,
                image: &ImagePayload,
            ) -> InferenceResult<String> {
                Ok(image.mime_type.clone())
            }
        }

        let analyzer = VisionAnalyzer::new(Arc::new(PngCheck));
        assert_eq!(analyzer.analyze_image(&path, "en").await.unwrap(), "image/png");
    }

    /// Reads a fixed label off any image and records the prompts it saw.
    struct Label {
        text: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceClient for Label {
        async fn generate_text(&self, _prompt: &str) -> InferenceResult<String> {
            unreachable!()
        }

        async fn describe_image(
            &self,
            prompt: &str,
            _image: &ImagePayload,
        ) -> InferenceResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt == prompts::TEXT_EXTRACTION_PROMPT {
                self.text.map(str::to_string).ok_or(InferenceError::Timeout)
            } else {
                Ok("described".to_string())
            }
        }
    }

    fn photo(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("leaflet.jpg");
        RgbImage::new(4, 4).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_extracted_text_feeds_image_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo(dir.path());
        let client = Arc::new(Label {
            text: Some(" TAKE ONE DAILY \n"),
            prompts: Mutex::new(Vec::new()),
        });
        let analyzer = VisionAnalyzer::new(client.clone());

        assert_eq!(analyzer.extract_text(&path).await.unwrap(), "TAKE ONE DAILY");
        assert_eq!(analyzer.analyze_image(&path, "en").await.unwrap(), "described");

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("Text extracted from the image:\nTAKE ONE DAILY"));
    }

    #[tokio::test]
    async fn test_failed_extraction_still_describes_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo(dir.path());
        let client = Arc::new(Label {
            text: None,
            prompts: Mutex::new(Vec::new()),
        });
        let analyzer = VisionAnalyzer::new(client.clone());

        assert_eq!(analyzer.analyze_image(&path, "en").await.unwrap(), "described");
        assert!(matches!(
            analyzer.extract_text(&path).await,
            Err(AnalysisError::Inference(InferenceError::Timeout))
        ));
        assert!(!client.prompts.lock().unwrap()[1].contains("Text extracted"));
    }
}
