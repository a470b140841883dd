//! Media analysis worker binary.

use std::path::PathBuf;
use std::time::Duration;

use afya_models::{JobId, ProcessingType};
use afya_worker::{JobExecutor, SubmitRequest, WorkerConfig, DEFAULT_LANGUAGE};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "afya-worker", about = "Multi-modal media analysis for health education")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a video as a background job and print the final result.
    Analyze {
        file: PathBuf,
        /// frames, audio or comprehensive
        #[arg(long = "type", default_value = "comprehensive")]
        processing_type: ProcessingType,
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        lang: String,
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Describe a single image.
    Image {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        lang: String,
    },
    /// Transcribe and analyze a voice note.
    Voice {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        lang: String,
    },
    /// Answer a typed health question.
    Query {
        text: String,
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        lang: String,
    },
    /// Translate text into another language.
    Translate {
        text: String,
        #[arg(long)]
        lang: String,
    },
    /// Print the text visible in an image.
    Ocr { file: PathBuf },
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let executor = JobExecutor::from_env(config).context("failed to create job executor")?;

    match cli.command {
        Command::Analyze {
            file,
            processing_type,
            lang,
            job_id,
        } => {
            let mut request = SubmitRequest::new(file, processing_type).with_language(lang);
            if let Some(id) = job_id {
                request = request.with_job_id(JobId::from_string(id));
            }
            let job_id = executor.submit(request)?;
            info!(job_id = %job_id, "Submitted job");

            let view = loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal");
                        executor.cancel(&job_id)?;
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                let view = executor.status(&job_id)?;
                if view.status.is_terminal() {
                    break view;
                }
            };

            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Image { file, lang } => {
            let analysis = executor.analyze_image(&file, &lang).await?;
            println!("{}", analysis);
        }
        Command::Voice { file, lang } => {
            let result = executor.process_voice(&file, &lang).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Query { text, lang } => {
            println!("{}", executor.answer_query(&text, &lang).await?);
        }
        Command::Translate { text, lang } => {
            println!("{}", executor.translate(&text, &lang).await?);
        }
        Command::Ocr { file } => {
            println!("{}", executor.extract_text(&file).await?);
        }
    }

    executor.shutdown().await;
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("afya=info,warn"))?;

    // Results go to stdout, logs to stderr.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
