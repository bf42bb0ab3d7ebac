//! Subburn - translated, burned-in subtitles for videos
//!
//! Composition root: builds the media encoder and speech translator once and
//! hands them to the pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use subburn::audio::AudioExtractor;
use subburn::cli::{Args, Commands, ConfigAction};
use subburn::config::{Config, TranslatorImplementation};
use subburn::media::{MediaEncoder, MediaEncoderFactory};
use subburn::pipeline::Pipeline;
use subburn::segment::plan_chunks;
use subburn::setup::SetupManager;
use subburn::source::SourceVideo;
use subburn::subtitle::SubtitleRenderer;
use subburn::transcribe::{SpeechTranslator, SpeechTranslatorFactory};

const STATE_DIR: &str = ".subburn";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = setup_logging(args.verbose)?;

    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Process { input, filename, output, chunk_duration, workers, unique, json } => {
            if let Some(seconds) = chunk_duration {
                config.segment.chunk_duration = seconds;
            }
            if let Some(workers) = workers {
                config.pipeline.workers = workers;
            }
            if let Some(output) = output {
                config.pipeline.output_path = output;
            }
            config.pipeline.unique_output |= unique;
            config.validate()?;

            let source = if input == Path::new("-") {
                let filename = filename.unwrap_or_default();
                SourceVideo::receive(tokio::io::stdin(), &filename, None).await?
            } else {
                SourceVideo::open(&input)?
            };

            let encoder = create_encoder(&config).await?;
            let translator = create_translator(&config).await?;

            let pipeline = Pipeline::new(&config, Arc::clone(&encoder), Arc::clone(&translator))?;
            let outcome = pipeline.run(source).await;

            translator.shutdown().await?;
            let report = outcome?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} ({} chunks, {} with subtitles)",
                    report.output_path.display(),
                    report.chunk_count(),
                    report.overlay_count()
                );
            }
        }
        Commands::Plan { input, chunk_duration } => {
            let chunk_duration = chunk_duration.unwrap_or(config.segment.chunk_duration);
            let encoder = create_encoder(&config).await?;
            let media = encoder.probe(&input).await?;
            let spans = plan_chunks(media.duration, chunk_duration)?;

            println!(
                "{}: {:.3}s, {} fps",
                input.display(),
                media.duration,
                media.frame_rate.map(|f| format!("{:.3}", f)).unwrap_or_else(|| "?".to_string())
            );
            println!("{:<8} {:<12} {:<12} {:<10}", "Chunk", "Start", "End", "Length");
            println!("{}", "-".repeat(44));
            for span in spans {
                println!(
                    "{:<8} {:<12.3} {:<12.3} {:<10.3}",
                    span.index, span.start, span.end, span.duration()
                );
            }
        }
        Commands::Extract { input } => {
            let encoder = create_encoder(&config).await?;
            let audio = AudioExtractor::new(encoder).extract_audio(&input).await?;
            println!("{}", audio.display());
        }
        Commands::Translate { input } => {
            let translator = create_translator(&config).await?;
            let outcome = translator.translate(&input).await;
            translator.shutdown().await?;
            println!("{}", outcome?);
        }
        Commands::Render { input, text } => {
            let encoder = create_encoder(&config).await?;
            let renderer = SubtitleRenderer::new(encoder, config.subtitle.clone());
            let output = renderer.render_subtitles(&input, &text).await?;
            println!("{}", output.display());
        }
        Commands::Check => {
            let encoder = create_encoder(&config).await?;
            println!("ffmpeg: {}", encoder.get_version_info().await?);

            let translator = create_translator(&config).await?;
            println!("speech model: {} ({})", config.translator.model, config.translator.binary_path);
            translator.shutdown().await?;
        }
        Commands::Models { download } => {
            let setup = SetupManager::new(STATE_DIR)?;
            let models = setup.get_available_models();

            println!("\nAvailable Whisper Models:");
            println!("{:<15} {:<20} {:<10} {:<10}", "Name", "Filename", "Size (MB)", "Status");
            println!("{}", "-".repeat(65));

            for model in &models {
                let status = if setup.resolve_model_path(&model.name).is_some() {
                    "Downloaded"
                } else {
                    "Missing"
                };
                println!("{:<15} {:<20} {:<10.1} {:<10}", model.name, model.filename, model.size_mb, status);
            }

            if download {
                for model in &models {
                    if setup.resolve_model_path(&model.name).is_none() {
                        setup.download_model(model).await?;
                    }
                }
                info!("All models downloaded successfully");
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to replace it)", path.display());
                }
                Config::default().save_to_file(&path)?;
                println!("Wrote {}", path.display());
            }
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

/// `--config`, else `./subburn.toml` when present, else defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new("subburn.toml").exists() => {
            info!("Found subburn.toml in current directory, loading...");
            Config::from_file("subburn.toml")?
        }
        None => Config::default(),
    };
    Ok(config)
}

async fn create_encoder(config: &Config) -> Result<Arc<dyn MediaEncoder>> {
    let timeout = Duration::from_secs(config.pipeline.tool_timeout_secs);
    let encoder: Arc<dyn MediaEncoder> = MediaEncoderFactory::create_encoder(config.media.clone(), timeout).into();
    encoder.check_availability().await?;
    Ok(encoder)
}

async fn create_translator(config: &Config) -> Result<Arc<dyn SpeechTranslator>> {
    let timeout = Duration::from_secs(config.pipeline.tool_timeout_secs);

    let model_path: Option<PathBuf> = match config.translator.implementation {
        TranslatorImplementation::WhisperCpp => {
            let setup = SetupManager::new(STATE_DIR)?;
            Some(setup.ensure_model(&config.translator.model).await?)
        }
        TranslatorImplementation::OpenAI => None,
    };

    let translator = SpeechTranslatorFactory::initialize(config.translator.clone(), model_path, timeout).await?;
    Ok(translator.into())
}

/// Log to the console and to a daily file under `.subburn/log`
fn setup_logging(verbose: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(STATE_DIR).join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "subburn.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr; stdout carries command results
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("subburn.log").display());

    Ok(guard)
}
