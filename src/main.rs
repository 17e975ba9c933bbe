use anyhow::Context;
use clap::{Parser, Subcommand};
use sms_preprocess::config::{PreprocessConfig, ServerConfig};
use sms_preprocess::engines::EngineRegistry;
use sms_preprocess::{server, Preprocessor};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sms-preprocess")]
#[command(about = "Prepare SMS screenshots and photos for OCR")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Maximum accepted file size in bytes (default: 10MB)
    #[arg(long, global = true, env = "SMS_MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,

    /// JSON file overriding quality, rotation and enhancement thresholds
    #[arg(long, global = true, env = "SMS_THRESHOLDS")]
    pub thresholds: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Preprocess a single image file
    Process {
        file: PathBuf,

        /// Write `<name>_processed.png` next to the other processed outputs
        #[arg(long)]
        save: bool,

        /// Directory for --save (default: uploads/processed)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Run the default OCR engine on the processed image
        #[arg(long)]
        ocr: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the preprocessing pipeline over HTTP
    Serve {
        /// Host address to bind to
        #[arg(long, env = "SMS_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "SMS_PORT", default_value = "3000")]
        port: u16,
    },
}

impl Cli {
    fn preprocess_config(&self) -> anyhow::Result<PreprocessConfig> {
        let mut config = match &self.thresholds {
            Some(path) => PreprocessConfig::from_json_file(path)
                .with_context(|| format!("Failed to load thresholds from {}", path.display()))?,
            None => PreprocessConfig::default(),
        };
        if let Some(max) = self.max_file_size {
            config.max_file_size = max;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.preprocess_config()?;

    match cli.command {
        Command::Process {
            file,
            save,
            output_dir,
            ocr,
            json,
        } => {
            // Image work is CPU bound; keep it off the async workers
            tokio::task::spawn_blocking(move || {
                process_file(config, file, save, output_dir, ocr, json)
            })
            .await?
        }
        Command::Serve { host, port } => {
            tracing::info!("Starting sms-preprocess v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Binding to {}:{}", host, port);

            let engines = EngineRegistry::load().unwrap_or_else(|e| {
                tracing::warn!("OCR engines unavailable, /ocr will fail: {}", e);
                EngineRegistry::empty()
            });

            server::run(
                ServerConfig {
                    host,
                    port,
                    preprocess: config,
                },
                engines,
            )
            .await
        }
    }
}

fn process_file(
    config: PreprocessConfig,
    file: PathBuf,
    save: bool,
    output_dir: Option<PathBuf>,
    ocr: bool,
    json: bool,
) -> anyhow::Result<()> {
    let preprocessor = Preprocessor::new(config);
    let result = preprocessor
        .process(&file)
        .with_context(|| format!("Failed to preprocess {}", file.display()))?;

    let saved = if save {
        Some(preprocessor.save_processed(&result, &file, output_dir.as_deref())?)
    } else {
        None
    };

    let ocr_output = if ocr {
        let engines = EngineRegistry::load()?;
        let engine = engines
            .default_engine()
            .context("No OCR engine compiled into this build")?;
        Some(engine.recognize(&result.processed.image)?)
    } else {
        None
    };

    if json {
        let report = serde_json::json!({
            "result": result,
            "saved_to": saved,
            "ocr": ocr_output,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{}: grade {} ({:.1}%), rotated {}°, {}x{} in {}ms",
        file.display(),
        result.quality.grade,
        result.quality.overall_score * 100.0,
        result.rotation.angle.degrees(),
        result.processed.width,
        result.processed.height,
        result.total_time_ms
    );
    for suggestion in &result.quality.suggestions {
        println!("  suggestion: {}", suggestion.action);
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    if let Some(path) = saved {
        println!("  saved: {}", path.display());
    }
    if let Some(output) = ocr_output {
        println!("  ocr confidence: {:.2}", output.confidence);
        println!("{}", output.text);
    }

    Ok(())
}
