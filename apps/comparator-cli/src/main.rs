use clap::{Parser, Subcommand};
use comparator::{
    available_models, parse_model_requests, ComparatorConfig, ImagePayload, Orchestrator,
};
use std::{path::PathBuf, time::Duration};
use tracing::info;

const DEFAULT_LOG_DIRECTIVE: &str = "comparator=info,llm=info,ai=info";

#[derive(Parser)]
#[command(name = "comparator-cli")]
#[command(about = "Compare multimodal models on the same image")]
#[command(version)]
struct Cli {
    /// Write logs to <LOG_DIR>/app.log instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every model on an image and print the comparison as JSON
    Compare {
        /// Image file to describe
        image: PathBuf,

        /// Models to compare, e.g. '[{"provider":"gemini"},{"provider":"ollama","model_name":"gemma3:4b"}]'
        #[arg(short, long)]
        models: String,

        /// Declared content type of the image, must start with image/
        #[arg(long)]
        content_type: Option<String>,

        /// Per model inference timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Skip image-text matching, every model gets an itm score of 0
        #[arg(long)]
        no_itm: bool,

        /// Pretty print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List providers and the models they are known to serve
    Models,
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.log_dir.clone() {
        Some(log_dir) => analytics_tracing::init_tracing_to_file(log_dir, DEFAULT_LOG_DIRECTIVE),
        None => analytics_tracing::init_tracing_to_stderr(DEFAULT_LOG_DIRECTIVE),
    }

    match cli.command {
        Commands::Models => print_json(&available_models(), true),
        Commands::Compare {
            image,
            models,
            content_type,
            timeout_secs,
            no_itm,
            pretty,
        } => {
            let mut config = ComparatorConfig::from_env()?;
            if let Some(v) = timeout_secs {
                config.inference_timeout = Duration::from_secs(v);
            }
            if no_itm {
                config.itm.disabled = true;
            }

            let requests = parse_model_requests(&models)?;

            let bytes = tokio::fs::read(&image).await?;
            let filename = image.file_name().map(|v| v.to_string_lossy().to_string());
            let payload =
                ImagePayload::from_bytes(bytes, filename.as_deref(), content_type.as_deref())?;
            info!(
                "loaded {} image {}x{}",
                payload.metadata().format,
                payload.metadata().width,
                payload.metadata().height
            );

            let orchestrator = Orchestrator::from_config(config);
            let response = orchestrator.compare(&requests, &payload).await?;

            print_json(&response, pretty)
        }
    }
}
