use std::{path::PathBuf, sync::Mutex};
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod open_telemetry;
use open_telemetry::init_otel_layer;

pub const SERVICE_NAME: &str = "model-comparator";

fn init_env_layer(default_directive: &str) -> tracing_subscriber::EnvFilter {
    match dotenv() {
        Ok(path) => eprintln!(".env read successfully from {}", path.display()),
        Err(e) => eprintln!("Could not load .env file: {e}"),
    };

    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.into())
}

/// Log to stderr. `RUST_LOG` overrides `default_directive`.
pub fn init_tracing_to_stderr(default_directive: &str) {
    let env_layer = init_env_layer(default_directive);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true);

    let telemetry_layer = init_otel_layer();

    tracing_subscriber::registry()
        .with(env_layer)
        .with(stderr_layer)
        .with(telemetry_layer)
        .init();
}

/// Log to `<log_dir>/app.log`, falling back to stderr when the file cannot be created.
pub fn init_tracing_to_file(log_dir: PathBuf, default_directive: &str) {
    let file = match std::fs::create_dir_all(&log_dir)
        .and_then(|_| std::fs::File::create(log_dir.join("app.log")))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create log file in {}: {}", log_dir.display(), e);
            init_tracing_to_stderr(default_directive);
            return;
        }
    };

    let env_layer = init_env_layer(default_directive);

    let file_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let telemetry_layer = init_otel_layer();

    tracing_subscriber::registry()
        .with(env_layer)
        .with(file_log_layer)
        .with(telemetry_layer)
        .init();
}
