use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use backend_infrastructure::CONFIG_PATH_ENV;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "killfeed-ingest")]
#[command(about = "Killmail stream ingestion service", long_about = None)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write logs to daily-rotated files in this directory instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn init_tracing(args: &Args) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (writer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "killfeed-ingest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    match args.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(&args);

    if let Some(config) = &args.config {
        std::env::set_var(CONFIG_PATH_ENV, config);
    }

    backend_bootstrap::run_standalone().await
}
