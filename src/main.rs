use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use factray_relay::{
    config::{Config, LogFormat, TransportVariant},
    AnalysisRunner,
};

#[derive(Parser, Debug)]
#[command(name = "factray-relay", version, about = "Stream a video fact-check analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a video and print the final workflow state as JSON
    Analyze {
        /// Shorts or watch URL of the video
        video_url: String,

        /// Channel variant: stage or event (defaults to TRANSPORT_VARIANT)
        #[arg(long)]
        variant: Option<TransportVariant>,
    },

    /// Check that the backend is reachable
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "FactRay relay starting...");

    let default_variant = config.backend.variant;
    let runner = match AnalysisRunner::new(config) {
        Ok(r) => {
            info!(base_url = %r.backend().base_url(), "Backend client initialized");
            r
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize backend client");
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Health => match runner.health().await {
            Ok(status) => {
                info!(status = %status.status, "Backend healthy");
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            Err(e) => {
                error!(error = %e, "Health check failed");
                return Err(e.into());
            }
        },
        Command::Analyze { video_url, variant } => {
            let variant = variant.unwrap_or(default_variant);
            match runner.run(&video_url, variant).await {
                Ok(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                Err(e) => {
                    error!(error = %e, video_url = %video_url, "Analysis failed");
                    return Err(e.into());
                }
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
