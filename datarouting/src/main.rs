use clap::{Parser, Subcommand};
use datarouting::prelude::*;
use reqwest::StatusCode;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Packet delivery with fallback route providers.
#[derive(Debug, Parser)]
#[command(name = "datarouting", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the callback service and delivery driver until interrupted.
    Worker,
    /// Hand one demo packet to a running worker and print the result as JSON.
    Submit {
        /// Packet id; a random UUID when omitted.
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "+017771110000")]
        source: String,
        #[arg(long, default_value = "+016660002222")]
        destination: String,
        #[arg(long, default_value = "Hello")]
        contents: String,
    },
}

fn init_tracing() {
    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());

    match cli.command {
        Command::Worker => {
            let runtime = Runtime::start(config).await?;
            info!(addr = %runtime.local_addr(), "worker running, press Ctrl+C to stop");

            let report = runtime
                .run_until(async {
                    if let Err(e) = wait_for_shutdown_signal().await {
                        error!(error = %e, "failed to listen for shutdown signals");
                    }
                })
                .await;
            if !report.is_clean() {
                return Err("worker did not shut down cleanly".into());
            }
        }
        Command::Submit {
            id,
            source,
            destination,
            contents,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let packet = Packet::new(id, source, destination, contents);
            let url = config.deliver_url();
            info!(packet.id = packet.id(), %url, "submitting packet to worker");

            let response = reqwest::Client::new()
                .post(&url)
                .json(&DeliveryRequest::with_defaults(packet, &config))
                .send()
                .await?;

            let status = response.status();
            if status != StatusCode::OK && status != StatusCode::BAD_GATEWAY {
                let body = response.text().await.unwrap_or_default();
                return Err(format!("worker answered {status}: {body}").into());
            }

            let packet: Packet = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&packet)?);
            if status == StatusCode::BAD_GATEWAY {
                return Err(format!("delivery of packet {} failed", packet.id()).into());
            }
        }
    }

    Ok(())
}
