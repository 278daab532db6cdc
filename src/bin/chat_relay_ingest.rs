//! chat-relay-ingest: standalone ingestion worker
//!
//! Drains the shared chat message queue into the chat log until Ctrl-C.
//! Requires a queue reachable from other processes (`sqlite` or `sqs`).
//!
//! ## Configuration
//! Same sources as `chat-relay`: `chat-relay.yaml`, `--config <path>`,
//! CHAT_RELAY_CONFIG and CHAT_RELAY__* environment overrides.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chat_relay::config::Config;
use chat_relay::services::RelayServices;
use chat_relay::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;
    let services = RelayServices::build(&config).await?;

    if services.runs_ingestion_in_process() {
        error!("queue.type is memory; a separate ingest process cannot see that queue");
        return Err("memory queue cannot be shared between processes".into());
    }

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
            token.cancel();
        });
    }

    services.ingestion_worker().run(token).await;
    Ok(())
}
