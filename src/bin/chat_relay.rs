//! chat-relay: interactive chat console
//!
//! Joins a channel by name, prints the latest messages, then tails the
//! channel until Ctrl-C. A fake message generator keeps the channel busy.
//!
//! ## Configuration
//! - `chat-relay.yaml` in the working directory, `--config <path>` or
//!   CHAT_RELAY_CONFIG
//! - CHAT_RELAY__<SECTION>__<KEY> environment overrides
//!   (e.g. CHAT_RELAY__STORAGE__CONNECTION=sqlite:chat.db)
//! - CHAT_RELAY_LOG: log filter, logs go to stderr
//!
//! With a `memory` queue the ingestion worker runs in this process; with a
//! shared queue run `chat-relay-ingest` alongside.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chat_relay::config::Config;
use chat_relay::producer::run_producer;
use chat_relay::services::RelayServices;
use chat_relay::tail::TailEvent;
use chat_relay::utils::bootstrap::{init_tracing, parse_config_path};
use chat_relay::{channel_id_for_name, ChatMessage};

fn history_line(message: &ChatMessage) -> String {
    format!(
        "[{}] {}: {}",
        message.sent_at.format("%Y-%m-%dT%H:%M:%S"),
        message.author,
        message.body
    )
}

fn live_line(message: &ChatMessage) -> String {
    format!(
        "[{}] {}: {}",
        message.sent_at.format("%-I:%M:%S"),
        message.author,
        message.body
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;
    let services = RelayServices::build(&config).await?;

    println!("Which channel would you like to join?");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let Some(channel_name) = lines.next_line().await? else {
        return Ok(());
    };
    let channel_id = channel_id_for_name(&channel_name);
    info!(channel = %channel_name.trim(), channel_id = %channel_id, "Joining channel");

    let token = CancellationToken::new();
    let mut tasks = Vec::new();

    if config.producer.enabled {
        println!("Starting message generator...");
        tasks.push(tokio::spawn(run_producer(
            services.message_generator(channel_id),
            services.queue().clone(),
            config.retry.delay(),
            token.clone(),
        )));
    }

    if services.runs_ingestion_in_process() {
        let worker = services.ingestion_worker();
        let token = token.clone();
        tasks.push(tokio::spawn(async move { worker.run(token).await }));
    }

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

    println!("Loading channel - Press CTRL+C to exit");

    let mut reader = services.tail_reader(channel_id);
    reader
        .run(&token, |event| match event {
            TailEvent::History(message) => println!("{}", history_line(message)),
            TailEvent::Live => println!("... You are now live! ..."),
            TailEvent::Message(message) => println!("{}", live_line(message)),
        })
        .await;

    token.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task failed");
        }
    }

    Ok(())
}
