//! Bootstrap utilities for chat-relay binaries.
//!
//! Shared initialization code for the console and the ingest worker.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the CHAT_RELAY_LOG environment variable.
///
/// Defaults to "info" level if CHAT_RELAY_LOG is not set. Logs go to stderr
/// so they never interleave with chat lines on stdout.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Extract the value of `--config <path>` (or `--config=<path>`) from
/// process arguments.
pub fn parse_config_path<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_config_path() {
        assert_eq!(
            parse_config_path(args(&["chat-relay", "--config", "relay.yaml"])),
            Some("relay.yaml".to_string())
        );
        assert_eq!(
            parse_config_path(args(&["chat-relay", "--config=relay.yaml"])),
            Some("relay.yaml".to_string())
        );
        assert_eq!(
            parse_config_path(args(&["chat-relay", "-c", "a.yaml"])),
            Some("a.yaml".to_string())
        );
        assert_eq!(parse_config_path(args(&["chat-relay"])), None);
        assert_eq!(parse_config_path(args(&["chat-relay", "--config"])), None);
    }
}
