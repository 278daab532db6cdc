//! chat-relay - channel-partitioned chat log
//!
//! Producers enqueue chat messages; an ingestion worker appends them to a
//! per-channel log kept in a partitioned, sort-key-ordered table store;
//! consumers catch up on recent history and then tail the log by polling.

pub mod config;
pub mod message;
pub mod producer;
pub mod queue;
pub mod repository;
pub mod services;
pub mod storage;
pub mod tail;
pub mod utils;

pub use message::{channel_id_for_name, ChatMessage};
