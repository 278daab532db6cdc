//! Domain repositories.

mod chat_message;

pub use chat_message::{ChatMessageRepository, PAGE_SIZE};
