//! hearth - a local-first conversational companion with a heartbeat
//!
//! hearth keeps multi-chat history in a SQLite vault, forwards conversation
//! turns to a remote chat-completion endpoint together with a tool manifest,
//! executes the tool calls the model requests, and periodically checks
//! whether the companion should speak up on its own.

pub mod config;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod notify;
pub mod session;
pub mod store;
pub mod theme;
pub mod tools;

pub use error::{HearthError, Result};
