//! Model gateway - serialization, transport, and tool-call unpacking for
//! the remote chat-completion endpoint

mod client;
mod types;

pub use client::{CONNECTIVITY_APOLOGY, EMPTY_REPLY_PLACEHOLDER, ModelGateway};
pub use types::{GatewayResponse, Gesture, Role, ToolInvocation, Turn};
