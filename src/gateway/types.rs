//! Conversation and wire types for the model gateway
//!
//! Requests and responses follow the OpenAI chat-completion wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message in a conversation, immutable once sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Physical interaction reported by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Petting,
    Tickling,
}

impl Gesture {
    /// Synthesize the system turn describing this gesture to the model
    pub fn system_turn(&self) -> Turn {
        match self {
            Gesture::Petting => Turn::system(
                "[USER_TOUCH_PETTING]: The user is gently petting your core in slow circular motions.",
            ),
            Gesture::Tickling => Turn::system(
                "[USER_TOUCH_TICKLING]: The user is rapidly tapping your core, tickling you.",
            ),
        }
    }
}

/// A tool call the gateway actually dispatched, with its parsed arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// What a round trip through the gateway yields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

// Wire shapes for the endpoint's response body.

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCall {
    pub function: WireFunction,
}

/// Tool call as the endpoint encodes it: arguments arrive as a JSON string
#[derive(Debug, Deserialize)]
pub(crate) struct WireFunction {
    pub name: String,
    pub arguments: String,
}
