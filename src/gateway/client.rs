//! Model gateway - the network round trip to the remote model
//!
//! Serializes the conversation plus the tool manifest, posts it to the
//! configured endpoint, unpacks the reply, and runs requested tool calls
//! through the dispatcher. The public entry points never fail: transport
//! and parse problems collapse to a degraded but renderable response so the
//! conversation is never left without an assistant turn.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::config::ApiConfig;
use crate::error::{HearthError, Result};
use crate::tools::ToolDispatcher;

use super::types::{ChatCompletion, Gesture, GatewayResponse, ToolInvocation, Turn, WireMessage};

/// Stand-in when the endpoint returns a reply without text content
pub const EMPTY_REPLY_PLACEHOLDER: &str = "No response";

/// Shown in-conversation when the endpoint cannot be reached at all
pub const CONNECTIVITY_APOLOGY: &str = "I'm having trouble connecting right now. Please check the \
                                        endpoint and authorization header in your hearth config and \
                                        make sure the model service is up.";

/// Environment variable consulted when the config carries no authorization header
const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct ModelGateway {
    http: reqwest::Client,
    api: ApiConfig,
    persona_prompt: String,
    dispatcher: Arc<ToolDispatcher>,
}

impl ModelGateway {
    pub fn new(api: ApiConfig, persona_prompt: impl Into<String>, dispatcher: Arc<ToolDispatcher>) -> Result<Self> {
        let mut api = api;
        let has_auth = api.headers.keys().any(|k| k.eq_ignore_ascii_case("authorization"));
        if !has_auth {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                api.headers.insert("Authorization".to_string(), format!("Bearer {}", key));
            }
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(api.timeout_ms))
            .build()
            .map_err(|e| HearthError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api,
            persona_prompt: persona_prompt.into(),
            dispatcher,
        })
    }

    pub fn model(&self) -> &str {
        &self.api.model
    }

    /// One full round trip. Always yields a renderable response; failures
    /// other than per-tool-call ones degrade to a connectivity apology.
    pub async fn send_message(&self, turns: &[Turn]) -> GatewayResponse {
        match self.try_send(turns).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "gateway call failed, returning degraded response");
                GatewayResponse {
                    content: CONNECTIVITY_APOLOGY.to_string(),
                    tool_calls: Vec::new(),
                }
            }
        }
    }

    /// Report a physical interaction: one synthesized system turn describing
    /// the gesture, then the normal round trip.
    pub async fn send_gesture(&self, gesture: Gesture, turns: &[Turn]) -> GatewayResponse {
        let mut with_gesture = turns.to_vec();
        with_gesture.push(gesture.system_turn());
        self.send_message(&with_gesture).await
    }

    async fn try_send(&self, turns: &[Turn]) -> Result<GatewayResponse> {
        let body = self.build_body(turns);
        let completion = self.post(&body).await?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .unwrap_or_default();

        Ok(self.fold_reply(message).await)
    }

    /// Request body in the OpenAI chat-completion shape, persona prepended
    fn build_body(&self, turns: &[Turn]) -> Value {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(json!({ "role": "system", "content": self.persona_prompt }));
        for turn in turns {
            messages.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
        }

        json!({
            "model": self.api.model,
            "messages": messages,
            "temperature": self.api.temperature,
            "max_tokens": self.api.max_tokens,
            "tools": self.dispatcher.manifest()
        })
    }

    async fn post(&self, body: &Value) -> Result<ChatCompletion> {
        let mut request = self.http.post(&self.api.endpoint);
        for (name, value) in &self.api.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| HearthError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HearthError::Unreachable(format!("status {}", status)));
        }

        response
            .json::<ChatCompletion>()
            .await
            .map_err(|e| HearthError::MalformedResponse(e.to_string()))
    }

    /// Extract the text reply and run tool calls sequentially, in response
    /// order. A malformed argument payload, unknown tool or failing handler
    /// drops that single call; the rest still run.
    async fn fold_reply(&self, message: WireMessage) -> GatewayResponse {
        let content = message
            .content
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY_PLACEHOLDER.to_string());

        let mut invoked = Vec::new();
        for call in message.tool_calls.unwrap_or_default() {
            let name = call.function.name;
            let arguments: Value = match serde_json::from_str(&call.function.arguments) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "dropping tool call with malformed arguments");
                    continue;
                }
            };

            match self.dispatcher.dispatch(&name, arguments.clone()).await {
                Ok(result) => {
                    tracing::info!(tool = %name, %result, "tool executed");
                    invoked.push(ToolInvocation { name, arguments });
                }
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "tool call dropped");
                }
            }
        }

        GatewayResponse {
            content,
            tool_calls: invoked,
        }
    }
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("endpoint", &self.api.endpoint)
            .field("model", &self.api.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Role;
    use crate::tools::{ToolArgs, ToolHandler, ToolRegistry, ToolSpec};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CountingHandler {
        calls: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl ToolHandler for CountingHandler {
        async fn call(&self, args: &ToolArgs) -> Result<Value> {
            let mood = args.str("mood")?;
            self.calls.lock().unwrap().push(json!({ "mood": mood }));
            Ok(json!({ "success": true }))
        }
    }

    fn test_gateway() -> (Arc<CountingHandler>, ModelGateway) {
        let handler = Arc::new(CountingHandler {
            calls: Mutex::new(Vec::new()),
        });
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolSpec::new("set_vibe", "Change the theme").with_param("mood", "The mood to set"),
            handler.clone(),
        );
        let dispatcher = Arc::new(ToolDispatcher::new(Arc::new(registry)));

        let api = ApiConfig {
            endpoint: "http://127.0.0.1:1/v1/chat/completions".to_string(),
            ..ApiConfig::default()
        };
        let gateway = ModelGateway::new(api, "You are a test persona", dispatcher).unwrap();
        (handler, gateway)
    }

    fn wire_message(content: Option<&str>, calls: &[(&str, &str)]) -> WireMessage {
        let tool_calls = if calls.is_empty() {
            Value::Null
        } else {
            json!(
                calls
                    .iter()
                    .map(|(name, arguments)| json!({ "function": { "name": name, "arguments": arguments } }))
                    .collect::<Vec<_>>()
            )
        };
        serde_json::from_value(json!({ "content": content, "tool_calls": tool_calls })).unwrap()
    }

    #[test]
    fn test_build_body_shape() {
        let (_handler, gateway) = test_gateway();
        let turns = vec![Turn::user("hi"), Turn::assistant("hello")];

        let body = gateway.build_body(&turns);

        assert_eq!(body["model"], gateway.api.model);
        assert_eq!(body["temperature"], gateway.api.temperature);
        assert_eq!(body["max_tokens"], gateway.api.max_tokens);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are a test persona");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["function"]["name"], "set_vibe");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades() {
        let (handler, gateway) = test_gateway();

        let response = gateway.send_message(&[Turn::user("hi")]).await;

        assert_eq!(response.content, CONNECTIVITY_APOLOGY);
        assert!(!response.content.is_empty());
        assert!(response.tool_calls.is_empty());
        assert!(handler.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gesture_turn_is_appended() {
        let (_handler, gateway) = test_gateway();
        // The gesture path forwards through send_message; with an unreachable
        // endpoint we still get a renderable degraded reply.
        let response = gateway.send_gesture(Gesture::Petting, &[Turn::user("hi")]).await;
        assert_eq!(response.content, CONNECTIVITY_APOLOGY);
    }

    #[tokio::test]
    async fn test_fold_reply_text_only() {
        let (_handler, gateway) = test_gateway();
        let response = gateway.fold_reply(wire_message(Some("Hello there!"), &[])).await;
        assert_eq!(response.content, "Hello there!");
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_fold_reply_missing_content_placeholder() {
        let (_handler, gateway) = test_gateway();
        let response = gateway.fold_reply(wire_message(None, &[])).await;
        assert_eq!(response.content, EMPTY_REPLY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_fold_reply_dispatches_in_order() {
        let (handler, gateway) = test_gateway();
        let response = gateway
            .fold_reply(wire_message(
                Some("done"),
                &[
                    ("set_vibe", r#"{"mood":"electric"}"#),
                    ("set_vibe", r#"{"mood":"chilling"}"#),
                    ("set_vibe", r#"{"mood":"blushing"}"#),
                ],
            ))
            .await;

        assert_eq!(response.tool_calls.len(), 3);
        let moods: Vec<String> = handler
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c["mood"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(moods, vec!["electric", "chilling", "blushing"]);
    }

    #[tokio::test]
    async fn test_fold_reply_isolates_malformed_arguments() {
        let (handler, gateway) = test_gateway();
        let response = gateway
            .fold_reply(wire_message(
                Some("done"),
                &[
                    ("set_vibe", r#"{"mood":"electric"}"#),
                    ("set_vibe", "{not json"),
                    ("set_vibe", r#"{"mood":"chilling"}"#),
                ],
            ))
            .await;

        // The malformed call is dropped; its neighbors still ran
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(handler.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fold_reply_skips_unknown_tool() {
        let (handler, gateway) = test_gateway();
        let response = gateway
            .fold_reply(wire_message(
                Some("done"),
                &[("not_registered", "{}"), ("set_vibe", r#"{"mood":"electric"}"#)],
            ))
            .await;

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "set_vibe");
        assert_eq!(handler.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fold_reply_records_name_and_arguments() {
        let (_handler, gateway) = test_gateway();
        let response = gateway
            .fold_reply(wire_message(Some("done"), &[("set_vibe", r#"{"mood":"aggressive"}"#)]))
            .await;

        assert_eq!(
            response.tool_calls,
            vec![ToolInvocation {
                name: "set_vibe".to_string(),
                arguments: json!({ "mood": "aggressive" }),
            }]
        );
    }

    #[test]
    fn test_env_api_key_fallback() {
        let handler = Arc::new(CountingHandler {
            calls: Mutex::new(Vec::new()),
        });
        let mut registry = ToolRegistry::new();
        registry.register(ToolSpec::new("noop", "noop"), handler);
        let dispatcher = Arc::new(ToolDispatcher::new(Arc::new(registry)));

        let mut api = ApiConfig::default();
        api.headers.insert("authorization".to_string(), "Bearer explicit".to_string());

        let gateway = ModelGateway::new(api, "persona", dispatcher).unwrap();
        // An explicit header is left untouched
        assert_eq!(
            gateway.api.headers.get("authorization").map(String::as_str),
            Some("Bearer explicit")
        );
    }

    #[test]
    fn test_debug_hides_headers() {
        let (_handler, gateway) = test_gateway();
        let debug = format!("{:?}", gateway);
        assert!(debug.contains("ModelGateway"));
        assert!(!debug.contains("Authorization"));
    }

    #[test]
    fn test_role_as_str_used_in_body() {
        assert_eq!(Role::System.as_str(), "system");
    }
}
