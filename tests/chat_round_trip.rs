//! End-to-end round trip tests against a canned local endpoint
//!
//! A minimal HTTP responder stands in for the remote model API so the full
//! path (request body, transport, parsing, tool dispatch, persistence) is
//! exercised without leaving the machine.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use hearth::Result;
use hearth::config::{ApiConfig, HeartbeatConfig};
use hearth::gateway::{CONNECTIVITY_APOLOGY, Gesture, ModelGateway, Role, Turn};
use hearth::session::ChatSession;
use hearth::store::Vault;
use hearth::tools::{ToolArgs, ToolDispatcher, ToolHandler, ToolRegistry, ToolSpec};

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve `reply` to every request, recording each request body
async fn spawn_endpoint(reply: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_inner = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let payload = reply.to_string();
            let seen = seen_inner.clone();

            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let mut header_end = None;
                let mut content_length = 0usize;

                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);

                    if header_end.is_none() {
                        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                            header_end = Some(pos + 4);
                            let headers = String::from_utf8_lossy(&buf[..pos]).to_string();
                            for line in headers.lines() {
                                if let Some((name, value)) = line.split_once(':') {
                                    if name.eq_ignore_ascii_case("content-length") {
                                        content_length = value.trim().parse().unwrap_or(0);
                                    }
                                }
                            }
                        }
                    }
                    if let Some(end) = header_end {
                        if buf.len() >= end + content_length {
                            break;
                        }
                    }
                }

                if let Some(end) = header_end {
                    if let Ok(body) = serde_json::from_slice::<Value>(&buf[end..]) {
                        seen.lock().unwrap().push(body);
                    }
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    payload.len(),
                    payload
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/v1/chat/completions", addr), seen)
}

/// `set_vibe` double that records every invocation
struct RecordingVibe {
    calls: Mutex<Vec<Value>>,
}

#[async_trait]
impl ToolHandler for RecordingVibe {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let mood = args.str("mood")?.to_string();
        self.calls.lock().unwrap().push(json!({ "mood": mood }));
        Ok(json!({ "success": true, "mood": mood }))
    }
}

fn vibe_only_dispatcher() -> (Arc<RecordingVibe>, Arc<ToolDispatcher>) {
    let handler = Arc::new(RecordingVibe {
        calls: Mutex::new(Vec::new()),
    });
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolSpec::new("set_vibe", "Change the theme").with_param("mood", "The mood to set"),
        handler.clone(),
    );
    (handler, Arc::new(ToolDispatcher::new(Arc::new(registry))))
}

fn gateway_for(endpoint: &str, dispatcher: Arc<ToolDispatcher>) -> Arc<ModelGateway> {
    let api = ApiConfig {
        endpoint: endpoint.to_string(),
        timeout_ms: 5_000,
        ..ApiConfig::default()
    };
    Arc::new(ModelGateway::new(api, "You are a warm companion", dispatcher).unwrap())
}

#[tokio::test]
async fn test_round_trip_with_tool_call() {
    let (endpoint, _seen) = spawn_endpoint(json!({
        "choices": [{
            "message": {
                "content": "done",
                "tool_calls": [
                    { "function": { "name": "set_vibe", "arguments": "{\"mood\":\"aggressive\"}" } }
                ]
            }
        }]
    }))
    .await;

    let (handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let response = gateway.send_message(&[Turn::user("hi")]).await;

    assert_eq!(response.content, "done");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "set_vibe");
    assert_eq!(response.tool_calls[0].arguments, json!({ "mood": "aggressive" }));

    let calls = handler.calls.lock().unwrap();
    assert_eq!(*calls, vec![json!({ "mood": "aggressive" })]);
}

#[tokio::test]
async fn test_request_body_shape_and_persona() {
    let (endpoint, seen) = spawn_endpoint(json!({
        "choices": [{ "message": { "content": "hello!" } }]
    }))
    .await;

    let (_handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let response = gateway.send_message(&[Turn::user("hi")]).await;
    assert_eq!(response.content, "hello!");

    let bodies = seen.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];

    assert!(body["model"].is_string());
    assert!(body["temperature"].is_number());
    assert!(body["max_tokens"].is_number());

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are a warm companion");
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "hi");

    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools[0]["type"], "function");
    assert_eq!(tools[0]["function"]["name"], "set_vibe");
    assert_eq!(tools[0]["function"]["parameters"]["required"], json!(["mood"]));
}

#[tokio::test]
async fn test_tool_calls_execute_in_response_order() {
    let (endpoint, _seen) = spawn_endpoint(json!({
        "choices": [{
            "message": {
                "content": "shifting moods",
                "tool_calls": [
                    { "function": { "name": "set_vibe", "arguments": "{\"mood\":\"electric\"}" } },
                    { "function": { "name": "set_vibe", "arguments": "{\"mood\":\"chilling\"}" } },
                    { "function": { "name": "set_vibe", "arguments": "{\"mood\":\"stark-white\"}" } }
                ]
            }
        }]
    }))
    .await;

    let (handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let response = gateway.send_message(&[Turn::user("cycle please")]).await;
    assert_eq!(response.tool_calls.len(), 3);

    let moods: Vec<String> = handler
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c["mood"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(moods, vec!["electric", "chilling", "stark-white"]);
}

#[tokio::test]
async fn test_unknown_tool_does_not_poison_response() {
    let (endpoint, _seen) = spawn_endpoint(json!({
        "choices": [{
            "message": {
                "content": "tried my best",
                "tool_calls": [
                    { "function": { "name": "launch_rockets", "arguments": "{}" } },
                    { "function": { "name": "set_vibe", "arguments": "{\"mood\":\"blushing\"}" } }
                ]
            }
        }]
    }))
    .await;

    let (handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let response = gateway.send_message(&[Turn::user("hi")]).await;

    assert_eq!(response.content, "tried my best");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "set_vibe");
    assert_eq!(handler.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_yields_renderable_reply() {
    let (_handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for("http://127.0.0.1:1/v1/chat/completions", dispatcher);

    let response = gateway.send_message(&[Turn::user("hello?")]).await;

    assert!(!response.content.is_empty());
    assert_eq!(response.content, CONNECTIVITY_APOLOGY);
    assert!(response.tool_calls.is_empty());
}

#[tokio::test]
async fn test_malformed_body_degrades() {
    // The endpoint answers 200 with a body that is not a chat completion
    let (endpoint, _seen) = spawn_endpoint(json!({ "choices": "garbage" })).await;

    let (_handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let response = gateway.send_message(&[Turn::user("hi")]).await;
    assert_eq!(response.content, CONNECTIVITY_APOLOGY);
    assert!(response.tool_calls.is_empty());
}

#[tokio::test]
async fn test_session_end_to_end() {
    let (endpoint, _seen) = spawn_endpoint(json!({
        "choices": [{ "message": { "content": "hey yourself" } }]
    }))
    .await;

    let dir = TempDir::new().unwrap();
    let vault = Arc::new(Vault::open(dir.path()).unwrap());
    let chat = vault.create_chat("New Chat").unwrap();

    let (_handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let heartbeat = HeartbeatConfig {
        enabled: false,
        ..HeartbeatConfig::default()
    };
    let session = ChatSession::open(chat.id, vault.clone(), gateway, &heartbeat);

    let response = session.send("hi").await.unwrap().unwrap();
    assert_eq!(response.content, "hey yourself");

    let messages = vault.messages(chat.id).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hi");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "hey yourself");

    // First message titles the chat
    assert_eq!(vault.chats().unwrap()[0].title, "hi");

    session.close();
}

#[tokio::test]
async fn test_gesture_end_to_end() {
    let (endpoint, seen) = spawn_endpoint(json!({
        "choices": [{ "message": { "content": "hehe, that tickles" } }]
    }))
    .await;

    let dir = TempDir::new().unwrap();
    let vault = Arc::new(Vault::open(dir.path()).unwrap());
    let chat = vault.create_chat("New Chat").unwrap();

    let (_handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let heartbeat = HeartbeatConfig {
        enabled: false,
        ..HeartbeatConfig::default()
    };
    let session = ChatSession::open(chat.id, vault.clone(), gateway, &heartbeat);

    let response = session.gesture(Gesture::Tickling).await.unwrap().unwrap();
    assert_eq!(response.content, "hehe, that tickles");

    // The gesture arrived as a trailing system turn on the wire
    let bodies = seen.lock().unwrap();
    let messages = bodies[0]["messages"].as_array().unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "system");
    assert!(last["content"].as_str().unwrap().contains("USER_TOUCH_TICKLING"));

    // Only the assistant reaction is persisted
    let stored = vault.messages(chat.id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, Role::Assistant);

    session.close();
}

#[tokio::test]
async fn test_proactive_probe_end_to_end() {
    use hearth::heartbeat::{HeartbeatProbe, ProactiveProbe, SessionSignals};

    let (endpoint, seen) = spawn_endpoint(json!({
        "choices": [{ "message": { "content": "still around? I was just thinking about you" } }]
    }))
    .await;

    let dir = TempDir::new().unwrap();
    let vault = Arc::new(Vault::open(dir.path()).unwrap());
    let chat = vault.create_chat("quiet chat").unwrap();
    vault.append_message(chat.id, Role::User, "brb", false).unwrap();

    let (_handler, dispatcher) = vibe_only_dispatcher();
    let gateway = gateway_for(&endpoint, dispatcher);

    let config = HeartbeatConfig {
        enabled: true,
        interval_secs: 1,
        min_silence_secs: 0,
        proactive_prompts: vec!["nudge the user".to_string()],
    };
    let signals = Arc::new(SessionSignals::new());
    let probe = ProactiveProbe::new(chat.id, vault.clone(), gateway, signals, &config);

    probe.tick().await;

    // The proactive prompt rode along as a system turn
    let bodies = seen.lock().unwrap();
    let messages = bodies[0]["messages"].as_array().unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "system");
    assert_eq!(last["content"], "nudge the user");

    // The reply was persisted marked proactive
    let stored = vault.messages(chat.id).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[1].proactive);
    assert_eq!(stored[1].content, "still around? I was just thinking about you");
}
