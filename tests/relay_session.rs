//! Integration tests for the session relay driven through its public API.
//!
//! These tests wire a session to channel-backed links, replaying the event
//! sequences the two protocol adapters would produce, and assert the
//! externally observable properties: ordering, barge-in behavior, the tool
//! round-trip contract, and session isolation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use convrelay::core::ai::{ClientEvent, ServerEvent};
use convrelay::core::audio::encode_payload;
use convrelay::core::session::{Session, SessionEvent, SessionOptions, SessionState};
use convrelay::core::telephony::messages::{MediaPayload, StartMeta};
use convrelay::core::telephony::{TelephonyCommand, TelephonyEvent};
use convrelay::core::tools::{Tool, ToolDispatcher, ToolError, ToolRegistry};

struct LookupAccountTool;

#[async_trait]
impl Tool for LookupAccountTool {
    fn name(&self) -> &str {
        "lookup_account"
    }
    fn description(&self) -> &str {
        "Look up an account by id"
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"account_id": {"type": "string"}},
            "required": ["account_id"]
        })
    }
    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let account_id = arguments["account_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("account_id required".into()))?;
        Ok(serde_json::json!({ "account_id": account_id, "balance": 42.5 }))
    }
}

struct Harness {
    events: mpsc::Sender<SessionEvent>,
    tel_rx: mpsc::Receiver<TelephonyCommand>,
    ai_rx: mpsc::Receiver<ClientEvent>,
    handle: tokio::task::JoinHandle<convrelay::core::session::SessionSummary>,
}

fn spawn_session_with_tools(id: &str, registry: ToolRegistry) -> Harness {
    let (events, events_rx) = mpsc::channel(64);
    let (tel_tx, tel_rx) = mpsc::channel(64);
    let (ai_tx, ai_rx) = mpsc::channel(64);
    let dispatcher = ToolDispatcher::new(Arc::new(registry), Duration::from_millis(250));
    let session = Session::new(
        id.to_string(),
        SessionOptions::default(),
        tel_tx,
        ai_tx,
        dispatcher,
    );
    let handle = tokio::spawn(session.run(events_rx));
    Harness {
        events,
        tel_rx,
        ai_rx,
        handle,
    }
}

fn start_event(stream_sid: &str) -> SessionEvent {
    SessionEvent::Telephony(TelephonyEvent::Start {
        stream_sid: Some(stream_sid.to_string()),
        start: StartMeta {
            stream_sid: stream_sid.to_string(),
            call_sid: None,
            account_sid: None,
            media_format: None,
            custom_parameters: None,
        },
    })
}

fn media_event(seq: u64, byte: u8) -> SessionEvent {
    SessionEvent::Telephony(TelephonyEvent::Media {
        sequence_number: Some(seq.to_string()),
        media: MediaPayload {
            track: None,
            chunk: None,
            timestamp: None,
            payload: encode_payload(&[byte; 160]),
        },
    })
}

fn configured() -> SessionEvent {
    SessionEvent::Ai(
        serde_json::from_str(r#"{"type":"session.updated","session":{"id":"sess"}}"#).unwrap(),
    )
}

fn function_call(call_id: &str, name: &str, arguments: &str) -> Vec<SessionEvent> {
    let added: ServerEvent = serde_json::from_str(&format!(
        r#"{{
            "type": "response.output_item.added",
            "response_id": "resp_fc",
            "output_index": 0,
            "item": {{"type": "function_call", "call_id": "{call_id}", "name": "{name}"}}
        }}"#
    ))
    .unwrap();
    let done = ServerEvent::FunctionCallArgumentsDone {
        call_id: call_id.to_string(),
        item_id: "item_fc".to_string(),
        arguments: arguments.to_string(),
    };
    vec![SessionEvent::Ai(added), SessionEvent::Ai(done)]
}

async fn finish(h: Harness) -> convrelay::core::session::SessionSummary {
    let _ = h
        .events
        .send(SessionEvent::Telephony(TelephonyEvent::Stop {}))
        .await;
    let _ = h.events.send(SessionEvent::TelephonyClosed).await;
    let _ = h.events.send(SessionEvent::AiClosed).await;
    h.handle.await.unwrap()
}

/// Collect all tool-result outputs currently on the AI channel.
fn drain_tool_results(ai_rx: &mut mpsc::Receiver<ClientEvent>) -> Vec<(String, String)> {
    let mut results = Vec::new();
    while let Ok(ev) = ai_rx.try_recv() {
        if let ClientEvent::ConversationItemCreate { item } = ev {
            if item.item_type == "function_call_output" {
                results.push((item.call_id.unwrap_or_default(), item.output.unwrap_or_default()));
            }
        }
    }
    results
}

#[tokio::test]
async fn tool_round_trip_success() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(LookupAccountTool));
    let mut h = spawn_session_with_tools("s-tool", registry);

    h.events.send(start_event("MZ1")).await.unwrap();
    h.events.send(configured()).await.unwrap();
    for ev in function_call("tc1", "lookup_account", r#"{"account_id":"acct_9"}"#) {
        h.events.send(ev).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let results = drain_tool_results(&mut h.ai_rx);
    assert_eq!(results.len(), 1, "exactly one result per call id");
    assert_eq!(results[0].0, "tc1");
    assert!(results[0].1.contains("acct_9"));
    assert!(results[0].1.contains("42.5"));

    let summary = finish(h).await;
    assert_eq!(summary.state, SessionState::Closed);
}

#[tokio::test]
async fn tool_round_trip_unknown_tool_yields_error_result() {
    // no tools registered at all
    let mut h = spawn_session_with_tools("s-missing", ToolRegistry::new());

    h.events.send(start_event("MZ1")).await.unwrap();
    h.events.send(configured()).await.unwrap();
    for ev in function_call("tc1", "lookup_account", "{}") {
        h.events.send(ev).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let results = drain_tool_results(&mut h.ai_rx);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "tc1");
    assert!(results[0].1.contains("error"));
    assert!(results[0].1.contains("lookup_account"));

    finish(h).await;
}

#[tokio::test]
async fn tool_round_trip_timeout_yields_error_result() {
    struct StuckTool;

    #[async_trait]
    impl Tool for StuckTool {
        fn name(&self) -> &str {
            "stuck"
        }
        fn description(&self) -> &str {
            "Never resolves on its own"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(&self, _: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::json!({}))
        }
    }

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StuckTool));
    let mut h = spawn_session_with_tools("s-timeout", registry);

    h.events.send(start_event("MZ1")).await.unwrap();
    h.events.send(configured()).await.unwrap();
    for ev in function_call("tc-slow", "stuck", "{}") {
        h.events.send(ev).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    let results = drain_tool_results(&mut h.ai_rx);
    assert_eq!(results.len(), 1, "a timed-out call is still resolved");
    assert_eq!(results[0].0, "tc-slow");
    assert!(results[0].1.contains("error"));

    finish(h).await;
}

#[tokio::test]
async fn concurrent_tool_calls_each_resolve_once() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(LookupAccountTool));
    let mut h = spawn_session_with_tools("s-concurrent", registry);

    h.events.send(start_event("MZ1")).await.unwrap();
    h.events.send(configured()).await.unwrap();
    for ev in function_call("tc-a", "lookup_account", r#"{"account_id":"a"}"#) {
        h.events.send(ev).await.unwrap();
    }
    for ev in function_call("tc-b", "lookup_account", r#"{"account_id":"b"}"#) {
        h.events.send(ev).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    let mut results = drain_tool_results(&mut h.ai_rx);
    results.sort();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "tc-a");
    assert_eq!(results[1].0, "tc-b");

    finish(h).await;
}

#[tokio::test]
async fn sessions_are_isolated() {
    let mut a = spawn_session_with_tools("session-a", ToolRegistry::new());
    let mut b = spawn_session_with_tools("session-b", ToolRegistry::new());

    a.events.send(start_event("MZA")).await.unwrap();
    a.events.send(configured()).await.unwrap();
    b.events.send(start_event("MZB")).await.unwrap();
    b.events.send(configured()).await.unwrap();

    // traffic on A only
    for seq in 1..=5u64 {
        a.events.send(media_event(seq, seq as u8)).await.unwrap();
    }
    a.events
        .send(SessionEvent::Ai(ServerEvent::AudioDelta {
            response_id: "resp_a".to_string(),
            item_id: "item_a".to_string(),
            delta: encode_payload(&[7u8; 160]),
        }))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    // B's links saw nothing
    assert!(b.tel_rx.try_recv().is_err());
    assert!(b.ai_rx.try_recv().is_err());

    // A's links saw everything, in order
    let mut appended = 0;
    while let Ok(ev) = a.ai_rx.try_recv() {
        if matches!(ev, ClientEvent::InputAudioBufferAppend { .. }) {
            appended += 1;
        }
    }
    assert_eq!(appended, 5);
    assert!(matches!(
        a.tel_rx.try_recv().unwrap(),
        TelephonyCommand::Media { .. }
    ));

    let sa = finish(a).await;
    let sb = finish(b).await;
    assert_eq!(sa.state, SessionState::Closed);
    assert_eq!(sb.state, SessionState::Closed);
    assert_eq!(sb.transcript.len(), 0);
}

#[tokio::test]
async fn interleaved_directions_preserve_fifo_order() {
    let mut h = spawn_session_with_tools("s-order", ToolRegistry::new());
    h.events.send(start_event("MZ1")).await.unwrap();
    h.events.send(configured()).await.unwrap();

    // interleave caller media and AI deltas
    for i in 0..4u8 {
        h.events.send(media_event(i as u64 + 1, i)).await.unwrap();
        h.events
            .send(SessionEvent::Ai(ServerEvent::AudioDelta {
                response_id: "resp_1".to_string(),
                item_id: "item_1".to_string(),
                delta: encode_payload(&[100 + i; 160]),
            }))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut inbound = Vec::new();
    while let Ok(ev) = h.ai_rx.try_recv() {
        if let ClientEvent::InputAudioBufferAppend { audio } = ev {
            inbound.push(audio);
        }
    }
    let expected: Vec<String> = (0..4u8).map(|i| encode_payload(&[i; 160])).collect();
    assert_eq!(inbound, expected);

    let mut playback = Vec::new();
    while let Ok(cmd) = h.tel_rx.try_recv() {
        if let TelephonyCommand::Media { media, .. } = cmd {
            playback.push(media.payload);
        }
    }
    let expected: Vec<String> = (0..4u8).map(|i| encode_payload(&[100 + i; 160])).collect();
    assert_eq!(playback, expected);

    finish(h).await;
}
