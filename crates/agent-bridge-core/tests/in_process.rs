//! The dispatcher used as a complete in-process transport: listeners play
//! the backend, handlers receive its pushes.

use std::sync::{Arc, Mutex, Weak};

use agent_bridge_core::{
    DispatchError, Dispatcher, InboundType, Transport,
    protocol::{
        ChatEvent, ChatMessage, ChatRequest, ChatRole, ExecuteTool, ExecutionStatus, SendMessage,
        ToolEvent, ToolExecution,
    },
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

/// Wire a fake backend into `dispatcher`: chat turns are answered and echoed
/// back as `chat/event` pushes, tool executions always fail.
fn install_backend(dispatcher: &Arc<Dispatcher>) {
    let weak: Weak<Dispatcher> = Arc::downgrade(dispatcher);
    dispatcher.handle::<SendMessage, _, _>(move |msg| {
        let weak = weak.clone();
        async move {
            let session_id = msg.data.session_id;
            let content = msg.data.request.content;
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.invoke(
                    InboundType::ChatEvent,
                    json!({
                        "sessionId": session_id,
                        "type": "message-complete",
                        "data": {"content": content},
                    }),
                    None,
                )?;
            }
            Ok::<_, anyhow::Error>(ChatMessage {
                message_id: "m-1".into(),
                role: ChatRole::Assistant,
                content: format!("echo: {content}"),
                created_at: None,
            })
        }
    });
    dispatcher.handle::<ExecuteTool, _, _>(|msg| async move {
        Err::<ToolExecution, _>(anyhow::anyhow!("tool {} is not installed", msg.data.tool_name))
    });
}

async fn say<T: Transport>(transport: &T, text: &str) -> Result<ChatMessage, T::Error> {
    transport
        .request(SendMessage {
            session_id: "s-1".into(),
            request: ChatRequest {
                content: text.into(),
                ..ChatRequest::default()
            },
        })
        .await
}

#[tokio::test]
async fn test_request_reply_and_push_round_trip() {
    let dispatcher = Arc::new(Dispatcher::new());
    install_backend(&dispatcher);

    let pushed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&pushed);
    dispatcher.on::<ChatEvent, _>(move |msg| {
        sink.lock().unwrap().push((msg.data.kind, msg.data.data["content"].clone()));
        Ok(())
    });

    let reply = assert_ok!(say(&*dispatcher, "hello").await);
    assert_eq!(reply.content, "echo: hello");
    assert_eq!(reply.role, ChatRole::Assistant);
    assert_eq!(
        *pushed.lock().unwrap(),
        vec![("message-complete".to_string(), json!("hello"))]
    );
}

#[tokio::test]
async fn test_failures_reach_observers_and_callers() {
    let dispatcher = Arc::new(Dispatcher::new());
    install_backend(&dispatcher);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    dispatcher.on_error(move |msg, err| {
        sink.lock().unwrap().push((msg.message_type.clone(), err.to_string()));
    });

    let result: Result<ToolExecution, DispatchError> = dispatcher
        .request(ExecuteTool {
            tool_name: "grep".into(),
            input: json!({"pattern": "x"}),
            session_id: None,
        })
        .await;
    let err = assert_err!(result);
    assert!(matches!(err, DispatchError::Handler { .. }));

    dispatcher.on::<ToolEvent, _>(|msg| {
        anyhow::ensure!(msg.data.status != ExecutionStatus::Failed, "tool failed");
        Ok(())
    });
    assert_err!(dispatcher.invoke(
        InboundType::ToolEvent,
        json!({"executionId": "e-1", "status": "failed"}),
        Some("evt-1".into()),
    ));

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[0].0, "tool/execute");
    assert!(observed[0].1.contains("not installed"));
    assert_eq!(observed[1].0, "tool/event");
}

#[tokio::test]
async fn test_unanswered_request_fails_without_observers() {
    let dispatcher = Dispatcher::new();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    dispatcher.on_error(move |_, _| *counter.lock().unwrap() += 1);

    let err = assert_err!(say(&dispatcher, "anyone?").await);
    assert!(matches!(err, DispatchError::NoHandler(ref t) if t == "chat/send-message"));
    assert_eq!(*calls.lock().unwrap(), 0);
}
