//! Full-pipeline tests against the public API only: a streamed response is
//! parsed, approved, executed, and observed entirely through bus events and
//! store snapshots.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tagflow::{
    CommandStatus, Event, EventKind, Pipeline, PipelineConfig, Subscription, Tool,
    ToolDefinition, ToolError, ToolRegistry, INTERRUPTED_BY_USER,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct EvalTool;

#[async_trait]
impl Tool for EvalTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "eval",
            "Evaluate a code snippet",
            json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"]
            }),
        )
    }

    async fn run(
        &self,
        parameters: serde_json::Value,
        _cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let code = parameters["code"].as_str().unwrap_or_default();
        if code == "2+2" {
            Ok("4".to_string())
        } else if code.contains("throw") {
            Err(ToolError::Failed(code.to_string()))
        } else {
            Ok(code.to_string())
        }
    }
}

struct BlockingTool;

#[async_trait]
impl Tool for BlockingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("block", "Block until cancelled", json!({"type": "object"}))
    }

    async fn run(
        &self,
        _parameters: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        cancel.cancelled().await;
        Err(ToolError::Failed("cancelled".to_string()))
    }
}

fn pipeline() -> Pipeline {
    init_tracing();
    Pipeline::new(
        ToolRegistry::new(vec![Arc::new(EvalTool), Arc::new(BlockingTool)]),
        PipelineConfig::default(),
    )
}

async fn next_event(sub: &mut Subscription) -> Event {
    timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("event within deadline")
        .expect("bus alive")
}

#[tokio::test]
async fn streamed_invocation_runs_after_single_approval() {
    let pipe = pipeline();
    let mut terminals = pipe
        .bus()
        .subscribe_kinds(&[EventKind::CommandCompleted, EventKind::CommandFailed]);

    let response = concat!(
        "Let me calculate that.",
        "<thinking>simple arithmetic</thinking>",
        "<function_calls>",
        "<invoke name=\"eval\"><parameter name=\"code\">2+2</parameter></invoke>",
        "</function_calls>"
    );

    // Feed in uneven chunks, as a network stream would arrive.
    let mut session = pipe.session();
    let mut ids = Vec::new();
    for chunk in response.as_bytes().chunks(7) {
        ids.extend(session.push_chunk(std::str::from_utf8(chunk).unwrap()));
    }
    ids.extend(session.finish());
    assert_eq!(ids.len(), 1);

    pipe.approve(&ids[0]);
    match next_event(&mut terminals).await {
        Event::CommandCompleted { id, result } => {
            assert_eq!(id, ids[0]);
            assert_eq!(result, "4");
        }
        other => panic!("unexpected: {other:?}"),
    }

    let record = pipe.commands().get(&ids[0]).expect("record exists");
    assert_eq!(record.status, CommandStatus::Completed);
    pipe.shutdown();
}

#[tokio::test]
async fn repeated_approvals_execute_exactly_once() {
    let pipe = pipeline();
    let mut starts = pipe.bus().subscribe_kinds(&[EventKind::CommandStarted]);
    let mut terminals = pipe.bus().subscribe_kinds(&[EventKind::CommandCompleted]);

    let mut session = pipe.session();
    let ids = session.push_chunk(
        "<function_calls><invoke name=\"eval\"><parameter name=\"code\">2+2</parameter></invoke></function_calls>",
    );
    for _ in 0..5 {
        pipe.approve(&ids[0]);
    }

    assert_eq!(next_event(&mut terminals).await.kind(), EventKind::CommandCompleted);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut started = 0;
    while let Ok(Some(_)) = starts.try_recv() {
        started += 1;
    }
    assert_eq!(started, 1);
    pipe.shutdown();
}

#[tokio::test]
async fn interrupt_immediately_after_approval_settles_as_interrupted() {
    let pipe = pipeline();
    let mut terminals = pipe.bus().subscribe_kinds(&[
        EventKind::CommandFailed,
        EventKind::InterruptCleanupCompleted,
    ]);

    let mut session = pipe.session();
    let ids = session
        .push_chunk("<function_calls><invoke name=\"block\"></invoke></function_calls>");

    pipe.approve(&ids[0]);
    pipe.interrupt("stop");

    match next_event(&mut terminals).await {
        Event::CommandFailed { id, error } => {
            assert_eq!(id, ids[0]);
            assert_eq!(error, INTERRUPTED_BY_USER);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(
        next_event(&mut terminals).await,
        Event::InterruptCleanupCompleted
    ));
    pipe.shutdown();
}

#[tokio::test]
async fn interrupt_settles_blocked_command_as_interrupted() {
    let pipe = pipeline();
    let mut terminals = pipe.bus().subscribe_kinds(&[
        EventKind::CommandFailed,
        EventKind::InterruptCleanupCompleted,
    ]);

    let mut session = pipe.session();
    let ids = session
        .push_chunk("<function_calls><invoke name=\"block\"></invoke></function_calls>");
    pipe.approve(&ids[0]);

    let mut snapshots = pipe.commands().watch();
    loop {
        let status = snapshots.borrow().get(ids[0].as_str()).map(|r| r.status);
        if status == Some(CommandStatus::Executing) {
            break;
        }
        snapshots.changed().await.expect("store alive");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    pipe.interrupt("stop");

    match next_event(&mut terminals).await {
        Event::CommandFailed { id, error } => {
            assert_eq!(id, ids[0]);
            assert_eq!(error, INTERRUPTED_BY_USER);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(
        next_event(&mut terminals).await,
        Event::InterruptCleanupCompleted
    ));

    loop {
        let status = snapshots.borrow().get(ids[0].as_str()).map(|r| r.status);
        if status == Some(CommandStatus::Interrupted) {
            break;
        }
        snapshots.changed().await.expect("store alive");
    }
    pipe.shutdown();
}
