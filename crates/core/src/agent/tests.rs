use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::timeout;
use toolchat_model::{ErrorKind, ModelMessage, ToolCallRequest};
use toolchat_test_model::{PresetEvent, PresetResponse, TestModelProvider};

use crate::conversation::Role;
use crate::tool::{Error as ToolError, Tool, ToolResult};
use crate::{AgentBuilder, AgentError, RetryPolicy};

static ADD_SCHEMA: Value = Value::Null;

#[derive(Deserialize)]
struct AddInput {
    a: i64,
    b: i64,
}

struct AddTool;

impl Tool for AddTool {
    type Input = AddInput;

    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Adds two integers"
    }

    fn parameter_schema(&self) -> &Value {
        &ADD_SCHEMA
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            input
                .a
                .checked_add(input.b)
                .map(|sum| sum.to_string())
                .ok_or_else(|| ToolError::execution_error().with_reason("overflow"))
        }
    }
}

fn tool_call(id: &str, name: &str, arguments: Value) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
    })
}

fn tool_messages(messages: &[ModelMessage]) -> Vec<(String, String)> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => {
                Some((result.id.clone(), result.content.clone()))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_simple_message() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hi, ".to_owned()),
        PresetEvent::MessageDelta("what can I do for you?".to_owned()),
    ]));

    let transcript = Arc::new(Mutex::new(String::new()));
    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_system_prompt("Be brief.")
        .on_transcript({
            let transcript = Arc::clone(&transcript);
            move |delta| transcript.lock().unwrap().push_str(delta)
        })
        .build();

    let answer = agent.run("Hello").await.unwrap();
    assert_eq!(answer, "Hi, what can I do for you?");
    assert_eq!(*transcript.lock().unwrap(), answer);

    let history = agent.history().await.unwrap();
    let roles: Vec<_> = history.iter().map(|item| item.role()).collect();
    assert_eq!(roles, [Role::User, Role::Assistant]);
    assert_eq!(history[0].transcript(), "Hello");

    let requests = model_provider.requests();
    assert_eq!(
        requests[0].messages,
        [
            ModelMessage::System("Be brief.".to_owned()),
            ModelMessage::User("Hello".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_enqueued_input_reaches_idle() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_text("First."));
    model_provider.add_response(PresetResponse::with_text("Second."));

    let (idle_tx, mut idle_rx) = watch::channel::<usize>(0);
    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .on_idle(move || {
            idle_tx.send_modify(|count| *count += 1);
        })
        .build();
    agent.enqueue_user_input("one").unwrap();
    agent.enqueue_user_input("two").unwrap();

    timeout(Duration::from_millis(500), idle_rx.wait_for(|count| *count > 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model_provider.remaining(), 0);
    assert_eq!(agent.history().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_tool_round_trip() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Let me compute. ".to_owned()),
        tool_call("call_1", "add", json!({ "a": 2, "b": 3 })),
        tool_call("call_2", "add", json!({ "a": 10, "b": -4 })),
    ]));
    model_provider.add_response(PresetResponse::with_text("The sums are 5 and 6."));

    let called = Arc::new(Mutex::new(vec![]));
    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(AddTool)
        .on_tool_call({
            let called = Arc::clone(&called);
            move |req| called.lock().unwrap().push(req.name.clone())
        })
        .build();

    let answer = agent.run("What are 2+3 and 10-4?").await.unwrap();
    assert_eq!(answer, "The sums are 5 and 6.");
    assert_eq!(*called.lock().unwrap(), ["add", "add"]);

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "add");
    assert_eq!(
        tool_messages(&requests[1].messages),
        [
            ("call_1".to_owned(), "5".to_owned()),
            ("call_2".to_owned(), "6".to_owned()),
        ]
    );

    let roles: Vec<_> = agent
        .history()
        .await
        .unwrap()
        .iter()
        .map(|item| item.role())
        .collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
    );
}

#[tokio::test]
async fn test_tool_errors_are_reported_to_the_model() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        tool_call("call_1", "subtract", json!({})),
        tool_call("call_2", "add", json!({ "a": "two" })),
        tool_call("call_3", "add", json!({ "a": i64::MAX, "b": 1 })),
    ]));
    model_provider.add_response(PresetResponse::with_text("Sorry."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(AddTool)
        .build();
    assert_eq!(agent.run("Hmm").await.unwrap(), "Sorry.");

    let results = tool_messages(&model_provider.requests()[1].messages);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].1, "Error: no tool named `subtract`");
    assert!(results[1].1.starts_with("Error: "));
    assert_eq!(results[2].1, "Error: overflow");
}

#[tokio::test]
async fn test_step_limit() {
    let mut model_provider = TestModelProvider::default();
    for i in 0..3 {
        model_provider.add_response(PresetResponse::with_events([tool_call(
            &format!("call_{i}"),
            "add",
            json!({ "a": i, "b": i }),
        )]));
    }

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(AddTool)
        .with_max_steps(2)
        .build();
    let err = agent.run("Loop forever").await.unwrap_err();
    assert_eq!(err, AgentError::MaxStepsReached(2));
    assert_eq!(model_provider.requests().len(), 2);
    assert!(agent.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_turn_rolls_back() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_text("Remembered."));
    model_provider.add_response(PresetResponse::with_text("Lost.").with_failures(0));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_retry_policy(RetryPolicy::NEVER)
        .build();
    agent.run("first").await.unwrap();

    let err = agent.run("second").await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Model {
            kind: ErrorKind::Other,
            ..
        }
    ));

    let history = agent.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].transcript(), "Remembered.");
}

#[tokio::test]
async fn test_rate_limits_are_retried() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_text("Eventually.").with_failures(2));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_retry_policy(RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed_time: Duration::from_secs(5),
        })
        .build();
    assert_eq!(agent.run("Hi").await.unwrap(), "Eventually.");
    assert_eq!(model_provider.requests().len(), 3);
}

#[tokio::test]
async fn test_memory_disabled() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_text("One."));
    model_provider.add_response(PresetResponse::with_text("Two."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_memory(false)
        .build();
    agent.run("first").await.unwrap();
    agent.run("second").await.unwrap();

    let requests = model_provider.requests();
    assert_eq!(requests[1].messages, [ModelMessage::User("second".to_owned())]);
    assert_eq!(agent.history().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_clear_history() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_text("Noted."));
    model_provider.add_response(PresetResponse::with_text("Fresh start."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .build();
    agent.run("My name is Ada.").await.unwrap();
    agent.clear_history().await.unwrap();
    assert!(agent.history().await.unwrap().is_empty());

    agent.run("What is my name?").await.unwrap();
    assert_eq!(
        model_provider.requests()[1].messages,
        [ModelMessage::User("What is my name?".to_owned())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_turn_is_deferred() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_millis(50));
    model_provider.add_response(PresetResponse::with_text("Slow answer."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone()).build();
    let turn = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run("Take your time").await }
    });
    // Wait until the model has been asked, so the turn is in progress.
    while model_provider.requests().is_empty() {
        tokio::task::yield_now().await;
    }

    agent.clear_history().await.unwrap();
    assert_eq!(turn.await.unwrap().unwrap(), "Slow answer.");
    assert!(agent.history().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_inputs_are_queued_in_order() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_millis(10));
    model_provider.add_response(PresetResponse::with_text("A"));
    model_provider.add_response(PresetResponse::with_text("B"));

    let agent = AgentBuilder::with_model_provider(model_provider.clone()).build();
    let (first, second) = tokio::join!(agent.run("first"), agent.run("second"));
    assert_eq!(first.unwrap(), "A");
    assert_eq!(second.unwrap(), "B");

    let requests = model_provider.requests();
    assert_eq!(requests[1].messages.len(), 3);
}

#[derive(Deserialize)]
struct SleepInput {
    millis: u64,
}

struct SleepTool;

impl Tool for SleepTool {
    type Input = SleepInput;

    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps for a while"
    }

    fn parameter_schema(&self) -> &Value {
        &ADD_SCHEMA
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            tokio::time::sleep(Duration::from_millis(input.millis)).await;
            Ok(format!("slept {}ms", input.millis))
        }
    }
}

#[derive(Deserialize)]
struct NoInput {}

struct PanickingTool;

impl Tool for PanickingTool {
    type Input = NoInput;

    fn name(&self) -> &str {
        "boom"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    fn parameter_schema(&self) -> &Value {
        &ADD_SCHEMA
    }

    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move { panic!("tool bug") }
    }
}

#[tokio::test(start_paused = true)]
async fn test_tools_of_one_step_run_concurrently() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        tool_call("call_1", "sleep", json!({ "millis": 300 })),
        tool_call("call_2", "sleep", json!({ "millis": 300 })),
    ]));
    model_provider.add_response(PresetResponse::with_text("Rested."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(SleepTool)
        .build();
    let started = tokio::time::Instant::now();
    assert_eq!(agent.run("Take a nap").await.unwrap(), "Rested.");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");

    assert_eq!(
        tool_messages(&model_provider.requests()[1].messages),
        [
            ("call_1".to_owned(), "slept 300ms".to_owned()),
            ("call_2".to_owned(), "slept 300ms".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_panicking_tool_does_not_stall_the_agent() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        tool_call("call_1", "boom", json!({})),
        tool_call("call_2", "add", json!({ "a": 1, "b": 1 })),
    ]));
    model_provider.add_response(PresetResponse::with_text("That tool broke."));
    model_provider.add_response(PresetResponse::with_text("Still here."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(PanickingTool)
        .with_tool(AddTool)
        .build();
    let answer = timeout(Duration::from_secs(2), agent.run("Break it"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer, "That tool broke.");
    assert_eq!(
        tool_messages(&model_provider.requests()[1].messages),
        [
            ("call_1".to_owned(), "Error: tool panicked".to_owned()),
            ("call_2".to_owned(), "2".to_owned()),
        ]
    );

    let answer = timeout(Duration::from_secs(2), agent.run("Again?"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer, "Still here.");
}

#[tokio::test(start_paused = true)]
async fn test_clear_waits_for_inputs_sent_before_it() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_millis(10));
    model_provider.add_response(PresetResponse::with_text("A"));
    model_provider.add_response(PresetResponse::with_text("B"));
    model_provider.add_response(PresetResponse::with_text("C"));

    let agent = AgentBuilder::with_model_provider(model_provider.clone()).build();
    let turn = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run("first").await }
    });
    while model_provider.requests().is_empty() {
        tokio::task::yield_now().await;
    }

    agent.enqueue_user_input("second").unwrap();
    let (cleared, third) =
        tokio::join!(agent.clear_history(), agent.run("third"));
    cleared.unwrap();
    assert_eq!(third.unwrap(), "C");
    assert_eq!(turn.await.unwrap().unwrap(), "A");

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 3);
    // "second" still sees the first exchange, "third" starts fresh.
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[2].messages, [ModelMessage::User("third".to_owned())]);
    assert_eq!(agent.history().await.unwrap().len(), 2);
}
