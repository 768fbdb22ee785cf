//! End-to-end runs of the step loop with scripted collaborators.

use std::sync::{Arc, Mutex};

use stepwise::history::ManagedMessage;
use stepwise::memory::SkipReason;
use stepwise::prelude::*;

/// Returns `click` until `done_at`, then `done`. Fails on the listed steps.
struct Script {
    done_at: u32,
    fail_on: Vec<u32>,
    snapshots: Mutex<Vec<HistorySnapshot>>,
}

impl Script {
    fn new(done_at: u32) -> Self {
        Self {
            done_at,
            fail_on: Vec::new(),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, steps: &[u32]) -> Self {
        self.fail_on = steps.to_vec();
        self
    }
}

impl Decider for Script {
    fn decide(&self, history: HistorySnapshot, step: u32) -> DecisionFuture<'_> {
        self.snapshots.lock().unwrap().push(history);
        Box::pin(async move {
            if self.fail_on.contains(&step) {
                return Err("model unavailable".to_string());
            }
            let name = if step >= self.done_at { "done" } else { "click" };
            Ok(StepOutput::new(
                format!("step {step}"),
                vec![Action::new(name, serde_json::json!({ "step": step }))],
            ))
        })
    }
}

/// Executes every action; `click` returns `payload`.
struct Browser {
    payload: String,
    observe: bool,
}

impl Browser {
    fn new() -> Self {
        Self {
            payload: "clicked".to_string(),
            observe: false,
        }
    }
}

impl ActionExecutor for Browser {
    fn execute(&self, action: Action) -> ActionFuture<'_> {
        Box::pin(async move {
            match action.name.as_str() {
                "done" => Ok(ActionResult::done("task finished")),
                _ => Ok(ActionResult::content(self.payload.clone())),
            }
        })
    }

    fn observe(&self, step: u32) -> ObserveFuture<'_> {
        let observe = self.observe;
        Box::pin(async move { Ok(observe.then(|| Message::user(format!("page {step}")))) })
    }
}

fn kinds(messages: &[ManagedMessage]) -> Vec<MessageKind> {
    messages.iter().map(|m| m.kind()).collect()
}

fn record_events(sink: Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
    Arc::new(FnEventHandler::new(move |event| {
        sink.lock().unwrap().push(format!("{event:?}"));
    }))
}

#[tokio::test]
async fn compacts_every_interval_during_a_run() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    let summarizer = FnSummarizer::new(move |messages: Vec<Message>, step| {
        seen.lock().unwrap().push((step, messages.len()));
        async move { Ok::<_, String>(Some(format!("memory of step {step}"))) }
    });

    let result = AgentRunner::new(
        Arc::new(Script::new(5)),
        Arc::new(Browser::new()),
        AgentConfig::default().with_memory_interval(2),
    )
    .with_summarizer(Arc::new(summarizer))
    .run("collect titles")
    .await
    .unwrap();

    assert!(result.finished());
    assert_eq!(result.steps_completed, 5);
    assert_eq!(result.compactions, 2);
    assert_eq!(*calls.lock().unwrap(), vec![(2, 4), (4, 4)]);

    let messages = &result.history.messages;
    assert_eq!(
        kinds(messages),
        vec![
            MessageKind::Init,
            MessageKind::Memory,
            MessageKind::Memory,
            MessageKind::Action,
            MessageKind::Result,
        ]
    );
    assert_eq!(messages[1].message.text(), "memory of step 2");
    assert_eq!(messages[2].message.text(), "memory of step 4");
    assert_eq!(messages[1].message.role, MessageRole::User);
    assert_eq!(
        result.history.current_size,
        messages.iter().map(|m| m.size()).sum::<usize>()
    );
}

#[tokio::test]
async fn failing_summarizer_keeps_history_and_run_alive() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let summarizer = FnSummarizer::new(|_messages: Vec<Message>, _step| async {
        Err::<Option<String>, String>("memory backend down".to_string())
    });

    let result = AgentRunner::new(
        Arc::new(Script::new(3)),
        Arc::new(Browser::new()),
        AgentConfig::default().with_memory_interval(1),
    )
    .with_summarizer(Arc::new(summarizer))
    .with_event_handler(record_events(events.clone()))
    .run("collect titles")
    .await
    .unwrap();

    assert!(result.finished());
    assert_eq!(result.compactions, 0);
    assert_eq!(result.history.len(), 7);

    let events = events.lock().unwrap();
    let failed = events
        .iter()
        .filter(|e| e.contains("Failed(\"memory backend down\")"))
        .count();
    // Step 1 has only two candidates, enough to attempt.
    assert_eq!(failed, 3);
}

#[tokio::test]
async fn memory_needs_a_summarizer_and_an_enabled_module() {
    let compacting = FnSummarizer::new(|_messages: Vec<Message>, _step| async {
        Ok::<_, String>(Some("should not appear".to_string()))
    });
    let result = AgentRunner::new(
        Arc::new(Script::new(4)),
        Arc::new(Browser::new()),
        AgentConfig::default().with_memory_interval(1).without_memory(),
    )
    .with_summarizer(Arc::new(compacting))
    .run("collect titles")
    .await
    .unwrap();
    assert_eq!(result.compactions, 0);
    assert!(
        result
            .history
            .messages
            .iter()
            .all(|m| m.kind() != MessageKind::Memory)
    );

    let result = AgentRunner::new(
        Arc::new(Script::new(4)),
        Arc::new(Browser::new()),
        AgentConfig::default().with_memory_interval(1),
    )
    .run("collect titles")
    .await
    .unwrap();
    assert_eq!(result.compactions, 0);
}

#[tokio::test]
async fn consecutive_decision_failures_end_the_run() {
    let result = AgentRunner::new(
        Arc::new(Script::new(10).failing_on(&[1, 2, 3])),
        Arc::new(Browser::new()),
        AgentConfig::default().with_max_failures(2),
    )
    .run("collect titles")
    .await
    .unwrap();

    assert_eq!(result.stop_reason, StopReason::TooManyFailures);
    assert_eq!(result.steps_completed, 2);
    assert_eq!(result.consecutive_failures, 2);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(
        kinds(&result.history.messages),
        vec![MessageKind::Init, MessageKind::Result, MessageKind::Result]
    );
    assert!(
        result.history.messages[1]
            .message
            .text()
            .contains("model unavailable")
    );
}

#[tokio::test]
async fn a_successful_step_resets_the_failure_count() {
    let result = AgentRunner::new(
        Arc::new(Script::new(4).failing_on(&[1, 3])),
        Arc::new(Browser::new()),
        AgentConfig::default().with_max_failures(2),
    )
    .run("collect titles")
    .await
    .unwrap();

    assert!(result.finished());
    assert_eq!(result.steps_completed, 4);
    assert_eq!(result.consecutive_failures, 0);
    assert_eq!(result.errors.len(), 2);
}

#[tokio::test]
async fn stops_at_the_step_limit() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let result = AgentRunner::new(
        Arc::new(Script::new(u32::MAX)),
        Arc::new(Browser::new()),
        AgentConfig::default().with_max_steps(3),
    )
    .with_event_handler(record_events(events.clone()))
    .run("collect titles")
    .await
    .unwrap();

    assert_eq!(result.stop_reason, StopReason::StepLimit);
    assert_eq!(result.steps_completed, 3);
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e == "StepLimitReached { max_steps: 3 }")
    );
}

#[tokio::test]
async fn history_stays_within_the_input_window() {
    let decider = Arc::new(Script::new(4));
    let events = Arc::new(Mutex::new(Vec::new()));
    let browser = Browser {
        payload: "x".repeat(200),
        observe: false,
    };

    let result = AgentRunner::new(
        decider.clone(),
        Arc::new(browser),
        AgentConfig::default()
            .without_memory()
            .with_chars_per_token(1.0)
            .with_max_input_tokens(120),
    )
    .with_system_prompt("You click things.")
    .with_event_handler(record_events(events.clone()))
    .run("collect titles")
    .await
    .unwrap();

    assert!(result.finished());
    assert!(result.history.current_size <= 120);
    assert_eq!(
        result.history.current_size,
        result.history.messages.iter().map(|m| m.size()).sum::<usize>()
    );
    // Init entries are never trimmed.
    assert_eq!(result.history.messages[0].message.text(), "You click things.");
    assert_eq!(result.history.messages[1].message.text(), "collect titles");

    for snapshot in decider.snapshots.lock().unwrap().iter() {
        assert!(snapshot.current_size <= 120);
    }
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.starts_with("HistoryTrimmed"))
    );
}

#[tokio::test]
async fn observations_are_shown_for_one_step_only() {
    let decider = Arc::new(Script::new(3));
    let browser = Browser {
        observe: true,
        ..Browser::new()
    };

    let result = AgentRunner::new(decider.clone(), Arc::new(browser), AgentConfig::default())
        .run("collect titles")
        .await
        .unwrap();

    let snapshots = decider.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 3);
    for (i, snapshot) in snapshots.iter().enumerate() {
        let states: Vec<_> = snapshot
            .messages
            .iter()
            .filter(|m| m.kind() == MessageKind::State)
            .collect();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].message.text(), format!("page {}", i + 1));
    }
    assert!(
        result
            .history
            .messages
            .iter()
            .all(|m| m.kind() != MessageKind::State)
    );
}

#[tokio::test]
async fn not_enough_candidates_is_reported_as_a_skip() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let summarizer = FnSummarizer::new(|_messages: Vec<Message>, _step| async {
        Ok::<_, String>(Some("summary".to_string()))
    });
    let skipped = format!(
        "{:?}",
        CompactionOutcome::Skipped(SkipReason::NotEnoughMessages { candidates: 1 })
    );

    // The decision fails at step 1: a single result message to compact.
    let result = AgentRunner::new(
        Arc::new(Script::new(2).failing_on(&[1])),
        Arc::new(Browser::new()),
        AgentConfig::default().with_memory_interval(1),
    )
    .with_summarizer(Arc::new(summarizer))
    .with_event_handler(record_events(events.clone()))
    .run("collect titles")
    .await
    .unwrap();

    assert!(result.finished());
    assert_eq!(result.compactions, 1);
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.contains(&skipped)));
}
