use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::ToolError;
use crate::event::ToolCall;
use crate::sink::{RelayEvent, Reporter};
use crate::tools::{ToolOutput, ToolRegistry};

/// Completion record of one dispatched tool call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    pub call: ToolCall,
    pub result: Result<ToolOutput, ToolError>,
    pub duration: Duration,
}

struct InFlight {
    call: ToolCall,
    handle: JoinHandle<Result<ToolOutput, ToolError>>,
}

/// Launches tool executions without joining them in the read loop.
///
/// Each dispatched call runs on its own tokio task. Completions are unordered.
/// Failures are reported to the sink, sent on the outcome channel (if one was
/// requested) and returned from the task, so [`ToolDispatcher::join_all`]
/// sees them as `Err`.
///
/// With an outcome channel, finished calls are dropped from the join list on
/// the next dispatch since their results were already sent. Without one,
/// handles are kept until `join_all`; long-lived dispatchers should call it.
pub struct ToolDispatcher {
    registry: Arc<dyn ToolRegistry>,
    reporter: Reporter,
    in_flight: Mutex<Vec<InFlight>>,
    outcome_tx: Option<mpsc::UnboundedSender<ToolOutcome>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<dyn ToolRegistry>, reporter: Reporter) -> Self {
        Self {
            registry,
            reporter,
            in_flight: Mutex::new(Vec::new()),
            outcome_tx: None,
        }
    }

    /// Like [`ToolDispatcher::new`], plus a channel receiving every outcome as it completes.
    pub fn with_outcomes(
        registry: Arc<dyn ToolRegistry>,
        reporter: Reporter,
    ) -> (Self, mpsc::UnboundedReceiver<ToolOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dispatcher = Self::new(registry, reporter);
        dispatcher.outcome_tx = Some(tx);
        (dispatcher, rx)
    }

    /// Starts executing `call` in the background.
    ///
    /// Returns false without executing anything when the registry has no tool
    /// with that name. Must be called from within a tokio runtime.
    pub fn dispatch(&self, call: ToolCall) -> bool {
        if !self.registry.has_tool(&call.name) {
            debug!(tool = %call.name, "no registered tool; call surfaced only");
            return false;
        }
        let registry = self.registry.clone();
        let reporter = self.reporter.clone();
        let outcome_tx = self.outcome_tx.clone();
        let task_call = call.clone();
        let handle = tokio::spawn(async move {
            let (result, duration) = execute_call(registry.as_ref(), &reporter, &task_call).await;
            if let Some(tx) = outcome_tx {
                let _ = tx.send(ToolOutcome {
                    call: task_call,
                    result: result.clone(),
                    duration,
                });
            }
            result
        });
        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                if self.outcome_tx.is_some() {
                    in_flight.retain(|f| !f.handle.is_finished());
                }
                in_flight.push(InFlight { call, handle });
            }
            Err(_) => warn!(tool = %call.name, "dispatcher state poisoned; call will not be joinable"),
        }
        true
    }

    /// Executes `call` to completion. Failures are logged and swallowed.
    pub async fn execute(&self, call: &ToolCall) -> Option<ToolOutput> {
        if !self.registry.has_tool(&call.name) {
            debug!(tool = %call.name, "no registered tool; call surfaced only");
            return None;
        }
        match execute_call(self.registry.as_ref(), &self.reporter, call).await.0 {
            Ok(output) => Some(output),
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed; continuing");
                None
            }
        }
    }

    /// Number of dispatched calls that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .map(|in_flight| in_flight.iter().filter(|f| !f.handle.is_finished()).count())
            .unwrap_or(0)
    }

    /// Waits for every call dispatched so far and returns their results in
    /// dispatch order.
    pub async fn join_all(&self) -> Vec<(ToolCall, Result<ToolOutput, ToolError>)> {
        let pending = match self.in_flight.lock() {
            Ok(mut in_flight) => std::mem::take(&mut *in_flight),
            Err(_) => Vec::new(),
        };
        let mut results = Vec::with_capacity(pending.len());
        for InFlight { call, handle } in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(ToolError::Join {
                    tool: call.name.clone(),
                    message: join_err.to_string(),
                }),
            };
            results.push((call, result));
        }
        results
    }
}

async fn execute_call(
    registry: &dyn ToolRegistry,
    reporter: &Reporter,
    call: &ToolCall,
) -> (Result<ToolOutput, ToolError>, Duration) {
    let arguments = call
        .arguments
        .to_json()
        .unwrap_or_else(|| serde_json::to_value(&call.arguments).unwrap_or_default());
    reporter.event(RelayEvent::ToolCallInitiated {
        call_id: call.id.clone(),
        name: call.name.clone(),
        arguments: arguments.clone(),
    });
    let mut task = reporter.begin_task("tool_call", serde_json::json!({
        "name": call.name,
        "arguments": arguments,
    }));
    info!(tool = %call.name, call_id = call.id.as_deref().unwrap_or("-"), "tool call initiated");

    let started = Instant::now();
    let result = registry.execute_tool(&call.name, call.arguments.clone()).await;
    let duration = started.elapsed();
    let duration_ms = duration.as_millis() as u64;

    match &result {
        Ok(output) => {
            info!(tool = %call.name, duration_ms, "tool call completed");
            reporter.complete_task(&mut task, output.result.clone());
            reporter.event(RelayEvent::ToolCallCompleted {
                call_id: call.id.clone(),
                name: call.name.clone(),
                result: output.result.clone(),
                duration_ms,
            });
        }
        Err(err) => {
            error!(tool = %call.name, duration_ms, error = %err, "tool call failed");
            reporter.fail_task(&mut task, err.to_string());
            reporter.event(RelayEvent::ToolCallFailed {
                call_id: call.id.clone(),
                name: call.name.clone(),
                error: err.to_string(),
                duration_ms,
            });
        }
    }
    (result, duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ToolArguments;
    use crate::sink::{MemorySink, TaskStatus};
    use crate::tools::InMemoryToolRegistry;
    use serde_json::Value;

    fn setup() -> (Arc<InMemoryToolRegistry>, MemorySink, Reporter) {
        let registry = Arc::new(InMemoryToolRegistry::new());
        registry.register("add", |args: ToolArguments| async move {
            let v = args.to_json().unwrap_or(Value::Null);
            let a = v["a"].as_i64().unwrap_or(0);
            let b = v["b"].as_i64().unwrap_or(0);
            Ok(serde_json::json!(a + b))
        });
        registry.register("fail", |_args| async move { Err("exploded".to_string()) });
        let sink = MemorySink::new();
        let reporter = Reporter::new(Arc::new(sink.clone()), Some("chat".into()));
        (registry, sink, reporter)
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall::new(Some(format!("id-{name}")), name, ToolArguments::Raw(args.into()))
    }

    #[tokio::test]
    async fn dispatch_runs_in_background_and_is_joinable() {
        let (registry, sink, reporter) = setup();
        let (dispatcher, mut outcomes) = ToolDispatcher::with_outcomes(registry, reporter);

        assert!(dispatcher.dispatch(call("add", "{\"a\":2,\"b\":3}")));
        let outcome = outcomes.recv().await.expect("outcome");
        assert_eq!(outcome.result, Ok(ToolOutput { result: serde_json::json!(5) }));

        let joined = dispatcher.join_all().await;
        assert_eq!(joined.len(), 1);
        assert!(joined[0].1.is_ok());
        assert!(sink.events().iter().any(|e| matches!(
            &e.event,
            RelayEvent::ToolCallCompleted { name, .. } if name == "add"
        )));
    }

    #[tokio::test]
    async fn finished_calls_are_released_when_outcomes_are_streamed() {
        let (registry, _sink, reporter) = setup();
        let (dispatcher, mut outcomes) = ToolDispatcher::with_outcomes(registry, reporter);

        for _ in 0..5 {
            dispatcher.dispatch(call("add", "{\"a\":1,\"b\":1}"));
        }
        for _ in 0..5 {
            outcomes.recv().await.expect("outcome");
        }
        while dispatcher.in_flight() > 0 {
            tokio::task::yield_now().await;
        }

        dispatcher.dispatch(call("add", "{}"));
        assert_eq!(dispatcher.in_flight.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.join_all().await.len(), 1);
    }

    #[tokio::test]
    async fn without_outcome_channel_results_wait_for_join() {
        let (registry, _sink, reporter) = setup();
        let dispatcher = ToolDispatcher::new(registry, reporter);
        dispatcher.dispatch(call("add", "{}"));
        while dispatcher.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        dispatcher.dispatch(call("fail", "{}"));
        let joined = dispatcher.join_all().await;
        assert_eq!(joined.len(), 2);
        assert!(joined[0].1.is_ok());
        assert!(joined[1].1.is_err());
        assert!(dispatcher.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_not_executed() {
        let (registry, sink, reporter) = setup();
        let dispatcher = ToolDispatcher::new(registry, reporter);
        assert!(!dispatcher.dispatch(call("missing", "{}")));
        assert!(dispatcher.join_all().await.is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn streaming_failure_surfaces_from_join() {
        let (registry, sink, reporter) = setup();
        let dispatcher = ToolDispatcher::new(registry, reporter);
        dispatcher.dispatch(call("fail", "{}"));
        let joined = dispatcher.join_all().await;
        assert_eq!(joined[0].1, Err(ToolError::execution("fail", "exploded")));
        let tasks = sink.task_history();
        assert_eq!(tasks.last().map(|t| t.status), Some(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn direct_execution_swallows_failure() {
        let (registry, sink, reporter) = setup();
        let dispatcher = ToolDispatcher::new(registry, reporter);
        assert_eq!(dispatcher.execute(&call("fail", "{}")).await, None);
        assert!(sink.events().iter().any(|e| matches!(e.event, RelayEvent::ToolCallFailed { .. })));
        assert_eq!(
            dispatcher.execute(&call("add", "{\"a\":1,\"b\":1}")).await,
            Some(ToolOutput { result: serde_json::json!(2) })
        );
    }
}
