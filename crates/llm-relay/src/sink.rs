//! Task and event sinks.
//!
//! The session and the tool dispatcher report into a [`Sink`]; persistence is
//! left to the implementation. [`TracingSink`] logs, [`MemorySink`] keeps
//! records in memory for inspection.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Unit of tracked work (a stream, a tool execution).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: String,
    pub status: TaskStatus,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl TaskRecord {
    pub fn new(kind: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            status: TaskStatus::Pending,
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// `pending -> running`. Returns false for any other starting state.
    pub fn start(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// `running -> completed`.
    pub fn complete(&mut self, output: Value) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.close();
        true
    }

    /// `pending | running -> failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if matches!(self.status, TaskStatus::Completed | TaskStatus::Failed) {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.close();
        true
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn close(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .and_then(|started| (now - started).to_std().ok())
            .map(|d| d.as_millis() as u64);
    }
}

/// Structured lifecycle event, used for timeline reconstruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    RequestSent {
        provider: String,
        #[serde(default)]
        target: Option<String>,
    },
    ResponseReceived {
        provider: String,
        bytes: u64,
    },
    AssistantMessage {
        content: String,
        tool_calls: usize,
    },
    ToolCallInitiated {
        #[serde(default)]
        call_id: Option<String>,
        name: String,
        arguments: Value,
    },
    ToolCallCompleted {
        #[serde(default)]
        call_id: Option<String>,
        name: String,
        result: Value,
        duration_ms: u64,
    },
    ToolCallFailed {
        #[serde(default)]
        call_id: Option<String>,
        name: String,
        error: String,
        duration_ms: u64,
    },
    Error {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub chat_id: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RelayEvent,
}

/// Receiver of task transitions and lifecycle events.
pub trait Sink: Send + Sync {
    fn record_event(&self, record: EventRecord);

    /// Called after every task transition with the updated record.
    fn record_task(&self, task: &TaskRecord);
}

/// Logs every record through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn record_event(&self, record: EventRecord) {
        let chat_id = record.chat_id.as_deref().unwrap_or("-");
        match &record.event {
            RelayEvent::ToolCallFailed { name, error, .. } => {
                tracing::warn!(chat_id, tool = %name, error = %error, "tool call failed")
            }
            RelayEvent::Error { code, message } => {
                tracing::error!(chat_id, code = code.as_deref().unwrap_or("-"), message = %message, "stream error")
            }
            event => match serde_json::to_string(event) {
                Ok(json) => tracing::info!(chat_id, event = %json, "relay event"),
                Err(err) => tracing::warn!(chat_id, error = %err, "unserializable relay event"),
            },
        }
    }

    fn record_task(&self, task: &TaskRecord) {
        tracing::debug!(
            task_id = %task.id,
            kind = %task.kind,
            status = ?task.status,
            duration_ms = task.duration_ms,
            "task transition"
        );
    }
}

/// Keeps every record in memory. Cloning shares the same storage.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EventRecord>>>,
    tasks: Arc<Mutex<Vec<TaskRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Every task snapshot in the order it was reported.
    pub fn task_history(&self) -> Vec<TaskRecord> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Latest snapshot of the task with `id`.
    pub fn task(&self, id: Uuid) -> Option<TaskRecord> {
        self.task_history().into_iter().rev().find(|t| t.id == id)
    }
}

impl Sink for MemorySink {
    fn record_event(&self, record: EventRecord) {
        if let Ok(mut events) = self.events.lock() {
            events.push(record);
        }
    }

    fn record_task(&self, task: &TaskRecord) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task.clone());
        }
    }
}

/// Sink handle bound to one conversation.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn Sink>,
    chat_id: Option<String>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn Sink>, chat_id: Option<String>) -> Self {
        Self { sink, chat_id }
    }

    /// Reporter that only logs.
    pub fn tracing(chat_id: Option<String>) -> Self {
        Self::new(Arc::new(TracingSink), chat_id)
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn event(&self, event: RelayEvent) {
        self.sink.record_event(EventRecord {
            chat_id: self.chat_id.clone(),
            at: Utc::now(),
            event,
        });
    }

    /// Creates a pending task, reports it, then moves it to running.
    pub fn begin_task(&self, kind: &str, input: Value) -> TaskRecord {
        let mut task = TaskRecord::new(kind, input);
        self.sink.record_task(&task);
        task.start();
        self.sink.record_task(&task);
        task
    }

    pub fn complete_task(&self, task: &mut TaskRecord, output: Value) {
        if task.complete(output) {
            self.sink.record_task(task);
        }
    }

    pub fn fail_task(&self, task: &mut TaskRecord, error: impl Into<String>) {
        if task.fail(error) {
            self.sink.record_task(task);
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_follows_pending_running_completed() {
        let sink = MemorySink::new();
        let reporter = Reporter::new(Arc::new(sink.clone()), Some("chat-1".into()));
        let mut task = reporter.begin_task("stream", serde_json::json!({"provider": "openai"}));
        reporter.complete_task(&mut task, serde_json::json!({"content": "hi"}));

        let statuses: Vec<TaskStatus> = sink.task_history().iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed]
        );
        let last = sink.task(task.id).expect("task recorded");
        assert!(last.duration_ms.is_some());
        assert!(last.completed_at.is_some());
    }

    #[test]
    fn finished_task_rejects_further_transitions() {
        let mut task = TaskRecord::new("tool", Value::Null);
        assert!(!task.complete(Value::Null));
        assert!(task.start());
        assert!(task.fail("boom"));
        assert!(!task.complete(Value::Null));
        assert!(!task.fail("again"));
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn events_carry_chat_id() {
        let sink = MemorySink::new();
        let reporter = Reporter::new(Arc::new(sink.clone()), Some("chat-7".into()));
        reporter.event(RelayEvent::AssistantMessage {
            content: "done".into(),
            tool_calls: 0,
        });
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].chat_id.as_deref(), Some("chat-7"));
    }

    #[test]
    fn event_record_serializes_flat() {
        let record = EventRecord {
            chat_id: None,
            at: Utc::now(),
            event: RelayEvent::Error {
                code: Some("provider_error".into()),
                message: "x".into(),
            },
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["event"], "error");
        assert_eq!(value["code"], "provider_error");
    }
}
