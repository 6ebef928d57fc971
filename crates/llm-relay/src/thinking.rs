//! Progress narration state machine.
//!
//! `Idle -> Thinking(action, step, started_at) -> Idle`. Every transition
//! notifies subscribers synchronously with a [`ThinkingSnapshot`].

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Current tracker state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThinkingStatus {
    pub is_thinking: bool,
    pub current_action: String,
    pub step: u32,
    pub started_at: Option<DateTime<Utc>>,
}

/// Value passed to subscribers. `elapsed` is computed at notification time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThinkingSnapshot {
    pub is_thinking: bool,
    pub current_action: String,
    pub step: u32,
    pub elapsed: Duration,
}

type Subscriber = Arc<dyn Fn(&ThinkingSnapshot) + Send + Sync>;

#[derive(Default)]
struct Inner {
    status: ThinkingStatus,
    started: Option<Instant>,
    subscribers: Vec<(u64, Subscriber)>,
    next_id: u64,
}

impl Inner {
    fn snapshot(&self) -> ThinkingSnapshot {
        ThinkingSnapshot {
            is_thinking: self.status.is_thinking,
            current_action: self.status.current_action.clone(),
            step: self.status.step,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        }
    }
}

/// Tracks whether the orchestration layer is "thinking" and what it is doing.
#[derive(Clone, Default)]
pub struct ThinkingTracker {
    inner: Arc<Mutex<Inner>>,
}

/// Handle returned by [`ThinkingTracker::subscribe`].
///
/// Unsubscribing is idempotent and a no-op once the tracker is gone.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if let Ok(mut inner) = inner.lock() {
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl ThinkingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ThinkingStatus {
        self.inner
            .lock()
            .map(|inner| inner.status.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> ThinkingSnapshot {
        match self.inner.lock() {
            Ok(inner) => inner.snapshot(),
            Err(_) => Inner::default().snapshot(),
        }
    }

    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&ThinkingSnapshot) + Send + Sync + 'static,
    {
        let mut id = 0;
        if let Ok(mut inner) = self.inner.lock() {
            id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::new(subscriber)));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|i| i.subscribers.len()).unwrap_or(0)
    }

    /// `Idle -> Thinking`; resets the step counter and start time.
    pub fn start_thinking(&self, initial_action: impl Into<String>) {
        self.transition(|inner| {
            inner.status = ThinkingStatus {
                is_thinking: true,
                current_action: initial_action.into(),
                step: 0,
                started_at: Some(Utc::now()),
            };
            inner.started = Some(Instant::now());
            true
        });
    }

    /// Updates the narration and increments the step. Ignored while idle.
    pub fn set_action(&self, action: impl Into<String>) {
        self.transition(|inner| {
            if !inner.status.is_thinking {
                tracing::debug!("set_action while idle ignored");
                return false;
            }
            inner.status.current_action = action.into();
            inner.status.step += 1;
            true
        });
    }

    /// `Thinking -> Idle`.
    pub fn stop_thinking(&self) {
        self.transition(|inner| {
            inner.status = ThinkingStatus::default();
            inner.started = None;
            true
        });
    }

    /// Drops every subscriber and returns to idle without notifying.
    pub fn destroy(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.clear();
            inner.status = ThinkingStatus::default();
            inner.started = None;
        }
    }

    fn transition(&self, apply: impl FnOnce(&mut Inner) -> bool) {
        // Subscribers run after the lock is released so they may call back
        // into the tracker or unsubscribe.
        let (snapshot, subscribers) = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if !apply(&mut *inner) {
                return;
            }
            let subscribers: Vec<Subscriber> =
                inner.subscribers.iter().map(|(_, s)| s.clone()).collect();
            (inner.snapshot(), subscribers)
        };
        for subscriber in subscribers {
            subscriber(&snapshot);
        }
    }
}
