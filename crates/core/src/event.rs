//! Domain events: what happened to a request, for whoever is listening.
//!
//! The agent runner publishes request and tool lifecycle events on an
//! [`EventBus`]; the gateway logs them. Publishing never blocks and never
//! fails, even with no subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Domain events published by the agent runner and the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A surface accepted a request
    RequestStarted {
        request_id: String,
        surface: String,
        timestamp: DateTime<Utc>,
    },

    /// A request reached a terminal state
    RequestFinished {
        request_id: String,
        outcome: String, // "completed", "aborted", "timed-out", "failed"
        steps: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Pending invocations were rewritten after an abort
    InvocationsCancelled {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } => "request_started",
            Self::RequestFinished { .. } => "request_finished",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::InvocationsCancelled { .. } => "invocations_cancelled",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// Fan-out of [`DomainEvent`]s over a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag and skip events rather than holding up publishers.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
