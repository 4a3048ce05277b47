use crate::{AgentId, ItemId, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events published by the kernel while items move through their workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KernelEvent {
    TransitionPerformed {
        item: ItemId,
        step_path: String,
        transition: TransitionId,
        event_id: u64,
        agent: AgentId,
        timestamp: DateTime<Utc>,
    },
    JobsPushed {
        item: ItemId,
        step_path: String,
        agent: AgentId,
        jobs: usize,
        timestamp: DateTime<Utc>,
    },
    PushFailed {
        item: ItemId,
        step_path: String,
        /// Agent or role the failure concerns
        target: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// The push queue was full and a push request was discarded
    PushDropped {
        item: ItemId,
        step_path: String,
        role: String,
        timestamp: DateTime<Utc>,
    },
}

impl KernelEvent {
    pub fn item(&self) -> ItemId {
        match self {
            KernelEvent::TransitionPerformed { item, .. }
            | KernelEvent::JobsPushed { item, .. }
            | KernelEvent::PushFailed { item, .. }
            | KernelEvent::PushDropped { item, .. } => *item,
        }
    }
}

/// Kernel wide event bus
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<KernelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: KernelEvent) {
        let _ = self.sender.send(event);
    }

    pub fn transition_performed(
        &self,
        item: ItemId,
        step_path: impl Into<String>,
        transition: TransitionId,
        event_id: u64,
        agent: AgentId,
    ) {
        self.emit(KernelEvent::TransitionPerformed {
            item,
            step_path: step_path.into(),
            transition,
            event_id,
            agent,
            timestamp: Utc::now(),
        });
    }

    pub fn jobs_pushed(&self, item: ItemId, step_path: impl Into<String>, agent: AgentId, jobs: usize) {
        self.emit(KernelEvent::JobsPushed {
            item,
            step_path: step_path.into(),
            agent,
            jobs,
            timestamp: Utc::now(),
        });
    }

    pub fn push_failed(&self, item: ItemId, step_path: impl Into<String>, target: impl Into<String>, reason: impl Into<String>) {
        self.emit(KernelEvent::PushFailed {
            item,
            step_path: step_path.into(),
            target: target.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn push_dropped(&self, item: ItemId, step_path: impl Into<String>, role: impl Into<String>) {
        self.emit(KernelEvent::PushDropped {
            item,
            step_path: step_path.into(),
            role: role.into(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
