use crate::jobs::base_jobs;
use lifecore::{ActivitySnapshot, AgentJobCache, EventBus, ItemId, Lookup, RolePath, StateMachine};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One activity whose jobs should be sent to every agent of a role
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub item: ItemId,
    pub step: ActivitySnapshot,
    pub machine: Arc<StateMachine>,
    pub role: RolePath,
}

struct Shared {
    lookup: Arc<dyn Lookup>,
    cache: Arc<dyn AgentJobCache>,
    events: EventBus,
}

/// Fixed pool of workers delivering job lists to agents.
///
/// Requests go through a bounded queue; when it is full the request is
/// dropped, a later transition sends a fresh list anyway.
pub struct JobPusher {
    sender: Mutex<Option<mpsc::Sender<PushRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    events: EventBus,
}

impl JobPusher {
    /// Spawns `workers` tasks on the current tokio runtime.
    pub fn start(
        workers: usize,
        capacity: usize,
        lookup: Arc<dyn Lookup>,
        cache: Arc<dyn AgentJobCache>,
        events: EventBus,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared {
            lookup,
            cache,
            events: events.clone(),
        });

        let handles = (0..workers.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                let shared = shared.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tracing::debug!("job push worker {} started", n);
                    loop {
                        let request = tokio::select! {
                            _ = cancel.cancelled() => break,
                            request = async { receiver.lock().await.recv().await } => request,
                        };
                        match request {
                            Some(request) => deliver(&shared, request).await,
                            None => break,
                        }
                    }
                    tracing::debug!("job push worker {} stopped", n);
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            cancel,
            events,
        }
    }

    /// Queues a push without waiting.
    pub fn push(&self, item: ItemId, step: ActivitySnapshot, machine: Arc<StateMachine>, role: RolePath) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let Some(sender) = sender else {
            tracing::debug!("job pusher is shut down, not pushing {}", step.path);
            return;
        };

        let path = step.path.clone();
        let role_name = role.name.clone();
        match sender.try_send(PushRequest { item, step, machine, role }) {
            Ok(()) => tracing::trace!("queued job push of {} to {}", path, role_name),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(item = %item, step = %path, "job push queue full, dropping push to {}", role_name);
                self.events.push_dropped(item, path, role_name);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("job push queue closed, not pushing {}", path);
            }
        }
    }

    /// Stops accepting requests and waits for the queued ones to be delivered.
    pub async fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("job push worker failed: {}", e);
            }
        }
    }
}

impl Drop for JobPusher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn deliver(shared: &Shared, request: PushRequest) {
    let PushRequest { item, step, machine, role } = request;

    let agents = match shared.lookup.agents(&role) {
        Ok(agents) => agents,
        Err(e) => {
            tracing::error!(item = %item, step = %step.path, "could not resolve agents of {}: {}", role.name, e);
            shared.events.push_failed(item, step.path.clone(), role.name.clone(), e.to_string());
            return;
        }
    };

    for agent in agents {
        let jobs = match base_jobs(item, &step, &machine, &agent, shared.lookup.as_ref(), false) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(item = %item, step = %step.path, "could not compute jobs of {}: {}", agent, e);
                shared.events.push_failed(item, step.path.clone(), agent.to_string(), e.to_string());
                continue;
            }
        };
        if jobs.is_empty() {
            continue;
        }

        let count = jobs.len();
        let serialized = match serde_json::to_string(&jobs) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("could not serialize jobs of {}: {}", step.path, e);
                continue;
            }
        };
        match shared.cache.refresh_job_list(&agent, item, &step.path, serialized).await {
            Ok(()) => {
                tracing::debug!(item = %item, step = %step.path, "pushed {} jobs to {}", count, agent);
                shared.events.jobs_pushed(item, step.path.clone(), agent, count);
            }
            Err(e) => {
                tracing::warn!(item = %item, step = %step.path, "could not push jobs to {}: {}", agent, e);
                shared.events.push_failed(item, step.path.clone(), agent.to_string(), e.to_string());
            }
        }
    }
}
