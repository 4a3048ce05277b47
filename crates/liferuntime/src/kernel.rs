use crate::jobs::JobScope;
use crate::pusher::JobPusher;
use crate::registry::StepRegistry;
use crate::routing::ExpressionRouting;
use crate::verify::Diagnostic;
use crate::workflow::Workflow;
use lifecore::audit::cluster;
use lifecore::{
    AgentId, AgentJobCache, ClusterObject, ClusterStorage, DescriptionLoader, EventBus, ItemId, Job, KernelError,
    KernelEvent, Lookup, Result, RoutingEvaluator, TransactionScope, Transaction, TransitionId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Configuration for the kernel
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub push_workers: usize,
    pub push_queue_capacity: usize,
    pub event_buffer_size: usize,
    /// Deliver job lists to agents after each transition
    pub push_jobs: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            push_workers: 4,
            push_queue_capacity: 256,
            event_buffer_size: 1000,
            push_jobs: true,
        }
    }
}

/// Who acts, and under which transaction, while a workflow moves
pub struct StepContext<'k> {
    pub kernel: &'k Kernel,
    pub agent: &'k AgentId,
    pub txn: Transaction,
}

impl<'k> StepContext<'k> {
    pub fn new(kernel: &'k Kernel, agent: &'k AgentId, txn: Transaction) -> Self {
        Self { kernel, agent, txn }
    }
}

pub struct KernelBuilder {
    storage: Arc<dyn ClusterStorage>,
    lookup: Arc<dyn Lookup>,
    descriptions: Arc<dyn DescriptionLoader>,
    routing: Arc<dyn RoutingEvaluator>,
    steps: Arc<StepRegistry>,
    job_cache: Option<Arc<dyn AgentJobCache>>,
    config: KernelConfig,
}

impl KernelBuilder {
    pub fn with_routing(mut self, routing: Arc<dyn RoutingEvaluator>) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_steps(mut self, steps: Arc<StepRegistry>) -> Self {
        self.steps = steps;
        self
    }

    /// Job lists are only pushed when a cache to push them to is given.
    pub fn with_job_cache(mut self, cache: Arc<dyn AgentJobCache>) -> Self {
        self.job_cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Kernel {
        let events = EventBus::new(self.config.event_buffer_size);

        let pusher = match (&self.job_cache, self.config.push_jobs) {
            (Some(cache), true) => match tokio::runtime::Handle::try_current() {
                Ok(_) => Some(JobPusher::start(
                    self.config.push_workers,
                    self.config.push_queue_capacity,
                    self.lookup.clone(),
                    cache.clone(),
                    events.clone(),
                )),
                Err(_) => {
                    tracing::warn!("no tokio runtime, job lists will not be pushed");
                    None
                }
            },
            _ => None,
        };

        Kernel {
            storage: self.storage,
            lookup: self.lookup,
            descriptions: self.descriptions,
            routing: self.routing,
            steps: self.steps,
            events,
            pusher,
            config: self.config,
            locks: Mutex::new(HashMap::new()),
        }
    }
}

/// Runs the lifecycles of items: loads one workflow per operation, moves it
/// and stores it back.
pub struct Kernel {
    storage: Arc<dyn ClusterStorage>,
    lookup: Arc<dyn Lookup>,
    descriptions: Arc<dyn DescriptionLoader>,
    routing: Arc<dyn RoutingEvaluator>,
    steps: Arc<StepRegistry>,
    events: EventBus,
    pusher: Option<JobPusher>,
    config: KernelConfig,
    locks: Mutex<HashMap<ItemId, Arc<Mutex<()>>>>,
}

impl Kernel {
    pub fn builder(
        storage: Arc<dyn ClusterStorage>,
        lookup: Arc<dyn Lookup>,
        descriptions: Arc<dyn DescriptionLoader>,
    ) -> KernelBuilder {
        KernelBuilder {
            storage,
            lookup,
            descriptions,
            routing: Arc::new(ExpressionRouting::new()),
            steps: Arc::new(StepRegistry::new()),
            job_cache: None,
            config: KernelConfig::default(),
        }
    }

    pub fn storage(&self) -> &dyn ClusterStorage {
        self.storage.as_ref()
    }

    pub fn lookup(&self) -> &dyn Lookup {
        self.lookup.as_ref()
    }

    pub fn descriptions(&self) -> &dyn DescriptionLoader {
        self.descriptions.as_ref()
    }

    pub fn routing(&self) -> &dyn RoutingEvaluator {
        self.routing.as_ref()
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }

    pub fn pusher(&self) -> Option<&JobPusher> {
        self.pusher.as_ref()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Empty workflow for `item` with the registered predefined steps.
    pub fn new_workflow(&self, item: ItemId) -> Workflow {
        Workflow::new(item).with_predefined(&self.steps)
    }

    fn item_lock(&self, item: ItemId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(item).or_default().clone()
    }

    /// Drops the entry of `item` once no other operation holds or waits on it.
    fn release_lock(&self, item: ItemId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(&item).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(&item);
        }
    }

    /// Runs `op` while holding the lock of `item`.
    fn with_item_lock<T>(&self, item: ItemId, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.item_lock(item);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        self.release_lock(item, lock);
        result
    }

    /// Starts `workflow` and stores it as the lifecycle of its item.
    pub fn create_item(&self, agent: &AgentId, workflow: Workflow) -> Result<()> {
        self.with_item_lock(workflow.item(), || self.create_locked(agent, workflow))
    }

    fn create_locked(&self, agent: &AgentId, mut workflow: Workflow) -> Result<()> {
        let item = workflow.item();
        match self.storage.get(item, cluster::WORKFLOW, None) {
            Ok(_) => {
                return Err(KernelError::ObjectAlreadyExists(format!("Lifecycle of item {}", item)));
            }
            Err(KernelError::ObjectNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let scope = TransactionScope::begin(self.storage())?;
        let ctx = StepContext::new(self, agent, scope.txn());
        let root = workflow.root();
        workflow.run_first(root, &ctx)?;

        self.storage
            .put(item, &ClusterObject::Lifecycle(workflow.to_value()?), scope.txn())?;
        scope.commit()?;
        tracing::info!(item = %item, agent = %agent, "created lifecycle");
        Ok(())
    }

    pub fn load_workflow(&self, item: ItemId) -> Result<Workflow> {
        match self.storage.get(item, cluster::WORKFLOW, None)? {
            ClusterObject::Lifecycle(value) => {
                let mut workflow = Workflow::from_value(value)?;
                workflow.set_item(item);
                Ok(workflow)
            }
            other => Err(KernelError::invalid(format!(
                "{} of item {} is not a lifecycle",
                other.cluster_path(),
                item
            ))),
        }
    }

    /// Performs `transition` on the activity at `step_path` and returns the
    /// stored outcome.
    ///
    /// On failure nothing is saved and the next operation starts again from
    /// the stored lifecycle.
    pub fn request_action(
        &self,
        agent: &AgentId,
        item: ItemId,
        step_path: &str,
        transition: TransitionId,
        payload: &str,
    ) -> Result<String> {
        self.with_item_lock(item, || self.request_locked(agent, item, step_path, transition, payload))
    }

    fn request_locked(
        &self,
        agent: &AgentId,
        item: ItemId,
        step_path: &str,
        transition: TransitionId,
        payload: &str,
    ) -> Result<String> {
        let mut workflow = self.load_workflow(item)?;
        let v = workflow
            .search(step_path)
            .ok_or_else(|| KernelError::not_found(format!("Step {} in item {}", step_path, item)))?;
        if !workflow.vertex(v).map(|vertex| vertex.is_activity()).unwrap_or(false) {
            return Err(KernelError::not_found(format!("{} is not an activity", step_path)));
        }

        let scope = TransactionScope::begin(self.storage())?;
        let ctx = StepContext::new(self, agent, scope.txn());
        let outcome = match workflow.request(v, &ctx, transition, payload) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(item = %item, step = %step_path, "request failed, discarding workflow: {}", e);
                scope.abort();
                return Err(e);
            }
        };

        self.storage
            .put(item, &ClusterObject::Lifecycle(workflow.to_value()?), scope.txn())?;
        scope.commit()?;
        Ok(outcome)
    }

    pub fn calculate_jobs(&self, agent: &AgentId, item: ItemId, scope: JobScope) -> Result<Vec<Job>> {
        self.load_workflow(item)?.calculate_jobs(self, agent, scope)
    }

    pub fn calculate_all_jobs(&self, agent: &AgentId, item: ItemId, scope: JobScope) -> Result<Vec<Job>> {
        self.load_workflow(item)?.calculate_all_jobs(self, agent, scope)
    }

    /// Structural problems of the stored lifecycle, empty when it is sound.
    pub fn verify(&self, item: ItemId) -> Result<Vec<Diagnostic>> {
        let mut workflow = self.load_workflow(item)?;
        workflow.verify();
        Ok(workflow.diagnostics())
    }

    /// Sends the current jobs of every activity of the item again.
    pub fn refresh_jobs(&self, item: ItemId) -> Result<()> {
        let workflow = self.load_workflow(item)?;
        workflow.refresh_jobs(workflow.root(), self);
        Ok(())
    }

    /// Waits for queued job pushes to be delivered.
    pub async fn shutdown(&self) {
        if let Some(pusher) = &self.pusher {
            pusher.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecore::machines::default_trans;
    use lifecore::memory::{MemoryDescriptions, MemoryLookup, MemoryStorage};

    fn kernel() -> Kernel {
        Kernel::builder(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryLookup::new().with_agent("alice", "Clerk")),
            Arc::new(MemoryDescriptions::new()),
        )
        .build()
    }

    fn held_locks(kernel: &Kernel) -> usize {
        kernel.locks.lock().unwrap().len()
    }

    #[test]
    fn item_locks_are_dropped_after_each_operation() {
        let kernel = kernel();
        let alice = AgentId::new("alice");
        let mut wf = kernel.new_workflow(ItemId::new());
        let d = wf.domain();
        wf.add_activity(d, "A", true).unwrap();
        let item = wf.item();

        kernel.create_item(&alice, wf).unwrap();
        assert_eq!(held_locks(&kernel), 0);

        kernel
            .request_action(&alice, item, "domain/A", default_trans::START, "")
            .unwrap();
        assert!(kernel
            .request_action(&alice, item, "domain/Missing", default_trans::START, "")
            .is_err());
        assert!(kernel
            .request_action(&alice, ItemId::new(), "domain/A", default_trans::START, "")
            .is_err());
        assert_eq!(held_locks(&kernel), 0);
    }

    #[test]
    fn item_lock_stays_while_another_operation_waits() {
        let kernel = kernel();
        let item = ItemId::new();
        let waiting = kernel.item_lock(item);

        kernel.with_item_lock(item, || Ok(())).unwrap();
        assert_eq!(held_locks(&kernel), 1);

        kernel.release_lock(item, waiting);
        assert_eq!(held_locks(&kernel), 0);
    }
}
