#![allow(dead_code)]

use lifecore::machines::default_trans;
use lifecore::memory::{MemoryDescriptions, MemoryLookup, MemoryStorage};
use lifecore::{
    AgentId, ClusterObject, ClusterStorage, ItemId, ItemProperty, KernelError, Result, Transaction,
};
use liferuntime::{Kernel, Workflow};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Storage whose commits can be made to fail
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_commits: AtomicBool,
    /// Commits left until one fails, zero when none is scheduled
    pub countdown: AtomicUsize,
}

impl FlakyStorage {
    pub fn fail(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Makes the `n`th commit from now fail, once.
    pub fn fail_nth_commit(&self, n: usize) {
        self.countdown.store(n, Ordering::SeqCst);
    }

    fn scheduled_failure(&self) -> bool {
        let left = self
            .countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        left == Ok(1)
    }
}

impl ClusterStorage for FlakyStorage {
    fn begin(&self) -> Result<Transaction> {
        self.inner.begin()
    }

    fn get(&self, item: ItemId, path: &str, txn: Option<Transaction>) -> Result<ClusterObject> {
        self.inner.get(item, path, txn)
    }

    fn put(&self, item: ItemId, object: &ClusterObject, txn: Transaction) -> Result<()> {
        self.inner.put(item, object, txn)
    }

    fn remove(&self, item: ItemId, path: &str, txn: Transaction) -> Result<()> {
        self.inner.remove(item, path, txn)
    }

    fn contents(&self, item: ItemId, path: &str, txn: Option<Transaction>) -> Result<Vec<String>> {
        self.inner.contents(item, path, txn)
    }

    fn commit(&self, txn: Transaction) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) || self.scheduled_failure() {
            return Err(KernelError::persistency("disk full"));
        }
        self.inner.commit(txn)
    }

    fn abort(&self, txn: Transaction) {
        self.inner.abort(txn)
    }

    fn close(&self, txn: Transaction) {
        self.inner.close(txn)
    }
}

pub fn lookup() -> MemoryLookup {
    MemoryLookup::new()
        .with_role("Admin", false)
        .with_agent("alice", "Clerk")
        .with_agent("bob", "Reviewer")
        .with_agent("carol", "Approver")
        .with_agent("dave", "Reviewer")
        .with_agent("dave", "Approver")
        .with_agent("root", "Admin")
}

pub struct Fixture {
    pub storage: Arc<FlakyStorage>,
    pub kernel: Kernel,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_descriptions(MemoryDescriptions::new())
    }

    pub fn with_descriptions(descriptions: MemoryDescriptions) -> Self {
        init_tracing();
        let storage = Arc::new(FlakyStorage::default());
        let kernel = Kernel::builder(storage.clone(), Arc::new(lookup()), Arc::new(descriptions)).build();
        Self { storage, kernel }
    }

    pub fn create(&self, workflow: Workflow) -> ItemId {
        let item = workflow.item();
        self.kernel.create_item(&agent("alice"), workflow).unwrap();
        item
    }

    pub fn start(&self, item: ItemId, agent_name: &str, step: &str) -> Result<String> {
        self.kernel
            .request_action(&agent(agent_name), item, step, default_trans::START, "")
    }

    pub fn complete(&self, item: ItemId, agent_name: &str, step: &str) -> Result<String> {
        self.kernel
            .request_action(&agent(agent_name), item, step, default_trans::COMPLETE, "")
    }

    /// Starts and completes `step` as `agent_name`.
    pub fn finish(&self, item: ItemId, agent_name: &str, step: &str) {
        self.start(item, agent_name, step).unwrap();
        self.complete(item, agent_name, step).unwrap();
    }

    pub fn state(&self, item: ItemId, step: &str) -> String {
        let wf = self.kernel.load_workflow(item).unwrap();
        let v = wf.search(step).unwrap();
        wf.state_name(v, &self.kernel).unwrap()
    }

    pub fn is_active(&self, item: ItemId, step: &str) -> bool {
        let wf = self.kernel.load_workflow(item).unwrap();
        wf.is_active(wf.search(step).unwrap())
    }

    pub fn set_item_property(&self, item: ItemId, name: &str, value: &str) {
        let txn = self.storage.begin().unwrap();
        let property = ClusterObject::Property(ItemProperty {
            name: name.into(),
            value: value.into(),
            mutable: true,
        });
        self.storage.put(item, &property, txn).unwrap();
        self.storage.commit(txn).unwrap();
        self.storage.close(txn);
    }

    pub fn events_of(&self, item: ItemId, step_path: &str) -> usize {
        self.storage
            .inner
            .objects(item)
            .values()
            .filter_map(ClusterObject::as_event)
            .filter(|e| e.step_path == step_path)
            .count()
    }
}

pub fn agent(name: &str) -> AgentId {
    AgentId::new(name)
}
