use lifecore::{
    ActivitySnapshot, AgentId, ClusterStorage, DescriptionLoader, ItemId, Lookup, Result, Transaction, TransitionId,
};
use std::collections::HashMap;
use std::sync::Arc;

/// What step logic may see and touch while a transition runs
pub struct LogicContext<'a> {
    pub storage: &'a dyn ClusterStorage,
    pub lookup: &'a dyn Lookup,
    pub descriptions: &'a dyn DescriptionLoader,
    pub item: ItemId,
    pub agent: &'a AgentId,
    pub step: &'a ActivitySnapshot,
    pub transition: TransitionId,
    /// Writes made under this transaction commit together with the audit event
    pub txn: Transaction,
}

/// Business logic run by an activity on each of its transitions
pub trait ActivityLogic: Send + Sync {
    /// Name the logic is registered under
    fn step_type(&self) -> &str;

    fn description(&self) -> String {
        String::new()
    }

    /// Performs the side effects of the transition and returns the outcome to
    /// store, usually `payload` itself.
    fn run(&self, ctx: &LogicContext<'_>, payload: &str) -> Result<String>;
}

/// Step logic known to the kernel, also the source of the predefined steps
pub struct StepRegistry {
    logic: HashMap<String, Arc<dyn ActivityLogic>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self { logic: HashMap::new() }
    }

    pub fn register(&mut self, logic: Arc<dyn ActivityLogic>) {
        let step_type = logic.step_type().to_string();
        tracing::info!("Registering step logic: {}", step_type);
        self.logic.insert(step_type, logic);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn ActivityLogic>> {
        self.logic.get(step_type).cloned()
    }

    /// Registered step types, sorted.
    pub fn list_step_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.logic.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn description(&self, step_type: &str) -> Option<String> {
        self.logic
            .get(step_type)
            .map(|l| l.description())
            .filter(|d| !d.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.logic.is_empty()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
