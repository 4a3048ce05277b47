//! In-memory collaborators used by the CLI and the test suites

use crate::{
    machines, AgentId, AgentJobCache, ClusterObject, ClusterStorage, DescriptionLoader, ItemId, Job, KernelError,
    Lookup, Result, RolePath, Schema, StateMachine, Transaction,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Name and version of the schema predefined steps record their parameters with
pub const PREDEFINED_OUTCOME_SCHEMA: &str = "PredefinedStepOutcome";

enum PendingWrite {
    Put(ItemId, String, ClusterObject),
    Remove(ItemId, String),
}

#[derive(Default)]
struct Store {
    committed: HashMap<ItemId, BTreeMap<String, ClusterObject>>,
    pending: HashMap<Transaction, Vec<PendingWrite>>,
}

impl Store {
    /// Objects of `item` as seen from `txn`.
    fn view(&self, item: ItemId, txn: Option<Transaction>) -> BTreeMap<String, ClusterObject> {
        let mut objects = self.committed.get(&item).cloned().unwrap_or_default();

        if let Some(writes) = txn.and_then(|t| self.pending.get(&t)) {
            for write in writes {
                match write {
                    PendingWrite::Put(i, path, obj) if *i == item => {
                        objects.insert(path.clone(), obj.clone());
                    }
                    PendingWrite::Remove(i, path) if *i == item => {
                        objects.remove(path);
                    }
                    _ => {}
                }
            }
        }
        objects
    }

    fn pending_mut(&mut self, txn: Transaction) -> Result<&mut Vec<PendingWrite>> {
        self.pending
            .get_mut(&txn)
            .ok_or_else(|| KernelError::persistency(format!("{} is not open", txn)))
    }
}

/// Transactional store keeping every item in memory
#[derive(Default)]
pub struct MemoryStorage {
    store: Mutex<Store>,
    next_txn: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| KernelError::persistency("memory storage lock poisoned"))
    }

    /// Committed objects of `item` keyed by path.
    pub fn objects(&self, item: ItemId) -> BTreeMap<String, ClusterObject> {
        self.lock().map(|s| s.view(item, None)).unwrap_or_default()
    }

    /// Number of transaction handles not yet closed.
    pub fn open_transactions(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or_default()
    }
}

impl ClusterStorage for MemoryStorage {
    fn begin(&self) -> Result<Transaction> {
        let txn = Transaction(self.next_txn.fetch_add(1, Ordering::SeqCst) + 1);
        self.lock()?.pending.insert(txn, Vec::new());
        Ok(txn)
    }

    fn get(&self, item: ItemId, path: &str, txn: Option<Transaction>) -> Result<ClusterObject> {
        self.lock()?
            .view(item, txn)
            .remove(path)
            .ok_or_else(|| KernelError::not_found(format!("{} has no object at {}", item, path)))
    }

    fn put(&self, item: ItemId, object: &ClusterObject, txn: Transaction) -> Result<()> {
        let path = object.cluster_path();
        tracing::trace!("put {} {} in {}", item, path, txn);
        self.lock()?
            .pending_mut(txn)?
            .push(PendingWrite::Put(item, path, object.clone()));
        Ok(())
    }

    fn remove(&self, item: ItemId, path: &str, txn: Transaction) -> Result<()> {
        let mut store = self.lock()?;
        if !store.view(item, Some(txn)).contains_key(path) {
            return Err(KernelError::not_found(format!("{} has no object at {}", item, path)));
        }
        store.pending_mut(txn)?.push(PendingWrite::Remove(item, path.to_string()));
        Ok(())
    }

    fn contents(&self, item: ItemId, path: &str, txn: Option<Transaction>) -> Result<Vec<String>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let names: BTreeSet<String> = self
            .lock()?
            .view(item, txn)
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }

    fn commit(&self, txn: Transaction) -> Result<()> {
        let mut store = self.lock()?;
        let writes = std::mem::take(store.pending_mut(txn)?);

        let count = writes.len();
        for write in writes {
            match write {
                PendingWrite::Put(item, path, obj) => {
                    store.committed.entry(item).or_default().insert(path, obj);
                }
                PendingWrite::Remove(item, path) => {
                    if let Some(objects) = store.committed.get_mut(&item) {
                        objects.remove(&path);
                    }
                }
            }
        }
        tracing::debug!("committed {} with {} writes", txn, count);
        Ok(())
    }

    fn abort(&self, txn: Transaction) {
        if let Ok(mut store) = self.lock() {
            if let Some(writes) = store.pending.get_mut(&txn) {
                tracing::debug!("aborted {} discarding {} writes", txn, writes.len());
                writes.clear();
            }
        }
    }

    fn close(&self, txn: Transaction) {
        if let Ok(mut store) = self.lock() {
            store.pending.remove(&txn);
        }
    }
}

struct RoleEntry {
    path: RolePath,
    parent: Option<String>,
    agents: BTreeSet<AgentId>,
}

/// Role directory held in memory
#[derive(Default)]
pub struct MemoryLookup {
    roles: HashMap<String, RoleEntry>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, name: &str, has_job_list: bool) -> Self {
        self.add_role(name, None, has_job_list);
        self
    }

    pub fn with_child_role(mut self, parent: &str, name: &str, has_job_list: bool) -> Self {
        self.add_role(name, Some(parent), has_job_list);
        self
    }

    /// Grants `role` to `agent`, creating the role with a job list if unknown.
    pub fn with_agent(mut self, agent: &str, role: &str) -> Self {
        self.add_agent(agent, role);
        self
    }

    pub fn add_role(&mut self, name: &str, parent: Option<&str>, has_job_list: bool) {
        self.roles.insert(
            name.to_string(),
            RoleEntry {
                path: RolePath::new(name, has_job_list),
                parent: parent.map(str::to_string),
                agents: BTreeSet::new(),
            },
        );
    }

    pub fn add_agent(&mut self, agent: &str, role: &str) {
        self.roles
            .entry(role.to_string())
            .or_insert_with(|| RoleEntry {
                path: RolePath::new(role, true),
                parent: None,
                agents: BTreeSet::new(),
            })
            .agents
            .insert(AgentId::new(agent));
    }

    fn collect_agents(&self, role: &str, seen: &mut HashSet<String>, agents: &mut BTreeSet<AgentId>) {
        if !seen.insert(role.to_string()) {
            return;
        }
        if let Some(entry) = self.roles.get(role) {
            agents.extend(entry.agents.iter().cloned());
        }
        for (name, entry) in &self.roles {
            if entry.parent.as_deref() == Some(role) {
                self.collect_agents(name, seen, agents);
            }
        }
    }
}

impl Lookup for MemoryLookup {
    fn role(&self, name: &str) -> Result<RolePath> {
        self.roles
            .get(name)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| KernelError::not_found(format!("Role '{}'", name)))
    }

    fn child_roles(&self, role: &RolePath) -> Result<Vec<RolePath>> {
        let mut children: Vec<RolePath> = self
            .roles
            .values()
            .filter(|entry| entry.parent.as_deref() == Some(role.name.as_str()))
            .map(|entry| entry.path.clone())
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn agents(&self, role: &RolePath) -> Result<Vec<AgentId>> {
        if !self.roles.contains_key(&role.name) {
            return Err(KernelError::not_found(format!("Role '{}'", role.name)));
        }
        let mut agents = BTreeSet::new();
        self.collect_agents(&role.name, &mut HashSet::new(), &mut agents);
        Ok(agents.into_iter().collect())
    }

    fn has_role(&self, agent: &AgentId, role: &RolePath) -> bool {
        self.agents(role).map(|agents| agents.contains(agent)).unwrap_or(false)
    }
}

/// Description store preloaded with the built-in state machines
pub struct MemoryDescriptions {
    machines: HashMap<(String, u32), Arc<StateMachine>>,
    schemas: HashMap<(String, u32), Schema>,
}

impl MemoryDescriptions {
    pub fn new() -> Self {
        let mut descriptions = Self {
            machines: HashMap::new(),
            schemas: HashMap::new(),
        };
        for machine in machines::all() {
            descriptions.add_state_machine(machine);
        }
        descriptions.add_schema(Schema::new(PREDEFINED_OUTCOME_SCHEMA, 0));
        descriptions
    }

    pub fn with_state_machine(mut self, machine: StateMachine) -> Self {
        self.add_state_machine(machine);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.add_schema(schema);
        self
    }

    pub fn add_state_machine(&mut self, machine: StateMachine) {
        self.machines
            .insert((machine.name.clone(), machine.version), Arc::new(machine));
    }

    pub fn add_schema(&mut self, schema: Schema) {
        self.schemas.insert((schema.name.clone(), schema.version), schema);
    }
}

impl Default for MemoryDescriptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptionLoader for MemoryDescriptions {
    fn state_machine(&self, name: &str, version: u32) -> Result<Arc<StateMachine>> {
        self.machines
            .get(&(name.to_string(), version))
            .cloned()
            .ok_or_else(|| KernelError::not_found(format!("StateMachine '{}' v{}", name, version)))
    }

    fn schema(&self, name: &str, version: u32) -> Result<Schema> {
        self.schemas
            .get(&(name.to_string(), version))
            .cloned()
            .ok_or_else(|| KernelError::not_found(format!("Schema '{}' v{}", name, version)))
    }
}

/// Job list delivered to one agent
#[derive(Debug, Clone)]
pub struct JobListRefresh {
    pub agent: AgentId,
    pub item: ItemId,
    pub step_path: String,
    pub jobs: Vec<Job>,
}

/// Agent job cache remembering every delivery, optionally refusing some agents
#[derive(Default)]
pub struct RecordingJobCache {
    refreshes: tokio::sync::Mutex<Vec<JobListRefresh>>,
    unreachable: HashSet<AgentId>,
}

impl RecordingJobCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to `agent` fail as if the agent could not be contacted.
    pub fn with_unreachable(mut self, agent: &str) -> Self {
        self.unreachable.insert(AgentId::new(agent));
        self
    }

    pub async fn refreshes(&self) -> Vec<JobListRefresh> {
        self.refreshes.lock().await.clone()
    }

    pub async fn refreshes_for(&self, agent: &str) -> Vec<JobListRefresh> {
        self.refreshes
            .lock()
            .await
            .iter()
            .filter(|r| r.agent.as_str() == agent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentJobCache for RecordingJobCache {
    async fn refresh_job_list(&self, agent: &AgentId, item: ItemId, step_path: &str, jobs: String) -> Result<()> {
        if self.unreachable.contains(agent) {
            return Err(KernelError::not_found(format!("Agent '{}' is not reachable", agent)));
        }

        let jobs: Vec<Job> = serde_json::from_str(&jobs)?;
        self.refreshes.lock().await.push(JobListRefresh {
            agent: agent.clone(),
            item,
            step_path: step_path.to_string(),
            jobs,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemProperty;

    fn property(name: &str, value: &str) -> ClusterObject {
        ClusterObject::Property(ItemProperty {
            name: name.into(),
            value: value.into(),
            mutable: true,
        })
    }

    #[test]
    fn pending_writes_are_visible_only_inside_their_transaction() {
        let storage = MemoryStorage::new();
        let item = ItemId::new();
        let txn = storage.begin().unwrap();

        storage.put(item, &property("Status", "Open"), txn).unwrap();

        assert!(storage.get(item, "Property/Status", Some(txn)).is_ok());
        assert!(matches!(
            storage.get(item, "Property/Status", None),
            Err(KernelError::ObjectNotFound(_))
        ));

        storage.commit(txn).unwrap();
        assert!(storage.get(item, "Property/Status", None).is_ok());

        storage.close(txn);
        assert_eq!(storage.open_transactions(), 0);
    }

    #[test]
    fn abort_discards_writes() {
        let storage = MemoryStorage::new();
        let item = ItemId::new();
        let txn = storage.begin().unwrap();

        storage.put(item, &property("Status", "Open"), txn).unwrap();
        storage.abort(txn);
        storage.commit(txn).unwrap();
        assert!(storage.objects(item).is_empty());

        storage.close(txn);
        assert!(matches!(storage.commit(txn), Err(KernelError::Persistency(_))));
    }

    #[test]
    fn contents_lists_direct_children() {
        let storage = MemoryStorage::new();
        let item = ItemId::new();
        let txn = storage.begin().unwrap();
        storage.put(item, &property("Status", "Open"), txn).unwrap();
        storage.put(item, &property("Owner", "bob"), txn).unwrap();
        storage.commit(txn).unwrap();

        assert_eq!(storage.contents(item, "Property", None).unwrap(), vec!["Owner", "Status"]);
        assert!(storage.contents(item, "AuditTrail", None).unwrap().is_empty());
    }

    #[test]
    fn agents_are_collected_through_child_roles() {
        let lookup = MemoryLookup::new()
            .with_role("Staff", true)
            .with_child_role("Staff", "Clerk", true)
            .with_agent("alice", "Staff")
            .with_agent("bob", "Clerk");

        let staff = lookup.role("Staff").unwrap();
        let clerk = lookup.role("Clerk").unwrap();

        let agents = lookup.agents(&staff).unwrap();
        assert_eq!(agents, vec![AgentId::new("alice"), AgentId::new("bob")]);
        assert!(lookup.has_role(&AgentId::new("bob"), &staff));
        assert!(!lookup.has_role(&AgentId::new("alice"), &clerk));
        assert!(matches!(lookup.role("Nobody"), Err(KernelError::ObjectNotFound(_))));
    }

    #[test]
    fn builtin_machines_are_loaded() {
        let descriptions = MemoryDescriptions::new();
        assert!(descriptions.state_machine(machines::DEFAULT, 0).is_ok());
        assert!(descriptions.state_machine(machines::COMPOSITE_ACTIVITY, 0).is_ok());
        assert!(descriptions.state_machine("Unknown", 0).is_err());
        assert!(descriptions.schema(PREDEFINED_OUTCOME_SCHEMA, 0).is_ok());
    }
}
