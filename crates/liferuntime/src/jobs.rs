use crate::kernel::Kernel;
use crate::workflow::{Workflow, DOMAIN, ROOT};
use chrono::Utc;
use lifecore::{ActivitySnapshot, AgentId, ItemId, Job, Lookup, Result, StateMachine};
use serde::{Deserialize, Serialize};

/// Part of the lifecycle a job query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobScope {
    /// The business process
    #[default]
    Domain,
    /// Maintenance steps
    Predefined,
    All,
}

/// Wraps every transition `agent` may currently perform on `act` into a job.
pub fn activity_jobs(
    item: ItemId,
    act: &ActivitySnapshot,
    sm: &StateMachine,
    agent: &AgentId,
    lookup: &dyn Lookup,
) -> Result<Vec<Job>> {
    let created = Utc::now();
    sm.possible_transitions(act, agent, lookup)?
        .into_iter()
        .map(|(trans, role)| {
            Ok(Job {
                item,
                step_name: act.name.clone(),
                step_path: act.path.clone(),
                step_type: act.step_type.clone(),
                transition: trans.id,
                transition_name: trans.name.clone(),
                origin_state: sm.state(trans.origin)?.name.clone(),
                target_state: sm.state(trans.target)?.name.clone(),
                agent: agent.clone(),
                role,
                properties: act.properties.clone(),
                created,
            })
        })
        .collect()
}

/// Jobs on `act` alone. An inactive activity offers none unless
/// `include_inactive` is set, and the root and domain containers never do.
pub fn base_jobs(
    item: ItemId,
    act: &ActivitySnapshot,
    sm: &StateMachine,
    agent: &AgentId,
    lookup: &dyn Lookup,
    include_inactive: bool,
) -> Result<Vec<Job>> {
    if (!include_inactive && !act.active) || act.name == DOMAIN || act.path == ROOT {
        return Ok(Vec::new());
    }
    activity_jobs(item, act, sm, agent, lookup)
}

impl Workflow {
    fn scope_vertex(&self, scope: JobScope) -> crate::graph::VertexIndex {
        match scope {
            JobScope::Domain => self.domain(),
            JobScope::Predefined => self.predefined(),
            JobScope::All => self.root,
        }
    }

    /// Jobs `agent` can perform right now within `scope`.
    pub fn calculate_jobs(&self, kernel: &Kernel, agent: &AgentId, scope: JobScope) -> Result<Vec<Job>> {
        let jobs = self.calculate_vertex_jobs(self.scope_vertex(scope), kernel, agent, true)?;
        tracing::debug!(item = %self.item, "{} jobs for {} in {:?}", jobs.len(), agent, scope);
        Ok(jobs)
    }

    /// Jobs `agent` could perform within `scope`, inactive activities included.
    pub fn calculate_all_jobs(&self, kernel: &Kernel, agent: &AgentId, scope: JobScope) -> Result<Vec<Job>> {
        self.calculate_all_vertex_jobs(self.scope_vertex(scope), kernel, agent, true)
    }
}
