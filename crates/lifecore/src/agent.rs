use crate::{AgentId, ItemId, Result};
use async_trait::async_trait;

/// Per-agent cache of jobs, kept current by the job pusher
#[async_trait]
pub trait AgentJobCache: Send + Sync {
    /// Replace the jobs `agent` holds for the activity at `step_path` of `item`.
    ///
    /// `jobs` is the JSON array of the agent's current jobs on the activity.
    async fn refresh_job_list(&self, agent: &AgentId, item: ItemId, step_path: &str, jobs: String) -> Result<()>;
}
