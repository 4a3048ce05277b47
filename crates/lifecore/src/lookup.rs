use crate::{AgentId, Result};
use serde::{Deserialize, Serialize};

/// A named group of agents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePath {
    pub name: String,
    /// Whether agents of this role keep a job list that should be pushed to
    pub has_job_list: bool,
}

impl RolePath {
    pub fn new(name: impl Into<String>, has_job_list: bool) -> Self {
        Self {
            name: name.into(),
            has_job_list,
        }
    }
}

/// Identity and role directory
pub trait Lookup: Send + Sync {
    /// Resolve a role by name, failing `ObjectNotFound` when unknown.
    fn role(&self, name: &str) -> Result<RolePath>;

    /// Direct child roles of `role`.
    fn child_roles(&self, role: &RolePath) -> Result<Vec<RolePath>>;

    /// Agents holding `role`, including members of its child roles.
    fn agents(&self, role: &RolePath) -> Result<Vec<AgentId>>;

    /// Whether `agent` holds `role` directly.
    fn has_role(&self, agent: &AgentId, role: &RolePath) -> bool;

    /// First role of `roles` held by `agent`.
    fn first_matching_role<'r>(&self, agent: &AgentId, roles: &'r [RolePath]) -> Option<&'r RolePath> {
        roles.iter().find(|role| self.has_role(agent, role))
    }
}
