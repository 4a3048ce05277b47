use crate::{AgentId, BuiltInProperty, ItemId, Properties, StateId, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owned copy of the parts of an activity the state machine and the job
/// pusher look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub name: String,
    pub path: String,
    pub step_type: Option<String>,
    pub state: StateId,
    pub active: bool,
    pub properties: Properties,
}

impl ActivitySnapshot {
    /// Agent holding the reservation, if any.
    pub fn reserved_by(&self) -> Option<String> {
        self.properties.builtin_string(BuiltInProperty::AgentName)
    }

    /// Roles configured on the activity.
    pub fn roles(&self) -> Vec<String> {
        self.properties
            .builtin_string(BuiltInProperty::AgentRole)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One action an agent may currently take on an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub item: ItemId,
    pub step_name: String,
    pub step_path: String,
    pub step_type: Option<String>,
    pub transition: TransitionId,
    pub transition_name: String,
    pub origin_state: String,
    pub target_state: String,
    pub agent: AgentId,
    /// Role the transition would be performed under, `None` when unrestricted
    pub role: Option<String>,
    pub properties: Properties,
    pub created: DateTime<Utc>,
}

impl Job {
    pub fn refers_to(&self, step_path: &str) -> bool {
        self.step_path == step_path
    }
}
