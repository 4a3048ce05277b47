use crate::{AgentId, ItemId, StateId, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the viewpoint always pointing at the most recent outcome of a schema
pub const LAST_VIEW: &str = "last";

/// Top level storage folders
pub mod cluster {
    pub const AUDIT_TRAIL: &str = "AuditTrail";
    pub const OUTCOME: &str = "Outcome";
    pub const VIEWPOINT: &str = "ViewPoint";
    pub const PROPERTY: &str = "Property";
    pub const LIFECYCLE: &str = "LifeCycle";

    /// Path of the stored workflow of an item
    pub const WORKFLOW: &str = "LifeCycle/workflow";
}

/// Immutable audit record of one transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub item: ItemId,
    pub agent: AgentId,
    pub agent_role: Option<String>,
    pub step_name: String,
    pub step_path: String,
    pub step_type: Option<String>,
    pub state_machine: String,
    pub state_machine_version: u32,
    pub transition: TransitionId,
    pub origin_state: StateId,
    pub target_state: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Reference to a schema by name and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaRef {
    pub name: String,
    pub version: u32,
}

impl SchemaRef {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Document submitted with a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub event_id: u64,
    pub schema: SchemaRef,
    pub data: String,
}

/// Named pointer from a schema to one of its outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub item: ItemId,
    pub schema: SchemaRef,
    pub name: String,
    pub event_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProperty {
    pub name: String,
    pub value: String,
    #[serde(default = "default_mutable")]
    pub mutable: bool,
}

fn default_mutable() -> bool {
    true
}

/// Anything an item keeps in its storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cluster", content = "object")]
pub enum ClusterObject {
    Event(Event),
    Outcome(Outcome),
    Viewpoint(Viewpoint),
    Property(ItemProperty),
    Lifecycle(serde_json::Value),
}

impl ClusterObject {
    /// Storage path the object lives under within its item.
    pub fn cluster_path(&self) -> String {
        match self {
            ClusterObject::Event(e) => format!("{}/{}", cluster::AUDIT_TRAIL, e.id),
            ClusterObject::Outcome(o) => format!(
                "{}/{}/{}/{}",
                cluster::OUTCOME,
                o.schema.name,
                o.schema.version,
                o.event_id
            ),
            ClusterObject::Viewpoint(v) => format!("{}/{}/{}", cluster::VIEWPOINT, v.schema.name, v.name),
            ClusterObject::Property(p) => format!("{}/{}", cluster::PROPERTY, p.name),
            ClusterObject::Lifecycle(_) => cluster::WORKFLOW.to_string(),
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            ClusterObject::Event(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_outcome(&self) -> Option<&Outcome> {
        match self {
            ClusterObject::Outcome(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_viewpoint(&self) -> Option<&Viewpoint> {
        match self {
            ClusterObject::Viewpoint(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&ItemProperty> {
        match self {
            ClusterObject::Property(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_paths_follow_storage_layout() {
        let item = ItemId::new();
        let schema = SchemaRef::new("Order", 2);

        let outcome = ClusterObject::Outcome(Outcome {
            event_id: 7,
            schema: schema.clone(),
            data: "<Order/>".into(),
        });
        let view = ClusterObject::Viewpoint(Viewpoint {
            item,
            schema,
            name: LAST_VIEW.into(),
            event_id: 7,
        });
        let prop = ClusterObject::Property(ItemProperty {
            name: "Status".into(),
            value: "Open".into(),
            mutable: true,
        });

        assert_eq!(outcome.cluster_path(), "Outcome/Order/2/7");
        assert_eq!(view.cluster_path(), "ViewPoint/Order/last");
        assert_eq!(prop.cluster_path(), "Property/Status");
        assert_eq!(ClusterObject::Lifecycle(serde_json::Value::Null).cluster_path(), "LifeCycle/workflow");
    }
}
