use crate::{Result, StateMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Versioned definition an outcome is validated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub definition: String,
}

impl Schema {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            definition: String::new(),
        }
    }
}

/// Source of the versioned descriptions referenced by activity properties
pub trait DescriptionLoader: Send + Sync {
    /// State machine by name and version, failing `ObjectNotFound` when unknown.
    fn state_machine(&self, name: &str, version: u32) -> Result<Arc<StateMachine>>;

    /// Schema by name and version, failing `ObjectNotFound` when unknown.
    fn schema(&self, name: &str, version: u32) -> Result<Schema>;
}
