//! Standard predefined steps
//!
//! Maintenance logic every lifecycle offers next to its business process.

mod params;
mod property;
mod viewpoint;

pub use params::{bundle, unbundle};
pub use property::WriteProperty;
pub use viewpoint::{RemoveViewpoint, WriteViewpoint};
use liferuntime::StepRegistry;

use std::sync::Arc;

/// Register all standard steps with a registry
pub fn register_all(registry: &mut StepRegistry) {
    registry.register(Arc::new(WriteProperty));
    registry.register(Arc::new(WriteViewpoint));
    registry.register(Arc::new(RemoveViewpoint));
}
