//! Shared definitions of the lifecycle kernel
//!
//! This crate holds the types every other component depends on: the error
//! taxonomy, property bags, the state machine model, audit records, jobs and
//! the traits of the collaborators the kernel talks to.

mod agent;
pub mod audit;
mod description;
mod error;
mod events;
mod ids;
mod job;
mod lookup;
pub mod machines;
pub mod memory;
mod properties;
pub mod routing;
mod state_machine;
mod storage;

pub use agent::AgentJobCache;
pub use audit::{ClusterObject, Event, ItemProperty, Outcome, SchemaRef, Viewpoint, LAST_VIEW};
pub use description::{DescriptionLoader, Schema};
pub use error::KernelError;
pub use events::{EventBus, KernelEvent};
pub use ids::{AgentId, ItemId, Transaction};
pub use job::{ActivitySnapshot, Job};
pub use lookup::{Lookup, RolePath};
pub use properties::{BuiltInProperty, Properties, PropertyValue};
pub use routing::{RoutingEvaluator, RoutingRequest, RoutingScope};
pub use state_machine::{
    Reservation, State, StateId, StateMachine, Transition, TransitionId, TransitionOutcome, ADMIN_ROLE,
};
pub use storage::{item_property, ClusterStorage, TransactionScope};

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;
