//! Workflow graph engine
//!
//! A lifecycle is one arena of vertices: activities bound to state machines,
//! composites holding child graphs, splits, joins and loops. This crate moves
//! it through the transition protocol, checks its structure, computes jobs
//! and pushes them to agents, and hosts the `Kernel` that loads and saves it
//! per item.

mod activity;
mod composite;
mod graph;
mod history;
mod jobs;
mod join;
mod kernel;
mod pusher;
mod registry;
mod routing;
mod split;
mod traversal;
mod verify;
mod vertex;
mod workflow;

pub use graph::{ActivityState, ChildGraph, Next, NextIndex, SplitKind, Vertex, VertexIndex, VertexKind, VertexTag};
pub use history::History;
pub use jobs::{activity_jobs, base_jobs, JobScope};
pub use kernel::{Kernel, KernelBuilder, KernelConfig, StepContext};
pub use pusher::{JobPusher, PushRequest};
pub use registry::{ActivityLogic, LogicContext, StepRegistry};
pub use routing::ExpressionRouting;
pub use traversal::Traverse;
pub use verify::Diagnostic;
pub use workflow::{Workflow, DOMAIN, PREDEFINED, ROOT};
