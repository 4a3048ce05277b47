//! Behaviour dispatch over the vertex kinds

use crate::graph::{VertexIndex, VertexTag};
use crate::kernel::StepContext;
use crate::workflow::Workflow;
use lifecore::{KernelError, Result, TransitionId};
use std::collections::HashSet;

impl Workflow {
    /// Makes `v` eligible for execution.
    pub(crate) fn run(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        match self.vertex_or_err(v)?.tag() {
            VertexTag::Activity => self.activity_run(v, ctx),
            VertexTag::Composite => self.composite_run(v, ctx),
            VertexTag::Split(_) | VertexTag::Join => self.run_next(v, ctx),
        }
    }

    /// Hands control on once `v` is done.
    pub(crate) fn run_next(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        match self.vertex_or_err(v)?.tag() {
            VertexTag::Activity => self.activity_run_next(v, ctx),
            VertexTag::Composite => self.composite_run_next(v, ctx),
            VertexTag::Split(split) => self.split_run_next(v, split, ctx),
            VertexTag::Join => self.join_run_next(v, ctx),
        }
    }

    /// Entry point used when a (sub)graph starts.
    pub(crate) fn run_first(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        if self.vertex_or_err(v)?.is_join() {
            self.run_next(v, ctx)
        } else {
            self.run(v, ctx)
        }
    }

    /// Resets every vertex downstream of `v` until `loop_vertex` is met again.
    pub(crate) fn reinit(&mut self, v: VertexIndex, loop_vertex: VertexIndex) {
        let mut visited = HashSet::new();
        self.reinit_from(v, loop_vertex, &mut visited);
    }

    pub(crate) fn reinit_from(&mut self, v: VertexIndex, loop_vertex: VertexIndex, visited: &mut HashSet<VertexIndex>) {
        if !visited.insert(v) {
            return;
        }
        tracing::trace!("reinit {}", self.path(v));

        match self.graph[v].tag() {
            VertexTag::Activity => self.activity_reinit(v, loop_vertex, visited),
            VertexTag::Composite => self.composite_reinit(v, loop_vertex, visited),
            VertexTag::Split(split) => self.split_reinit(v, split, loop_vertex, visited),
            VertexTag::Join => {
                let outs = self.outs(v);
                if let [next] = outs.as_slice() {
                    self.reinit_from(*next, loop_vertex, visited);
                }
            }
        }
    }

    /// Deactivates `v` and, for a composite, everything inside it.
    pub fn abort(&mut self, v: VertexIndex) {
        for child in self.children(v).to_vec() {
            self.abort(child);
        }
        self.set_active(v, false);
    }

    /// Cycle probe: whether walking forward from `v` comes back around.
    pub fn loops(&self, v: VertexIndex) -> bool {
        let mut visiting = HashSet::new();
        self.loops_from(v, &mut visiting)
    }

    fn loops_from(&self, v: VertexIndex, visiting: &mut HashSet<VertexIndex>) -> bool {
        let vertex = &self.graph[v];
        if vertex.is_loop() {
            return true;
        }
        if !visiting.insert(v) {
            return vertex.is_join();
        }

        let outs = self.outs(v);
        let found = match vertex.tag() {
            VertexTag::Split(_) => outs.iter().any(|next| self.loops_from(*next, visiting)),
            _ => outs.first().map(|next| self.loops_from(*next, visiting)).unwrap_or(false),
        };

        visiting.remove(&v);
        found
    }

    /// Performs `transition` on the activity `v`.
    pub fn request(
        &mut self,
        v: VertexIndex,
        ctx: &StepContext<'_>,
        transition: TransitionId,
        payload: &str,
    ) -> Result<String> {
        match self.vertex_or_err(v)?.tag() {
            VertexTag::Activity => self.activity_request(v, ctx, transition, payload),
            VertexTag::Composite => self.composite_request(v, ctx, transition, payload),
            _ => Err(KernelError::not_found(format!("{} is not an activity", self.path(v)))),
        }
    }
}
