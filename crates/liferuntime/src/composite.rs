use crate::graph::VertexIndex;
use crate::kernel::{Kernel, StepContext};
use crate::workflow::Workflow;
use lifecore::machines::composite_trans::{COMPLETE, START};
use lifecore::{AgentId, BuiltInProperty, Job, KernelError, Result, StateId, TransitionId};
use std::collections::HashSet;

// states of the composite machine
const WAITING: StateId = 0;
const STARTED: StateId = 1;

impl Workflow {
    pub(crate) fn composite_run(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        self.activity_run(v, ctx)?;

        let Some(start) = self.start_vertex(v) else {
            return Ok(());
        };
        if self.is_finished(v, ctx.kernel)? {
            return Ok(());
        }

        match self.state(v, ctx.kernel)? {
            WAITING => match self.request(v, ctx, START, "") {
                Ok(_) => Ok(()),
                Err(KernelError::AccessRights(reason)) => {
                    tracing::warn!(
                        item = %self.item,
                        step = %self.path(v),
                        "{} may not start the composite, leaving it waiting: {}",
                        ctx.agent,
                        reason
                    );
                    Ok(())
                }
                Err(e @ (KernelError::InvalidData(_) | KernelError::InvalidTransition(_))) => Err(KernelError::invalid(
                    format!("Problem initializing composite activity {}: {}", self.path(v), e),
                )),
                Err(e) => Err(e),
            },
            STARTED => self.run_first(start, ctx),
            _ => Ok(()),
        }
    }

    pub(crate) fn composite_run_next(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        if self.is_finished(v, ctx.kernel)? {
            return self.activity_run_next(v, ctx);
        }

        // a successful completion carries on downstream by itself
        match self.request(v, ctx, COMPLETE, "") {
            Ok(_) => {}
            Err(e @ KernelError::Persistency(_)) => return Err(e),
            Err(e) => tracing::warn!(
                item = %self.item,
                step = %self.path(v),
                "{} could not complete the composite, leaving it open: {}",
                ctx.agent,
                e
            ),
        }
        Ok(())
    }

    pub(crate) fn composite_request(
        &mut self,
        v: VertexIndex,
        ctx: &StepContext<'_>,
        transition: TransitionId,
        payload: &str,
    ) -> Result<String> {
        if transition == COMPLETE && self.has_active(v) {
            let abortable = self.graph[v].properties.flag(BuiltInProperty::Abortable);
            if !abortable {
                return Err(KernelError::transition(format!(
                    "Attempted to finish the composite activity {} that had active children but was not Abortable",
                    self.path(v)
                )));
            }
            for child in self.children(v).to_vec() {
                self.abort(child);
            }
        }

        let outcome = self.activity_request(v, ctx, transition, payload)?;

        if transition == START && !self.is_finished(v, ctx.kernel)? {
            if let Some(start) = self.start_vertex(v) {
                self.run_first(start, ctx)?;
            }
        }
        Ok(outcome)
    }

    pub(crate) fn composite_reinit(
        &mut self,
        v: VertexIndex,
        loop_vertex: VertexIndex,
        visited: &mut HashSet<VertexIndex>,
    ) {
        self.activity_reinit(v, loop_vertex, visited);
        if let Some(start) = self.start_vertex(v) {
            self.reinit_from(start, loop_vertex, visited);
        }
    }

    /// Whether any activity nested in `v` is active. The composite's own flag
    /// is not considered.
    pub fn has_active(&self, v: VertexIndex) -> bool {
        self.children(v).iter().any(|child| {
            let vertex = &self.graph[*child];
            vertex.is_active() || (vertex.is_composite() && self.has_active(*child))
        })
    }

    /// At most one child of a composite may end its graph.
    pub fn has_good_number_of_activities(&self, v: VertexIndex) -> bool {
        if v == self.root {
            return true;
        }
        let endings = self
            .children(v)
            .iter()
            .filter(|child| self.outs(**child).is_empty())
            .count();
        endings <= 1
    }

    /// Jobs of `v` and, with `recurse`, of everything nested in it. A composite
    /// only offers its own jobs while none of its children is active.
    pub fn calculate_vertex_jobs(&self, v: VertexIndex, kernel: &Kernel, agent: &AgentId, recurse: bool) -> Result<Vec<Job>> {
        let vertex = self.vertex_or_err(v)?;
        if !vertex.is_activity() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        let mut child_active = false;
        if vertex.is_composite() && recurse {
            for child in self.children(v) {
                if self.graph[*child].is_activity() {
                    jobs.extend(self.calculate_vertex_jobs(*child, kernel, agent, recurse)?);
                    child_active |= self.graph[*child].is_active();
                }
            }
        }
        if !child_active {
            jobs.extend(self.jobs_base(v, kernel, agent, false)?);
        }
        Ok(jobs)
    }

    /// Like `calculate_vertex_jobs` but including inactive activities.
    pub fn calculate_all_vertex_jobs(&self, v: VertexIndex, kernel: &Kernel, agent: &AgentId, recurse: bool) -> Result<Vec<Job>> {
        let vertex = self.vertex_or_err(v)?;
        if !vertex.is_activity() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        if vertex.is_composite() && recurse {
            for child in self.children(v) {
                jobs.extend(self.calculate_all_vertex_jobs(*child, kernel, agent, recurse)?);
            }
        }
        jobs.extend(self.jobs_base(v, kernel, agent, true)?);
        Ok(jobs)
    }

    /// Pushes the current jobs of every activity nested in `v`.
    pub fn refresh_jobs(&self, v: VertexIndex, kernel: &Kernel) {
        for child in self.children(v) {
            let vertex = &self.graph[*child];
            if vertex.is_composite() {
                self.refresh_jobs(*child, kernel);
            } else if vertex.is_activity() {
                self.push_jobs(*child, kernel);
            }
        }
    }
}
