use crate::graph::VertexIndex;
use crate::kernel::StepContext;
use crate::traversal::Traverse;
use crate::workflow::{Workflow, DOMAIN};
use lifecore::Result;

impl Workflow {
    /// Barrier: hands control on only when nothing upstream is still active.
    pub(crate) fn join_run_next(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        let pending = self
            .traversal(v, Traverse::Up, true)
            .into_iter()
            .find(|prev| self.graph[*prev].is_activity() && self.graph[*prev].is_active());

        if let Some(prev) = pending {
            tracing::debug!(item = %self.item, "{} waits for {}", self.path(v), self.path(prev));
            return Ok(());
        }

        match self.outs(v).first().copied() {
            Some(next) => self.run(next, ctx),
            None => match self.parent(v) {
                Some(parent) if self.graph[parent].name != DOMAIN => self.run_next(parent, ctx),
                _ => Ok(()),
            },
        }
    }
}
