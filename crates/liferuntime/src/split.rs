use crate::graph::{SplitKind, VertexIndex};
use crate::kernel::StepContext;
use crate::workflow::Workflow;
use lifecore::routing::parse_aliases;
use lifecore::{
    item_property, BuiltInProperty, ClusterStorage, ItemId, KernelError, Result, RoutingRequest, RoutingScope,
    Transaction,
};
use std::collections::HashSet;

/// Item properties as seen from inside the running transaction
struct ItemScope<'a> {
    storage: &'a dyn ClusterStorage,
    item: ItemId,
    txn: Transaction,
}

impl RoutingScope for ItemScope<'_> {
    fn item_property(&self, name: &str) -> Result<Option<String>> {
        item_property(self.storage, self.item, name, Some(self.txn))
    }
}

impl Workflow {
    pub(crate) fn split_run_next(&mut self, v: VertexIndex, split: SplitKind, ctx: &StepContext<'_>) -> Result<()> {
        if split == SplitKind::And {
            for next in self.outs(v) {
                self.run(next, ctx)?;
            }
            return Ok(());
        }

        let aliases = self.calculate_nexts(v, ctx)?;
        let chosen: Vec<(String, VertexIndex)> = self
            .out_edges(v)
            .into_iter()
            .map(|(edge, terminus)| (self.graph[edge].alias.clone(), terminus))
            .filter(|(alias, _)| aliases.contains(alias))
            .collect();
        tracing::debug!(item = %self.item, split = %self.path(v), "routing enabled {:?}", aliases);

        match split {
            SplitKind::Or => {
                if chosen.is_empty() {
                    return Err(KernelError::invalid(format!("No nexts were activated on {}", self.path(v))));
                }
                for (alias, terminus) in chosen {
                    self.run(terminus, ctx).map_err(|e| {
                        KernelError::invalid(format!("Error enabling next {} of {}: {}", alias, self.path(v), e))
                    })?;
                }
                Ok(())
            }
            _ => match chosen.as_slice() {
                [(_, terminus)] => self.follow_next(v, split, *terminus, ctx),
                _ => Err(KernelError::invalid(format!(
                    "{} active nexts on {}, exactly one was expected",
                    chosen.len(),
                    self.path(v)
                ))),
            },
        }
    }

    fn follow_next(&mut self, v: VertexIndex, split: SplitKind, terminus: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        if split == SplitKind::Loop && self.is_ancestor(v, terminus) {
            tracing::info!(item = %self.item, "{} loops back to {}", self.path(v), self.path(terminus));
            self.reinit(terminus, v);
        }
        self.run(terminus, ctx)
    }

    /// Aliases enabled by the routing of the split `v`.
    fn calculate_nexts(&self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<Vec<String>> {
        let vertex = self.vertex_or_err(v)?;
        let props = &vertex.properties;
        if props.builtin_string(BuiltInProperty::RoutingExpr).is_none()
            && props.builtin_string(BuiltInProperty::RoutingScriptName).is_none()
        {
            return Err(KernelError::invalid(format!(
                "Split {} is invalid without valid Routing Script or expression",
                self.path(v)
            )));
        }

        let path = self.path(v);
        let scope = ItemScope {
            storage: ctx.kernel.storage(),
            item: self.item,
            txn: ctx.txn,
        };
        let request = RoutingRequest {
            item: self.item,
            split_name: &vertex.name,
            split_path: &path,
            properties: props,
            scope: &scope,
            txn: ctx.txn,
        };
        let result = ctx.kernel.routing().evaluate(&request)?;
        Ok(parse_aliases(&result))
    }

    pub(crate) fn split_reinit(
        &mut self,
        v: VertexIndex,
        split: SplitKind,
        loop_vertex: VertexIndex,
        visited: &mut HashSet<VertexIndex>,
    ) {
        if split != SplitKind::Loop {
            for next in self.outs(v) {
                self.reinit_from(next, loop_vertex, visited);
            }
            return;
        }

        if v == loop_vertex {
            return;
        }
        // a nested loop only resets its way out, not its own back edge
        for next in self.outs(v) {
            if !self.is_ancestor(v, next) {
                self.reinit_from(next, loop_vertex, visited);
            }
        }
    }
}
