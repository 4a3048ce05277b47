use crate::graph::VertexIndex;
use crate::workflow::Workflow;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traverse {
    /// Follow incoming edges
    Up,
    /// Follow outgoing edges
    Down,
}

impl Workflow {
    fn neighbours(&self, v: VertexIndex, direction: Traverse) -> Vec<VertexIndex> {
        match direction {
            Traverse::Up => self.ins(v),
            Traverse::Down => self.outs(v),
        }
    }

    /// Depth-first walk from `start` within its graph, `start` included.
    ///
    /// With `ignore_back_links`, a join walking up or a loop walking down does
    /// not follow a neighbour that leads back to itself.
    pub fn traversal(&self, start: VertexIndex, direction: Traverse, ignore_back_links: bool) -> Vec<VertexIndex> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.visit(start, direction, ignore_back_links, &mut visited, &mut path);
        path
    }

    fn visit(
        &self,
        v: VertexIndex,
        direction: Traverse,
        ignore_back_links: bool,
        visited: &mut HashSet<VertexIndex>,
        path: &mut Vec<VertexIndex>,
    ) {
        visited.insert(v);
        path.push(v);

        let vertex = &self.graph[v];
        let guards_back_links = ignore_back_links
            && ((vertex.is_join() && direction == Traverse::Up) || (vertex.is_loop() && direction == Traverse::Down));

        for next in self.neighbours(v, direction) {
            if visited.contains(&next) {
                continue;
            }
            if guards_back_links && self.traversal(next, direction, false).contains(&v) {
                continue;
            }
            self.visit(next, direction, ignore_back_links, visited, path);
        }
    }

    /// Whether `v` can be reached walking up from `from`.
    pub(crate) fn is_ancestor(&self, from: VertexIndex, v: VertexIndex) -> bool {
        self.traversal(from, Traverse::Up, false).contains(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SplitKind;
    use lifecore::ItemId;

    #[test]
    fn join_ignores_its_loop_back_edge_when_walking_up() {
        let mut wf = Workflow::new(ItemId::new());
        let d = wf.domain();
        let a = wf.add_activity(d, "A", true).unwrap();
        let join = wf.add_join(d, "J", false).unwrap();
        let body = wf.add_activity(d, "Body", false).unwrap();
        let lp = wf.add_split(d, "Loop", SplitKind::Loop, false).unwrap();
        let end = wf.add_activity(d, "End", false).unwrap();
        wf.add_next(a, join).unwrap();
        wf.add_next(join, body).unwrap();
        wf.add_next(body, lp).unwrap();
        wf.add_next(lp, join).unwrap();
        wf.add_next(lp, end).unwrap();

        let all = wf.traversal(join, Traverse::Up, false);
        assert!(all.contains(&body) && all.contains(&lp) && all.contains(&a));

        let guarded = wf.traversal(join, Traverse::Up, true);
        assert_eq!(guarded, vec![join, a]);

        assert!(wf.is_ancestor(lp, join));
        assert!(!wf.is_ancestor(lp, end));
    }
}
