//! Structural checks run at design time and before instantiation

use crate::graph::{VertexIndex, VertexTag};
use crate::workflow::Workflow;
use serde::Serialize;

/// One structural problem found by `Workflow::verify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

impl Workflow {
    /// Checks the whole graph. Never fails: problems are kept on the
    /// offending vertices and listed by `diagnostics`.
    pub fn verify(&mut self) -> bool {
        let root = self.root;
        self.verify_vertex(root)
    }

    /// Messages left on `v` by the last `verify`.
    pub fn errors(&self, v: VertexIndex) -> &[String] {
        self.vertex(v).map(|vertex| vertex.errors.as_slice()).unwrap_or(&[])
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.vertices()
            .flat_map(|v| {
                let path = self.path(v);
                self.errors(v).iter().map(move |message| Diagnostic {
                    path: path.clone(),
                    message: message.clone(),
                })
            })
            .collect()
    }

    fn verify_vertex(&mut self, v: VertexIndex) -> bool {
        self.graph[v].errors.clear();

        let errors = if self.graph[v].is_predefined() {
            Vec::new()
        } else {
            match self.graph[v].tag() {
                VertexTag::Activity => self.activity_errors(v),
                VertexTag::Composite => {
                    let mut errors = if v == self.root { Vec::new() } else { self.activity_errors(v) };
                    errors.extend(self.composite_errors(v));
                    errors
                }
                VertexTag::Split(_) => self.split_errors(v),
                VertexTag::Join => self.join_errors(v),
            }
        };

        // children are verified even when the composite itself failed
        let mut children_ok = true;
        for child in self.children(v).to_vec() {
            children_ok &= self.verify_vertex(child);
        }

        let vertex = &mut self.graph[v];
        vertex.errors = errors;
        if !children_ok {
            vertex.errors.push("error in children".to_string());
        }
        if !vertex.errors.is_empty() {
            tracing::debug!("{} failed verification: {:?}", vertex.name, vertex.errors);
        }
        vertex.errors.is_empty()
    }

    fn is_start(&self, v: VertexIndex) -> bool {
        self.parent(v).and_then(|p| self.start_vertex(p)) == Some(v)
    }

    fn endpoints_ok(&self, v: VertexIndex) -> bool {
        self.parent(v)
            .map(|p| self.has_good_number_of_activities(p))
            .unwrap_or(true)
    }

    fn activity_errors(&self, v: VertexIndex) -> Vec<String> {
        let ins = self.ins(v).len();
        let outs = self.outs(v).len();
        let mut errors = Vec::new();

        if ins == 0 && !self.is_start(v) {
            errors.push("Unreachable".to_string());
        }
        if ins > 1 {
            errors.push("Bad nb of previous".to_string());
        }
        if outs > 1 {
            errors.push("too many next".to_string());
        }
        if outs == 0 && !self.endpoints_ok(v) {
            errors.push("too many endpoints".to_string());
        }
        errors
    }

    fn composite_errors(&self, v: VertexIndex) -> Vec<String> {
        let Some(start) = self.start_vertex(v) else {
            return Vec::new();
        };
        let has_loop = self.children(v).iter().any(|c| self.graph[*c].is_loop());
        if self.loops(start) && !has_loop {
            vec!["uncontrolled cycle".to_string()]
        } else {
            Vec::new()
        }
    }

    /// Looks at the outgoing edges of `v` that lead back upstream: whether
    /// one of them goes to a loop, and whether one goes to anything else.
    fn back_edges(&self, v: VertexIndex) -> (bool, bool) {
        let mut to_loop = false;
        let mut to_other = false;
        for next in self.outs(v) {
            if self.is_ancestor(v, next) {
                if self.graph[next].is_loop() {
                    to_loop = true;
                } else {
                    to_other = true;
                }
            }
        }
        (to_loop, to_other)
    }

    fn split_errors(&self, v: VertexIndex) -> Vec<String> {
        let ins = self.ins(v).len();
        let outs = self.outs(v);
        let is_loop = self.graph[v].is_loop();
        let mut errors = Vec::new();

        if ins == 0 && !self.is_start(v) {
            errors.push("not enough previous".to_string());
        }
        if ins > 1 {
            errors.push("Bad nb of previous".to_string());
        }
        if outs.len() <= 1 && !is_loop {
            errors.push("not enough next".to_string());
        }

        if is_loop {
            let pointing_back = outs.iter().filter(|next| self.is_ancestor(v, **next)).count();
            let sibling_loops = self
                .parent(v)
                .map(|p| self.children(p).iter().filter(|c| self.graph[**c].is_loop()).count())
                .unwrap_or(0);
            if pointing_back != 1 && sibling_loops <= 1 {
                errors.push("bad number of pointing back nexts".to_string());
            }
        } else {
            let (to_loop, to_other) = self.back_edges(v);
            if to_loop && !to_other {
                errors.push("Problem in Loop".to_string());
            }
        }
        errors
    }

    fn join_errors(&self, v: VertexIndex) -> Vec<String> {
        let ins = self.ins(v).len();
        let outs = self.outs(v).len();
        let route = matches!(self.graph[v].kind, crate::graph::VertexKind::Join { route: true });
        let mut errors = Vec::new();

        if ins < 1 {
            errors.push("not enough previous".to_string());
        }
        if route && ins > 1 {
            errors.push("Bad nb of previous".to_string());
        }
        if outs > 1 {
            errors.push("too many next".to_string());
        }
        if outs == 0 && !self.endpoints_ok(v) {
            errors.push("too many endpoints".to_string());
        }

        let (to_loop, to_other) = self.back_edges(v);
        if to_loop && to_other {
            errors.push("Problem in Loop".to_string());
        }
        errors
    }
}
