use crate::graph::{ActivityState, ChildGraph, Next, NextIndex, SplitKind, Vertex, VertexIndex, VertexKind, WfGraph};
use crate::registry::StepRegistry;
use lifecore::{BuiltInProperty, ItemId, KernelError, Properties, PropertyValue, Result};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

pub const ROOT: &str = "workflow";
pub const DOMAIN: &str = "domain";
pub const PREDEFINED: &str = "predefined";

/// The lifecycle of one item: a root composite holding the business process
/// (`domain`) and the maintenance steps (`predefined`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub(crate) item: ItemId,
    pub(crate) graph: WfGraph,
    pub(crate) root: VertexIndex,
}

impl Workflow {
    pub fn new(item: ItemId) -> Self {
        let mut graph = WfGraph::new();
        let root = graph.add_node(Vertex::new(
            0,
            ROOT,
            None,
            VertexKind::Composite {
                activity: ActivityState::new(),
                graph: ChildGraph::default(),
            },
        ));

        let mut wf = Self { item, graph, root };
        let domain = wf.add_child(
            root,
            DOMAIN,
            VertexKind::Composite {
                activity: ActivityState::new(),
                graph: ChildGraph::default(),
            },
            true,
        );
        let predefined = wf.add_child(
            root,
            PREDEFINED,
            VertexKind::Composite {
                activity: ActivityState::predefined(None),
                graph: ChildGraph::default(),
            },
            false,
        );
        if domain.is_err() || predefined.is_err() {
            tracing::error!("could not lay out the root of the workflow of {}", item);
        }
        wf
    }

    /// Adds one always-available step per logic registered in `steps`.
    pub fn with_predefined(mut self, steps: &StepRegistry) -> Self {
        let container = self.predefined();
        for step_type in steps.list_step_types() {
            let kind = VertexKind::Activity(ActivityState::predefined(Some(step_type.clone())));
            match self.add_child(container, &step_type, kind, false) {
                Ok(v) => {
                    let props = &mut self.graph[v].properties;
                    props.set_builtin(BuiltInProperty::StateMachineName, lifecore::machines::PREDEFINED_STEP);
                    props.set_builtin(BuiltInProperty::StateMachineVersion, 0i64);
                    props.set_builtin(
                        BuiltInProperty::SchemaType,
                        lifecore::memory::PREDEFINED_OUTCOME_SCHEMA,
                    );
                    props.set_builtin(BuiltInProperty::SchemaVersion, 0i64);
                    if let Some(description) = steps.description(&step_type) {
                        props.set_builtin(BuiltInProperty::Description, description);
                    }
                }
                Err(e) => tracing::warn!("skipping predefined step {}: {}", step_type, e),
            }
        }
        self
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub(crate) fn set_item(&mut self, item: ItemId) {
        self.item = item;
    }

    pub fn root(&self) -> VertexIndex {
        self.root
    }

    fn child_named(&self, parent: VertexIndex, name: &str) -> Option<VertexIndex> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.graph[*c].name == name)
    }

    pub fn domain(&self) -> VertexIndex {
        self.child_named(self.root, DOMAIN).unwrap_or(self.root)
    }

    pub fn predefined(&self) -> VertexIndex {
        self.child_named(self.root, PREDEFINED).unwrap_or(self.root)
    }

    pub fn vertex(&self, v: VertexIndex) -> Option<&Vertex> {
        self.graph.node_weight(v)
    }

    pub(crate) fn vertex_or_err(&self, v: VertexIndex) -> Result<&Vertex> {
        self.graph
            .node_weight(v)
            .ok_or_else(|| KernelError::not_found(format!("Vertex {}", v.index())))
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn properties(&self, v: VertexIndex) -> Option<&Properties> {
        self.vertex(v).map(|vertex| &vertex.properties)
    }

    pub fn set_property(&mut self, v: VertexIndex, key: &str, value: impl Into<PropertyValue>) -> Result<()> {
        let vertex = self
            .graph
            .node_weight_mut(v)
            .ok_or_else(|| KernelError::not_found(format!("Vertex {}", v.index())))?;
        vertex.properties.insert(key, value);
        Ok(())
    }

    pub fn set_builtin(&mut self, v: VertexIndex, prop: BuiltInProperty, value: impl Into<PropertyValue>) -> Result<()> {
        self.set_property(v, prop.key(), value)
    }

    /// Binds an activity to the step logic registered under `step_type`.
    pub fn set_logic(&mut self, v: VertexIndex, step_type: &str) -> Result<()> {
        let act = self
            .graph
            .node_weight_mut(v)
            .and_then(Vertex::activity_mut)
            .ok_or_else(|| KernelError::invalid(format!("Vertex {} is not an activity", v.index())))?;
        act.logic = Some(step_type.to_string());
        Ok(())
    }

    pub fn set_type_ref(&mut self, v: VertexIndex, type_ref: &str) -> Result<()> {
        let act = self
            .graph
            .node_weight_mut(v)
            .and_then(Vertex::activity_mut)
            .ok_or_else(|| KernelError::invalid(format!("Vertex {} is not an activity", v.index())))?;
        act.type_ref = Some(type_ref.to_string());
        Ok(())
    }

    pub fn children(&self, v: VertexIndex) -> &[VertexIndex] {
        self.graph
            .node_weight(v)
            .and_then(Vertex::child_graph)
            .map(|g| g.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn start_vertex(&self, v: VertexIndex) -> Option<VertexIndex> {
        self.graph.node_weight(v).and_then(Vertex::child_graph).and_then(|g| g.start)
    }

    pub fn parent(&self, v: VertexIndex) -> Option<VertexIndex> {
        self.graph.node_weight(v).and_then(|vertex| vertex.parent)
    }

    fn add_child(&mut self, parent: VertexIndex, name: &str, kind: VertexKind, first: bool) -> Result<VertexIndex> {
        let id = {
            let graph = self
                .graph
                .node_weight_mut(parent)
                .and_then(Vertex::child_graph_mut)
                .ok_or_else(|| KernelError::invalid(format!("Vertex {} cannot hold children", parent.index())))?;
            graph.next_id += 1;
            graph.next_id
        };

        let v = self.graph.add_node(Vertex::new(id, name, Some(parent), kind));

        if let Some(graph) = self.graph[parent].child_graph_mut() {
            graph.children.push(v);
            if first {
                graph.start = Some(v);
            }
        }
        tracing::trace!("added {} as child {} of {}", name, id, self.graph[parent].name);
        Ok(v)
    }

    pub fn add_activity(&mut self, parent: VertexIndex, name: &str, first: bool) -> Result<VertexIndex> {
        self.add_child(parent, name, VertexKind::Activity(ActivityState::new()), first)
    }

    pub fn add_composite(&mut self, parent: VertexIndex, name: &str, first: bool) -> Result<VertexIndex> {
        let kind = VertexKind::Composite {
            activity: ActivityState::new(),
            graph: ChildGraph::default(),
        };
        self.add_child(parent, name, kind, first)
    }

    pub fn add_split(&mut self, parent: VertexIndex, name: &str, split: SplitKind, first: bool) -> Result<VertexIndex> {
        self.add_child(parent, name, VertexKind::Split { split }, first)
    }

    pub fn add_join(&mut self, parent: VertexIndex, name: &str, first: bool) -> Result<VertexIndex> {
        self.add_child(parent, name, VertexKind::Join { route: false }, first)
    }

    pub fn add_route(&mut self, parent: VertexIndex, name: &str, first: bool) -> Result<VertexIndex> {
        self.add_child(parent, name, VertexKind::Join { route: true }, first)
    }

    /// Marks `child` as the vertex its composite starts with.
    pub fn set_start(&mut self, child: VertexIndex) -> Result<()> {
        let parent = self
            .parent(child)
            .ok_or_else(|| KernelError::invalid("the root cannot be a start vertex"))?;
        if let Some(graph) = self.graph[parent].child_graph_mut() {
            graph.start = Some(child);
        }
        Ok(())
    }

    /// Connects two siblings. Edges leaving a split get the next free alias.
    pub fn add_next(&mut self, origin: VertexIndex, terminus: VertexIndex) -> Result<NextIndex> {
        self.vertex_or_err(origin)?;
        self.vertex_or_err(terminus)?;
        if self.parent(origin).is_none() || self.parent(origin) != self.parent(terminus) {
            return Err(KernelError::invalid(format!(
                "{} and {} are not in the same graph",
                self.path(origin),
                self.path(terminus)
            )));
        }

        let edge = self.graph.add_edge(origin, terminus, Next::new());

        if self.graph[origin].split_kind().is_some() {
            let num = self.graph[origin]
                .properties
                .builtin(BuiltInProperty::LastNum)
                .and_then(PropertyValue::as_i64)
                .unwrap_or(self.outs(origin).len() as i64);
            self.graph[edge].alias = num.to_string();
            self.graph[origin]
                .properties
                .set_builtin(BuiltInProperty::LastNum, (num + 1).to_string());
        }
        Ok(edge)
    }

    pub fn set_alias(&mut self, edge: NextIndex, alias: &str) -> Result<()> {
        let next = self
            .graph
            .edge_weight_mut(edge)
            .ok_or_else(|| KernelError::not_found(format!("Next {}", edge.index())))?;
        next.alias = alias.to_string();
        Ok(())
    }

    pub fn next(&self, edge: NextIndex) -> Option<&Next> {
        self.graph.edge_weight(edge)
    }

    /// Outgoing edges of `v` in the order they were added.
    pub(crate) fn out_edges(&self, v: VertexIndex) -> Vec<(NextIndex, VertexIndex)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(v, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(e, _)| e.index());
        edges
    }

    pub fn outs(&self, v: VertexIndex) -> Vec<VertexIndex> {
        self.out_edges(v).into_iter().map(|(_, t)| t).collect()
    }

    pub fn ins(&self, v: VertexIndex) -> Vec<VertexIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(v, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        edges.sort_by_key(|(e, _)| e.index());
        edges.into_iter().map(|(_, s)| s).collect()
    }

    /// Slash separated names from the root, e.g. `workflow/domain/Review`.
    pub fn path(&self, v: VertexIndex) -> String {
        let mut names = Vec::new();
        let mut current = Some(v);
        while let Some(c) = current {
            match self.graph.node_weight(c) {
                Some(vertex) => {
                    names.push(vertex.name.as_str());
                    current = vertex.parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join("/")
    }

    /// Finds a vertex by absolute path, by path relative to the root, or with
    /// local ids in place of names.
    pub fn search(&self, path: &str) -> Option<VertexIndex> {
        let path = path.trim_matches('/');
        if path.is_empty() || path == ROOT {
            return Some(self.root);
        }
        let relative = path.strip_prefix(&format!("{}/", ROOT)).unwrap_or(path);

        let mut current = self.root;
        for segment in relative.split('/') {
            current = self.children(current).iter().copied().find(|c| {
                let vertex = &self.graph[*c];
                vertex.name == segment || vertex.id.to_string() == segment
            })?;
        }
        Some(current)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let workflow: Self = serde_json::from_str(json)?;
        workflow.check_references()?;
        Ok(workflow)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let workflow: Self = serde_json::from_value(value)?;
        workflow.check_references()?;
        Ok(workflow)
    }

    /// Rejects stored vertex references that fall outside the graph. Edge
    /// endpoints are checked by petgraph itself.
    fn check_references(&self) -> Result<()> {
        let count = self.graph.node_count();
        if self.root.index() >= count {
            return Err(KernelError::invalid(format!(
                "Lifecycle root {} is not among its {} vertices",
                self.root.index(),
                count
            )));
        }

        for vertex in self.graph.node_weights() {
            let mut refs: Vec<VertexIndex> = vertex.parent.into_iter().collect();
            if let VertexKind::Composite { graph, .. } = &vertex.kind {
                refs.extend(graph.children.iter().copied());
                refs.extend(graph.start);
            }
            if let Some(dangling) = refs.into_iter().find(|r| r.index() >= count) {
                return Err(KernelError::invalid(format!(
                    "Vertex {} refers to missing vertex {}",
                    vertex.name,
                    dangling.index()
                )));
            }
        }
        Ok(())
    }
}
