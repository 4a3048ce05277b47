use chrono::{DateTime, Utc};
use lifecore::{Properties, StateId};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Stable address of a vertex within one workflow
pub type VertexIndex = NodeIndex;

/// Arena holding every vertex and edge of a workflow
pub type WfGraph = DiGraph<Vertex, Next>;

pub type NextIndex = EdgeIndex;

/// Directed connection between two sibling vertices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Next {
    /// Routing key matched against the result of a split's routing
    #[serde(default)]
    pub alias: String,
    /// Rendering hint only
    #[serde(default = "straight")]
    pub edge_type: String,
}

fn straight() -> String {
    "Straight".to_string()
}

impl Next {
    pub fn new() -> Self {
        Self {
            alias: String::new(),
            edge_type: straight(),
        }
    }
}

impl Default for Next {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitKind {
    /// Follow every outgoing edge
    And,
    /// Follow every edge whose alias the routing returns
    Or,
    /// Follow exactly one edge
    XOr,
    /// Exclusive split able to jump back to an ancestor
    Loop,
}

impl SplitKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SplitKind::And => "AndSplit",
            SplitKind::Or => "OrSplit",
            SplitKind::XOr => "XOrSplit",
            SplitKind::Loop => "LoopSplit",
        }
    }
}

/// Execution state carried by activities and composites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityState {
    /// Current state code, `None` until the activity leaves its initial state
    #[serde(default)]
    pub state: Option<StateId>,
    #[serde(default)]
    pub active: bool,
    pub state_date: DateTime<Utc>,
    /// Description item this activity was instantiated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<String>,
    /// Registered step logic run on every transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<String>,
    /// Predefined steps and their container are always active
    #[serde(default)]
    pub predefined: bool,
}

impl ActivityState {
    pub fn new() -> Self {
        Self {
            state: None,
            active: false,
            state_date: Utc::now(),
            type_ref: None,
            logic: None,
            predefined: false,
        }
    }

    pub fn predefined(logic: Option<String>) -> Self {
        Self {
            active: true,
            logic,
            predefined: true,
            ..Self::new()
        }
    }

    pub fn is_active(&self) -> bool {
        self.predefined || self.active
    }
}

impl Default for ActivityState {
    fn default() -> Self {
        Self::new()
    }
}

/// Children of a composite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildGraph {
    pub children: Vec<VertexIndex>,
    #[serde(default)]
    pub start: Option<VertexIndex>,
    /// Next local id to hand out
    #[serde(default)]
    pub next_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VertexKind {
    Activity(ActivityState),
    Composite { activity: ActivityState, graph: ChildGraph },
    Split { split: SplitKind },
    /// `route` joins have a single predecessor and only serve layout
    Join { route: bool },
}

/// Kind of a vertex without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexTag {
    Activity,
    Composite,
    Split(SplitKind),
    Join,
}

/// A node of the step graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Identifier unique among the siblings of this vertex
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub parent: Option<VertexIndex>,
    #[serde(default)]
    pub properties: Properties,
    pub kind: VertexKind,
    #[serde(skip)]
    pub errors: Vec<String>,
}

impl Vertex {
    pub fn new(id: u32, name: impl Into<String>, parent: Option<VertexIndex>, kind: VertexKind) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            properties: Properties::new(),
            kind,
            errors: Vec::new(),
        }
    }

    pub fn tag(&self) -> VertexTag {
        match &self.kind {
            VertexKind::Activity(_) => VertexTag::Activity,
            VertexKind::Composite { .. } => VertexTag::Composite,
            VertexKind::Split { split } => VertexTag::Split(*split),
            VertexKind::Join { .. } => VertexTag::Join,
        }
    }

    pub fn activity(&self) -> Option<&ActivityState> {
        match &self.kind {
            VertexKind::Activity(act) | VertexKind::Composite { activity: act, .. } => Some(act),
            _ => None,
        }
    }

    pub fn activity_mut(&mut self) -> Option<&mut ActivityState> {
        match &mut self.kind {
            VertexKind::Activity(act) | VertexKind::Composite { activity: act, .. } => Some(act),
            _ => None,
        }
    }

    pub fn child_graph(&self) -> Option<&ChildGraph> {
        match &self.kind {
            VertexKind::Composite { graph, .. } => Some(graph),
            _ => None,
        }
    }

    pub fn child_graph_mut(&mut self) -> Option<&mut ChildGraph> {
        match &mut self.kind {
            VertexKind::Composite { graph, .. } => Some(graph),
            _ => None,
        }
    }

    pub fn split_kind(&self) -> Option<SplitKind> {
        match self.kind {
            VertexKind::Split { split } => Some(split),
            _ => None,
        }
    }

    pub fn is_activity(&self) -> bool {
        self.activity().is_some()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, VertexKind::Composite { .. })
    }

    pub fn is_join(&self) -> bool {
        matches!(self.kind, VertexKind::Join { .. })
    }

    pub fn is_loop(&self) -> bool {
        self.split_kind() == Some(SplitKind::Loop)
    }

    pub fn is_predefined(&self) -> bool {
        self.activity().map(|a| a.predefined).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.activity().map(ActivityState::is_active).unwrap_or(false)
    }

    /// Type tag used in job and audit records
    pub fn type_name(&self) -> String {
        match &self.kind {
            VertexKind::Activity(act) => act
                .type_ref
                .clone()
                .or_else(|| act.logic.clone())
                .unwrap_or_else(|| "Activity".to_string()),
            VertexKind::Composite { activity, .. } => activity
                .type_ref
                .clone()
                .unwrap_or_else(|| "CompositeActivity".to_string()),
            VertexKind::Split { split } => split.type_name().to_string(),
            VertexKind::Join { route: true } => "Route".to_string(),
            VertexKind::Join { route: false } => "Join".to_string(),
        }
    }
}
