use anyhow::{anyhow, Context, Result};
use lifecore::memory::{MemoryDescriptions, MemoryLookup};
use lifecore::{ItemProperty, PropertyValue, Schema};
use liferuntime::{SplitKind, VertexIndex, Workflow, DOMAIN};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

/// An item's workflow together with the people working on it and the
/// actions they take, in order.
#[derive(Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "system_agent")]
    pub creator: String,
    #[serde(default)]
    pub roles: Vec<RoleDef>,
    #[serde(default)]
    pub schemas: Vec<Schema>,
    /// Properties of the item, readable by routing
    #[serde(default)]
    pub properties: Vec<ItemProperty>,
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub nexts: Vec<NextDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "yes")]
    pub job_list: bool,
    #[serde(default)]
    pub agents: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,
    /// Path of the enclosing composite, the domain when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub first: bool,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepKind {
    Activity,
    Composite,
    Split { split: SplitKind },
    Join,
    Route,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextDef {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionDef {
    pub agent: String,
    pub step: String,
    /// Transition name in the step's state machine
    pub transition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub outcome: String,
    /// Parameters of a predefined step, sent instead of `outcome`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
}

impl ActionDef {
    pub fn payload(&self) -> Result<String> {
        match &self.params {
            Some(params) => Ok(lifesteps::bundle(params.as_slice())?),
            None => Ok(self.outcome.clone()),
        }
    }
}

fn system_agent() -> String {
    "system".to_string()
}

fn yes() -> bool {
    true
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn lookup(&self) -> MemoryLookup {
        let mut lookup = MemoryLookup::new();
        for role in &self.roles {
            lookup.add_role(&role.name, role.parent.as_deref(), role.job_list);
            for agent in &role.agents {
                lookup.add_agent(agent, &role.name);
            }
        }
        lookup
    }

    pub fn descriptions(&self) -> MemoryDescriptions {
        let mut descriptions = MemoryDescriptions::new();
        for schema in &self.schemas {
            descriptions.add_schema(schema.clone());
        }
        descriptions
    }

    /// Every agent named by a role, once each.
    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.roles.iter().flat_map(|r| r.agents.iter().cloned()).collect();
        agents.sort();
        agents.dedup();
        agents
    }

    /// Lays the steps and nexts out in `wf`, parents before children.
    pub fn build(&self, wf: &mut Workflow) -> Result<()> {
        for step in &self.steps {
            let parent_path = step.parent.as_deref().unwrap_or(DOMAIN);
            let parent = find(wf, parent_path).with_context(|| format!("placing step '{}'", step.name))?;
            let v = match &step.kind {
                StepKind::Activity => wf.add_activity(parent, &step.name, step.first)?,
                StepKind::Composite => wf.add_composite(parent, &step.name, step.first)?,
                StepKind::Split { split } => wf.add_split(parent, &step.name, *split, step.first)?,
                StepKind::Join => wf.add_join(parent, &step.name, step.first)?,
                StepKind::Route => wf.add_route(parent, &step.name, step.first)?,
            };
            for (key, value) in &step.properties {
                wf.set_property(v, key, value.clone())?;
            }
        }

        for next in &self.nexts {
            let from = find(wf, &next.from)?;
            let to = find(wf, &next.to)?;
            let edge = wf.add_next(from, to)?;
            if let Some(alias) = &next.alias {
                wf.set_alias(edge, alias)?;
            }
        }
        Ok(())
    }

    /// Invoice approval: entered by a clerk, approved when large, archived otherwise.
    pub fn example() -> Result<Self> {
        let scenario = serde_json::from_value(json!({
            "name": "Invoice approval",
            "roles": [
                { "name": "Clerk", "agents": ["alice"] },
                { "name": "Approver", "agents": ["carol"] }
            ],
            "schemas": [{ "name": "Invoice", "version": 0 }],
            "properties": [
                { "name": "Size", "value": "large" },
                { "name": "Status", "value": "Open" },
                { "name": "Number", "value": "INV-0042", "mutable": false }
            ],
            "steps": [
                {
                    "name": "Enter", "kind": "activity", "first": true,
                    "properties": { "Agent Role": "Clerk", "SchemaType": "Invoice", "SchemaVersion": 0 }
                },
                {
                    "name": "BySize", "kind": "split", "split": "XOr",
                    "properties": { "RoutingExpr": "property//Size" }
                },
                { "name": "Approve", "kind": "activity", "properties": { "Agent Role": "Approver" } },
                { "name": "Archive", "kind": "activity", "properties": { "Agent Role": "Clerk" } },
                { "name": "Done", "kind": "join" }
            ],
            "nexts": [
                { "from": "domain/Enter", "to": "domain/BySize" },
                { "from": "domain/BySize", "to": "domain/Approve", "alias": "large" },
                { "from": "domain/BySize", "to": "domain/Archive", "alias": "small" },
                { "from": "domain/Approve", "to": "domain/Done" },
                { "from": "domain/Archive", "to": "domain/Done" }
            ],
            "actions": [
                { "agent": "alice", "step": "domain/Enter", "transition": "Start" },
                {
                    "agent": "alice", "step": "domain/Enter", "transition": "Complete",
                    "outcome": "<Invoice number=\"INV-0042\" total=\"1200\"/>"
                },
                { "agent": "alice", "step": "domain/Approve", "transition": "Start" },
                { "agent": "carol", "step": "domain/Approve", "transition": "Start" },
                { "agent": "carol", "step": "domain/Approve", "transition": "Complete" },
                {
                    "agent": "carol", "step": "predefined/WriteProperty", "transition": "Done",
                    "params": ["Status", "Approved"]
                }
            ]
        }))?;
        Ok(scenario)
    }
}

fn find(wf: &Workflow, path: &str) -> Result<VertexIndex> {
    wf.search(path).ok_or_else(|| anyhow!("no vertex at '{}'", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecore::ItemId;

    #[test]
    fn example_lays_out_a_sound_workflow() {
        let scenario = Scenario::example().unwrap();
        let mut wf = Workflow::new(ItemId::new());
        scenario.build(&mut wf).unwrap();

        assert!(wf.verify(), "{:?}", wf.diagnostics());
        assert!(wf.search("domain/BySize").is_some());
        assert_eq!(scenario.agents(), vec!["alice", "carol"]);
    }

    #[test]
    fn predefined_actions_bundle_their_params() {
        let scenario = Scenario::example().unwrap();
        let last = scenario.actions.last().unwrap();
        assert_eq!(last.payload().unwrap(), r#"{"params":["Status","Approved"]}"#);
    }
}
