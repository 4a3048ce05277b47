use crate::{ActivitySnapshot, AgentId, BuiltInProperty, KernelError, Lookup, Properties, Result, RolePath};
use serde::{Deserialize, Serialize};

pub type StateId = u32;
pub type TransitionId = u32;

/// Role granting every transition when no other candidate role matches
pub const ADMIN_ROLE: &str = "Admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub name: String,
    /// Entering this state deactivates the activity and the workflow proceeds
    #[serde(default)]
    pub finished: bool,
}

impl State {
    pub fn new(id: StateId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            finished: false,
        }
    }

    pub fn finishing(mut self) -> Self {
        self.finished = true;
        self
    }
}

/// How a transition changes the reservation of the activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reservation {
    /// Reserve the activity for the performing agent
    Set,
    /// Release any reservation
    Clear,
    /// Leave the reservation unchanged
    Keep,
}

/// Outcome declared by a transition. Name and version are `${Prop}` templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub schema_name: String,
    pub schema_version: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub name: String,
    pub origin: StateId,
    pub target: StateId,
    /// Defaults to `Clear` when the target finishes, `Set` otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
    /// Boolean activity property enabling this transition (e.g. "Skippable")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_prop: Option<String>,
    #[serde(default = "default_true")]
    pub requires_active: bool,
    /// Role replacing the activity's own roles, may contain `${Prop}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TransitionOutcome>,
    #[serde(default)]
    pub error_handler: bool,
}

impl Transition {
    pub fn new(id: TransitionId, name: impl Into<String>, origin: StateId, target: StateId) -> Self {
        Self {
            id,
            name: name.into(),
            origin,
            target,
            reservation: None,
            enabled_prop: None,
            requires_active: true,
            role_override: None,
            outcome: None,
            error_handler: false,
        }
    }

    pub fn with_reservation(mut self, reservation: Reservation) -> Self {
        self.reservation = Some(reservation);
        self
    }

    pub fn with_enabled_prop(mut self, prop: impl Into<String>) -> Self {
        self.enabled_prop = Some(prop.into());
        self
    }

    pub fn with_role_override(mut self, role: impl Into<String>) -> Self {
        self.role_override = Some(role.into());
        self
    }

    pub fn with_outcome(mut self, schema_name: impl Into<String>, schema_version: impl Into<String>, required: bool) -> Self {
        self.outcome = Some(TransitionOutcome {
            schema_name: schema_name.into(),
            schema_version: schema_version.into(),
            required,
        });
        self
    }

    pub fn not_requiring_active(mut self) -> Self {
        self.requires_active = false;
        self
    }

    pub fn role_override(&self, props: &Properties) -> Option<String> {
        self.role_override
            .as_deref()
            .and_then(|r| props.resolve(r))
            .filter(|r| !r.trim().is_empty())
    }

    /// Transitions without an enabling property are always enabled; with one,
    /// the property must be present and true.
    pub fn is_enabled(&self, props: &Properties) -> bool {
        match self.enabled_prop.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(prop) => props.get(prop).and_then(|v| v.as_bool()).unwrap_or(false),
        }
    }

    pub fn has_outcome(&self, props: &Properties) -> bool {
        let Some(outcome) = &self.outcome else {
            return false;
        };
        let resolved = |t: &str| props.resolve(t).filter(|s| !s.is_empty());
        resolved(&outcome.schema_name).is_some() && resolved(&outcome.schema_version).is_some()
    }

    /// Schema name and version of the outcome, if the activity declares one.
    pub fn outcome_schema(&self, props: &Properties) -> Result<Option<(String, u32)>> {
        if !self.has_outcome(props) {
            return Ok(None);
        }
        let Some(outcome) = &self.outcome else {
            return Ok(None);
        };
        let name = props.resolve(&outcome.schema_name).unwrap_or_default();
        let version_str = props.resolve(&outcome.schema_version).unwrap_or_default();
        let version = version_str.trim().parse::<u32>().map_err(|_| {
            KernelError::invalid(format!(
                "Bad schema version number: {} ({})",
                outcome.schema_version, version_str
            ))
        })?;
        Ok(Some((name, version)))
    }

    pub fn outcome_required(&self) -> bool {
        self.outcome.as_ref().map(|o| o.required).unwrap_or(false)
    }

    /// Role under which `agent` may perform this transition on the activity.
    ///
    /// `Ok(None)` means the activity demands no role at all.
    pub fn performing_role(
        &self,
        act: &ActivitySnapshot,
        agent: &AgentId,
        lookup: &dyn Lookup,
    ) -> Result<Option<String>> {
        if !self.is_enabled(&act.properties) {
            return Err(KernelError::access(format!(
                "Trans:{} is disabled by the '{}' property.",
                self,
                self.enabled_prop.as_deref().unwrap_or_default()
            )));
        }

        if self.requires_active && !act.active {
            return Err(KernelError::access(format!(
                "Activity must be active to perform trans:{}",
                self
            )));
        }

        let overriding = self.role_override(&act.properties);
        let reserved_by = act.properties.builtin_string(BuiltInProperty::AgentName);

        let mut roles: Vec<RolePath> = Vec::new();
        match &overriding {
            Some(role) => roles.push(lookup.role(role)?),
            None => {
                if let Some(act_roles) = act.properties.builtin_string(BuiltInProperty::AgentRole) {
                    for role in act_roles.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                        roles.push(lookup.role(role)?);
                    }
                }
            }
        }

        if let Some(owner) = &reserved_by {
            if overriding.is_none() && owner != agent.as_str() {
                return Err(KernelError::access(format!(
                    "Agent '{}' cannot perform trans:{} because the activity '{}' is currently owned by {}",
                    agent, self, act.name, owner
                )));
            }
        }

        if roles.is_empty() {
            return Ok(None);
        }

        if let Some(matching) = lookup.first_matching_role(agent, &roles) {
            return Ok(Some(matching.name.clone()));
        }

        let is_admin = lookup
            .role(ADMIN_ROLE)
            .map(|admin| lookup.has_role(agent, &admin))
            .unwrap_or(false);
        if is_admin {
            return Ok(Some(ADMIN_ROLE.to_string()));
        }

        Err(KernelError::access(format!(
            "Agent '{}' does not hold a suitable role '{}' for the activity {}",
            agent,
            act.properties
                .builtin_string(BuiltInProperty::AgentRole)
                .unwrap_or_default(),
            act.name
        )))
    }

    /// Agent name to record as the activity's reservation after this transition.
    pub fn reservation_for(&self, act: &ActivitySnapshot, agent: &AgentId, target_finished: bool) -> String {
        let reservation = self.reservation.unwrap_or(if target_finished {
            Reservation::Clear
        } else {
            Reservation::Set
        });

        match reservation {
            Reservation::Set => agent.to_string(),
            Reservation::Clear => String::new(),
            Reservation::Keep => act
                .properties
                .builtin_string(BuiltInProperty::AgentName)
                .unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[id:{}]", self.name, self.id)
    }
}

/// Legal states and transitions of an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachine {
    pub name: String,
    pub version: u32,
    pub initial_state: StateId,
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
}

impl StateMachine {
    pub fn new(name: impl Into<String>, version: u32, initial_state: StateId) -> Self {
        Self {
            name: name.into(),
            version,
            initial_state,
            states: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Checks that the initial state and every transition endpoint exist.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.find_state(self.initial_state).is_none() {
            problems.push(format!("initial state {} is not defined", self.initial_state));
        }
        for trans in &self.transitions {
            if self.find_state(trans.origin).is_none() {
                problems.push(format!("{} has unknown origin state {}", trans, trans.origin));
            }
            if self.find_state(trans.target).is_none() {
                problems.push(format!("{} has unknown target state {}", trans, trans.target));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(KernelError::invalid(format!(
                "StateMachine '{}' v{} is not coherent: {}",
                self.name,
                self.version,
                problems.join("; ")
            )))
        }
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    fn find_state(&self, id: StateId) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn state(&self, id: StateId) -> Result<&State> {
        self.find_state(id).ok_or_else(|| {
            KernelError::invalid(format!(
                "State {} is not defined in StateMachine '{}' v{}",
                id, self.name, self.version
            ))
        })
    }

    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    pub fn transition_by_name(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    pub fn transitions_from(&self, state: StateId) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.origin == state)
    }

    pub fn is_finished(&self, state: StateId) -> Result<bool> {
        Ok(self.state(state)?.finished)
    }

    pub fn error_transition_for_state(&self, state: StateId) -> Option<TransitionId> {
        self.transitions_from(state).find(|t| t.error_handler).map(|t| t.id)
    }

    /// Checks that `transition` may be taken from the activity's current state
    /// by `agent` and returns the state it leads to.
    pub fn traverse(
        &self,
        act: &ActivitySnapshot,
        transition: &Transition,
        agent: &AgentId,
        lookup: &dyn Lookup,
    ) -> Result<&State> {
        let current = self.state(act.state)?;

        if transition.origin != current.id {
            return Err(KernelError::transition(format!(
                "Transition '{}' not valid from state '{}'",
                transition, current.name
            )));
        }

        transition.performing_role(act, agent, lookup)?;
        self.state(transition.target)
    }

    /// Every transition the agent may currently take, paired with the role it
    /// would be performed under. Transitions refused for access reasons are
    /// left out; lookup failures propagate.
    pub fn possible_transitions(
        &self,
        act: &ActivitySnapshot,
        agent: &AgentId,
        lookup: &dyn Lookup,
    ) -> Result<Vec<(&Transition, Option<String>)>> {
        let mut possible = Vec::new();

        for trans in self.transitions_from(act.state) {
            if !trans.is_enabled(&act.properties) {
                tracing::trace!("disabled trans:{} act:{}", trans, act.name);
                continue;
            }
            match trans.performing_role(act, agent, lookup) {
                Ok(role) => possible.push((trans, role)),
                Err(KernelError::AccessRights(reason)) => {
                    tracing::trace!("trans:{} not possible for {}: {}", trans, agent, reason);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(possible)
    }
}
