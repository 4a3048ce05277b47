use crate::graph::VertexIndex;
use crate::history::History;
use crate::jobs;
use crate::kernel::{Kernel, StepContext};
use crate::registry::LogicContext;
use crate::workflow::{Workflow, DOMAIN};
use chrono::Utc;
use lifecore::machines::{COMPOSITE_ACTIVITY, DEFAULT, PREDEFINED_STEP};
use lifecore::{
    ActivitySnapshot, BuiltInProperty, ClusterObject, Event, KernelError, Outcome, Result, SchemaRef, StateId,
    StateMachine, TransitionId, Viewpoint, LAST_VIEW,
};
use std::collections::BTreeSet;
use std::sync::Arc;

impl Workflow {
    /// State machine bound to an activity through its `StateMachineName` and
    /// `StateMachineVersion` properties.
    pub fn state_machine(&self, v: VertexIndex, kernel: &Kernel) -> Result<Arc<StateMachine>> {
        let vertex = self.vertex_or_err(v)?;
        if !vertex.is_activity() {
            return Err(KernelError::invalid(format!("{} is not an activity", self.path(v))));
        }

        let default_name = if vertex.is_composite() {
            COMPOSITE_ACTIVITY
        } else if vertex.is_predefined() {
            PREDEFINED_STEP
        } else {
            DEFAULT
        };
        let name = vertex
            .properties
            .builtin_string(BuiltInProperty::StateMachineName)
            .unwrap_or_else(|| default_name.to_string());
        let version = match vertex.properties.builtin(BuiltInProperty::StateMachineVersion) {
            Some(value) if !value.is_blank() => value
                .as_i64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| KernelError::invalid(format!("Bad StateMachineVersion '{}' on {}", value, self.path(v))))?,
            _ => 0,
        };

        kernel.descriptions().state_machine(&name, version).map_err(|e| {
            KernelError::invalid(format!(
                "Could not load StateMachine '{}' v{} of {}: {}",
                name,
                version,
                self.path(v),
                e
            ))
        })
    }

    pub(crate) fn current_state(&self, v: VertexIndex, sm: &StateMachine) -> StateId {
        self.graph[v]
            .activity()
            .and_then(|act| act.state)
            .unwrap_or_else(|| sm.initial_state())
    }

    /// Current state code of an activity.
    pub fn state(&self, v: VertexIndex, kernel: &Kernel) -> Result<StateId> {
        let sm = self.state_machine(v, kernel)?;
        Ok(self.current_state(v, &sm))
    }

    pub fn state_name(&self, v: VertexIndex, kernel: &Kernel) -> Result<String> {
        let sm = self.state_machine(v, kernel)?;
        Ok(sm.state(self.current_state(v, &sm))?.name.clone())
    }

    pub fn is_finished(&self, v: VertexIndex, kernel: &Kernel) -> Result<bool> {
        let sm = self.state_machine(v, kernel)?;
        sm.is_finished(self.current_state(v, &sm))
    }

    pub fn is_active(&self, v: VertexIndex) -> bool {
        self.vertex(v).map(|vertex| vertex.is_active()).unwrap_or(false)
    }

    pub(crate) fn set_active(&mut self, v: VertexIndex, active: bool) {
        if let Some(act) = self.graph[v].activity_mut() {
            act.active = active;
        }
    }

    fn stamp(&mut self, v: VertexIndex) {
        if let Some(act) = self.graph[v].activity_mut() {
            act.state_date = Utc::now();
        }
    }

    /// Owned copy of an activity as seen by its state machine.
    pub fn snapshot(&self, v: VertexIndex, sm: &StateMachine) -> Result<ActivitySnapshot> {
        let vertex = self.vertex_or_err(v)?;
        if !vertex.is_activity() {
            return Err(KernelError::invalid(format!("{} is not an activity", self.path(v))));
        }
        Ok(ActivitySnapshot {
            name: vertex.name.clone(),
            path: self.path(v),
            step_type: Some(vertex.type_name()),
            state: self.current_state(v, sm),
            active: vertex.is_active(),
            properties: vertex.properties.clone(),
        })
    }

    pub(crate) fn activity_run(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        tracing::trace!("run {}", self.path(v));
        self.set_active(v, true);

        if self.is_finished(v, ctx.kernel)? {
            self.run_next(v, ctx)
        } else {
            self.stamp(v);
            self.push_jobs(v, ctx.kernel);
            Ok(())
        }
    }

    pub(crate) fn activity_run_next(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        self.set_active(v, false);

        let result = self.follow_or_bubble(v, ctx);
        if let Err(KernelError::InvalidData(_)) = &result {
            self.set_active(v, true);
        }
        result
    }

    fn follow_or_bubble(&mut self, v: VertexIndex, ctx: &StepContext<'_>) -> Result<()> {
        let outs = self.outs(v);

        // a chain of joins ending nowhere is a dead end as well
        let mut ahead = outs.clone();
        let dead_end = loop {
            match ahead.first() {
                None => break true,
                Some(next) if self.graph[*next].is_join() => ahead = self.outs(*next),
                Some(_) => break false,
            }
        };

        if !dead_end {
            return self.run(outs[0], ctx);
        }

        match self.parent(v) {
            Some(parent) if self.graph[parent].name == DOMAIN && self.parent(parent) == Some(self.root) => {
                tracing::debug!("{} reached the end of the domain", self.path(v));
                self.set_active(v, true);
                Ok(())
            }
            Some(parent) => self.run_next(parent, ctx),
            None => Ok(()),
        }
    }

    /// Resets an activity to the initial state of its machine and carries on
    /// downstream.
    pub(crate) fn activity_reinit(
        &mut self,
        v: VertexIndex,
        loop_vertex: VertexIndex,
        visited: &mut std::collections::HashSet<VertexIndex>,
    ) {
        if let Some(act) = self.graph[v].activity_mut() {
            act.state = None;
        }
        if let Some(next) = self.outs(v).first().copied() {
            self.reinit_from(next, loop_vertex, visited);
        }
    }

    /// Performs `transition` on the activity `v` and returns the outcome data.
    pub(crate) fn activity_request(
        &mut self,
        v: VertexIndex,
        ctx: &StepContext<'_>,
        transition_id: TransitionId,
        payload: &str,
    ) -> Result<String> {
        let kernel = ctx.kernel;
        let sm = self.state_machine(v, kernel)?;
        let act = self.snapshot(v, &sm)?;
        let old_state = sm.state(act.state)?.clone();

        let transition = sm
            .transition(transition_id)
            .filter(|t| t.origin == old_state.id)
            .ok_or_else(|| {
                KernelError::transition(format!(
                    "Transition {} is not possible from state '{}' of {}",
                    transition_id, old_state.name, act.path
                ))
            })?;

        let role = transition.performing_role(&act, ctx.agent, kernel.lookup())?;

        let mut schema = None;
        let mut view_name = None;
        let mut store_outcome = false;
        if let Some((name, version)) = transition.outcome_schema(&act.properties)? {
            let found = kernel.descriptions().schema(&name, version)?;
            schema = Some(SchemaRef::new(found.name, found.version));
            view_name = act.properties.builtin_string(BuiltInProperty::Viewpoint);

            if !payload.is_empty() {
                store_outcome = true;
            } else if transition.outcome_required() {
                return Err(KernelError::invalid(format!(
                    "Transition {} of {} requires outcome data, but none was given",
                    transition, act.path
                )));
            }
        }

        let new_state = sm.traverse(&act, transition, ctx.agent, kernel.lookup())?.clone();

        let storage = kernel.storage();
        let outcome = match self.run_logic(v, ctx, &act, transition_id, payload) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(item = %self.item, step = %act.path, "step logic failed: {}", e);
                storage.abort(ctx.txn);
                return Err(e);
            }
        };

        let event = Event {
            id: 0,
            item: self.item,
            agent: ctx.agent.clone(),
            agent_role: role,
            step_name: act.name.clone(),
            step_path: act.path.clone(),
            step_type: act.step_type.clone(),
            state_machine: sm.name.clone(),
            state_machine_version: sm.version,
            transition: transition_id,
            origin_state: old_state.id,
            target_state: new_state.id,
            schema: schema.clone().filter(|_| store_outcome),
            view_name: view_name.clone().filter(|_| store_outcome),
            timestamp: Utc::now(),
        };
        let stored = schema.as_ref().filter(|_| store_outcome);
        let recorded = self.record(ctx, event, stored, &outcome, view_name.as_deref());

        let event = match recorded {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(item = %self.item, step = %act.path, "could not record {}: {}", transition, e);
                storage.abort(ctx.txn);
                return Err(e);
            }
        };

        tracing::info!(
            item = %self.item,
            step = %act.path,
            agent = %ctx.agent,
            "{} -> {} by {}",
            old_state.name,
            new_state.name,
            transition
        );

        let reservation = transition.reservation_for(&act, ctx.agent, new_state.finished);
        if let Some(state) = self.graph[v].activity_mut() {
            state.state = Some(new_state.id);
            state.state_date = Utc::now();
        }
        self.graph[v]
            .properties
            .set_builtin(BuiltInProperty::AgentName, reservation);

        kernel
            .events()
            .transition_performed(self.item, act.path.clone(), transition_id, event.id, ctx.agent.clone());

        let breakpoint = act.properties.flag(BuiltInProperty::Breakpoint);
        if new_state.finished && !(breakpoint && !old_state.finished) {
            self.run_next(v, ctx)?;
        } else if new_state.finished {
            tracing::info!(item = %self.item, step = %act.path, "stopped at breakpoint");
        }

        self.push_jobs(v, kernel);
        Ok(outcome)
    }

    /// Writes the audit event of a transition, with its outcome and viewpoints
    /// when one is stored, and commits them.
    fn record(
        &self,
        ctx: &StepContext<'_>,
        event: Event,
        schema: Option<&SchemaRef>,
        outcome: &str,
        view_name: Option<&str>,
    ) -> Result<Event> {
        let storage = ctx.kernel.storage();
        let event = History::new(storage, self.item, ctx.txn).add_event(event)?;

        if let Some(schema) = schema {
            storage.put(
                self.item,
                &ClusterObject::Outcome(Outcome {
                    event_id: event.id,
                    schema: schema.clone(),
                    data: outcome.to_string(),
                }),
                ctx.txn,
            )?;

            let mut views = vec![LAST_VIEW];
            if let Some(view) = view_name.filter(|view| *view != LAST_VIEW) {
                views.insert(0, view);
            }
            for view in views {
                storage.put(
                    self.item,
                    &ClusterObject::Viewpoint(Viewpoint {
                        item: self.item,
                        schema: schema.clone(),
                        name: view.to_string(),
                        event_id: event.id,
                    }),
                    ctx.txn,
                )?;
            }
        }

        storage.commit(ctx.txn)?;
        Ok(event)
    }

    fn run_logic(
        &self,
        v: VertexIndex,
        ctx: &StepContext<'_>,
        act: &ActivitySnapshot,
        transition: TransitionId,
        payload: &str,
    ) -> Result<String> {
        let Some(step_type) = self.graph[v].activity().and_then(|a| a.logic.clone()) else {
            return Ok(payload.to_string());
        };
        let logic = ctx
            .kernel
            .steps()
            .get(&step_type)
            .ok_or_else(|| KernelError::not_found(format!("Step logic '{}' is not registered", step_type)))?;

        let logic_ctx = LogicContext {
            storage: ctx.kernel.storage(),
            lookup: ctx.kernel.lookup(),
            descriptions: ctx.kernel.descriptions(),
            item: self.item,
            agent: ctx.agent,
            step: act,
            transition,
            txn: ctx.txn,
        };
        tracing::debug!(item = %self.item, step = %act.path, "running step logic {}", step_type);
        logic.run(&logic_ctx, payload)
    }

    /// Jobs `agent` could perform on the activity `v` alone.
    pub(crate) fn jobs_base(
        &self,
        v: VertexIndex,
        kernel: &Kernel,
        agent: &lifecore::AgentId,
        include_inactive: bool,
    ) -> Result<Vec<lifecore::Job>> {
        let vertex = self.vertex_or_err(v)?;
        if !include_inactive && !vertex.is_active() {
            return Ok(Vec::new());
        }
        let sm = self.state_machine(v, kernel)?;
        let snapshot = self.snapshot(v, &sm)?;
        jobs::base_jobs(self.item, &snapshot, &sm, agent, kernel.lookup(), include_inactive)
    }

    /// Queues a job list refresh for every role that may act on `v` next.
    pub(crate) fn push_jobs(&self, v: VertexIndex, kernel: &Kernel) {
        let Some(pusher) = kernel.pusher() else {
            return;
        };

        let sm = match self.state_machine(v, kernel) {
            Ok(sm) => sm,
            Err(e) => {
                tracing::warn!("not pushing jobs of {}: {}", self.path(v), e);
                return;
            }
        };
        let snapshot = match self.snapshot(v, &sm) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("not pushing jobs of {}: {}", self.path(v), e);
                return;
            }
        };

        let mut roles: BTreeSet<String> = snapshot.roles().into_iter().collect();
        for trans in sm.transitions_from(snapshot.state) {
            if let Some(role) = trans.role_override(&snapshot.properties) {
                roles.insert(role);
            }
        }
        tracing::trace!("pushing jobs of {} to {} roles", snapshot.path, roles.len());

        for name in roles {
            match kernel.lookup().role(&name) {
                Ok(role) if role.has_job_list => pusher.push(self.item, snapshot.clone(), sm.clone(), role),
                Ok(_) => tracing::trace!("role {} keeps no job list", name),
                Err(e) => tracing::warn!("activity role '{}' of {} not found: {}", name, snapshot.path, e),
            }
        }
    }
}
