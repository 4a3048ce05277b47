//! State machines every kernel installation ships with

use crate::state_machine::{Reservation, State, StateMachine, Transition};

pub const DEFAULT: &str = "Default";
pub const COMPOSITE_ACTIVITY: &str = "CompositeActivity";
pub const PREDEFINED_STEP: &str = "PredefinedStep";

/// Transition ids of the `Default` machine
pub mod default_trans {
    use crate::TransitionId;

    pub const START: TransitionId = 0;
    pub const COMPLETE: TransitionId = 1;
    pub const SUSPEND: TransitionId = 2;
    pub const RESUME: TransitionId = 3;
    pub const SKIP: TransitionId = 4;
}

/// Transition ids of the `CompositeActivity` machine
pub mod composite_trans {
    use crate::TransitionId;

    pub const START: TransitionId = 0;
    pub const COMPLETE: TransitionId = 1;
}

/// Transition id of the single `Done` transition of `PredefinedStep`
pub const PREDEFINED_DONE: crate::TransitionId = 0;

/// Machine of plain activities: Waiting, Started, Suspended and Finished.
pub fn default_activity() -> StateMachine {
    StateMachine::new(DEFAULT, 0, 0)
        .with_state(State::new(0, "Waiting"))
        .with_state(State::new(1, "Started"))
        .with_state(State::new(2, "Suspended"))
        .with_state(State::new(3, "Finished").finishing())
        .with_transition(Transition::new(default_trans::START, "Start", 0, 1).with_reservation(Reservation::Set))
        .with_transition(
            Transition::new(default_trans::COMPLETE, "Complete", 1, 3)
                .with_outcome("${SchemaType}", "${SchemaVersion}", true)
                .with_reservation(Reservation::Clear),
        )
        .with_transition(Transition::new(default_trans::SUSPEND, "Suspend", 1, 2).with_reservation(Reservation::Keep))
        .with_transition(Transition::new(default_trans::RESUME, "Resume", 2, 1).with_reservation(Reservation::Keep))
        .with_transition(
            Transition::new(default_trans::SKIP, "Skip", 0, 3)
                .with_enabled_prop("Skippable")
                .with_reservation(Reservation::Clear),
        )
}

/// Machine driven by the kernel itself when a composite starts and ends.
pub fn composite_activity() -> StateMachine {
    StateMachine::new(COMPOSITE_ACTIVITY, 0, 0)
        .with_state(State::new(0, "Waiting"))
        .with_state(State::new(1, "Started"))
        .with_state(State::new(2, "Finished").finishing())
        .with_transition(Transition::new(composite_trans::START, "Start", 0, 1).with_reservation(Reservation::Clear))
        .with_transition(Transition::new(composite_trans::COMPLETE, "Complete", 1, 2).with_reservation(Reservation::Clear))
}

/// Machine of predefined steps, which stay available forever.
pub fn predefined_step() -> StateMachine {
    StateMachine::new(PREDEFINED_STEP, 0, 0)
        .with_state(State::new(0, "Available"))
        .with_transition(
            Transition::new(PREDEFINED_DONE, "Done", 0, 0)
                .with_outcome("${SchemaType}", "${SchemaVersion}", false)
                .with_reservation(Reservation::Clear)
                .not_requiring_active(),
        )
}

pub fn all() -> Vec<StateMachine> {
    vec![default_activity(), composite_activity(), predefined_step()]
}
