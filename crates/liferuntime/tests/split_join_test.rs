mod common;

use common::{agent, Fixture};
use lifecore::{BuiltInProperty, ItemId, KernelError};
use liferuntime::{JobScope, SplitKind, Workflow};

/// domain: A -> split{"1": B, "2": C}, B for reviewers and C for approvers
fn branching(kind: SplitKind, routing: &str) -> Workflow {
    let mut wf = Workflow::new(ItemId::new());
    let d = wf.domain();
    let a = wf.add_activity(d, "A", true).unwrap();
    let s = wf.add_split(d, "S", kind, false).unwrap();
    let b = wf.add_activity(d, "B", false).unwrap();
    let c = wf.add_activity(d, "C", false).unwrap();
    wf.add_next(a, s).unwrap();
    wf.add_next(s, b).unwrap();
    wf.add_next(s, c).unwrap();
    wf.set_builtin(s, BuiltInProperty::RoutingExpr, routing).unwrap();
    wf.set_builtin(b, BuiltInProperty::AgentRole, "Reviewer").unwrap();
    wf.set_builtin(c, BuiltInProperty::AgentRole, "Approver").unwrap();
    wf
}

#[test]
fn exclusive_split_activates_the_routed_branch_only() {
    let fx = Fixture::new();
    let item = fx.create(branching(SplitKind::XOr, "1"));

    fx.finish(item, "alice", "domain/A");

    assert!(fx.is_active(item, "domain/B"));
    assert!(!fx.is_active(item, "domain/C"));

    let jobs = fx.kernel.calculate_jobs(&agent("bob"), item, JobScope::Domain).unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].refers_to("workflow/domain/B"));
    assert_eq!(jobs[0].transition_name, "Start");
    assert_eq!(jobs[0].role.as_deref(), Some("Reviewer"));

    let jobs = fx.kernel.calculate_jobs(&agent("carol"), item, JobScope::Domain).unwrap();
    assert!(jobs.is_empty());
}

#[test]
fn exclusive_split_needs_exactly_one_match() {
    for routing in ["3", "1,2"] {
        let fx = Fixture::new();
        let item = fx.create(branching(SplitKind::XOr, routing));
        fx.start(item, "alice", "domain/A").unwrap();

        let result = fx.complete(item, "alice", "domain/A");
        assert!(matches!(result, Err(KernelError::InvalidData(_))), "routing {}", routing);

        // nothing of the failed request was kept
        assert_eq!(fx.state(item, "domain/A"), "Started");
        assert!(!fx.is_active(item, "domain/B"));
        assert!(!fx.is_active(item, "domain/C"));
    }
}

#[test]
fn split_without_routing_is_invalid() {
    let fx = Fixture::new();
    let mut wf = branching(SplitKind::XOr, "1");
    let s = wf.search("domain/S").unwrap();
    wf.set_builtin(s, BuiltInProperty::RoutingExpr, "").unwrap();
    let item = fx.create(wf);
    fx.start(item, "alice", "domain/A").unwrap();

    assert!(matches!(fx.complete(item, "alice", "domain/A"), Err(KernelError::InvalidData(_))));
}

#[test]
fn routing_reads_item_properties() {
    let fx = Fixture::new();
    let item = fx.create(branching(SplitKind::XOr, "property//Decision"));
    fx.set_item_property(item, "Decision", "2");

    fx.finish(item, "alice", "domain/A");

    assert!(!fx.is_active(item, "domain/B"));
    assert!(fx.is_active(item, "domain/C"));
}

#[test]
fn or_split_activates_every_routed_branch() {
    let fx = Fixture::new();
    let item = fx.create(branching(SplitKind::Or, "1, 2"));
    fx.finish(item, "alice", "domain/A");
    assert!(fx.is_active(item, "domain/B"));
    assert!(fx.is_active(item, "domain/C"));

    let fx = Fixture::new();
    let item = fx.create(branching(SplitKind::Or, "7"));
    fx.start(item, "alice", "domain/A").unwrap();
    assert!(matches!(fx.complete(item, "alice", "domain/A"), Err(KernelError::InvalidData(_))));
}

/// domain: A -> And{B, C} -> J -> D, D being a composite holding D1
fn parallel() -> Workflow {
    let mut wf = branching(SplitKind::And, "");
    let d = wf.domain();
    let b = wf.search("domain/B").unwrap();
    let c = wf.search("domain/C").unwrap();
    let join = wf.add_join(d, "J", false).unwrap();
    let sub = wf.add_composite(d, "D", false).unwrap();
    wf.add_activity(sub, "D1", true).unwrap();
    wf.add_next(b, join).unwrap();
    wf.add_next(c, join).unwrap();
    wf.add_next(join, sub).unwrap();
    wf
}

#[test]
fn and_split_runs_every_branch() {
    let fx = Fixture::new();
    let item = fx.create(parallel());
    fx.finish(item, "alice", "domain/A");

    assert!(fx.is_active(item, "domain/B"));
    assert!(fx.is_active(item, "domain/C"));

    let jobs = fx.kernel.calculate_jobs(&agent("dave"), item, JobScope::Domain).unwrap();
    let mut paths: Vec<&str> = jobs.iter().map(|j| j.step_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["workflow/domain/B", "workflow/domain/C"]);
}

#[test]
fn join_waits_for_every_branch_and_fires_once() {
    let fx = Fixture::new();
    let item = fx.create(parallel());
    fx.finish(item, "alice", "domain/A");

    fx.finish(item, "bob", "domain/B");
    assert!(!fx.is_active(item, "domain/D"));
    assert_eq!(fx.events_of(item, "workflow/domain/D"), 0);

    fx.finish(item, "carol", "domain/C");
    assert!(fx.is_active(item, "domain/D"));
    assert_eq!(fx.state(item, "domain/D"), "Started");
    assert!(fx.is_active(item, "domain/D/D1"));
    assert_eq!(fx.events_of(item, "workflow/domain/D"), 1);
}

/// domain: A -> J -> Body -> Loop{"1": J, "2": End}
fn looping() -> Workflow {
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
    wf.set_builtin(lp, BuiltInProperty::RoutingExpr, "property//Again").unwrap();
    wf
}

#[test]
fn loop_back_edge_resets_the_body_only() {
    let fx = Fixture::new();
    let mut wf = looping();
    assert!(wf.verify(), "{:?}", wf.diagnostics());
    let item = fx.create(wf);
    fx.set_item_property(item, "Again", "1");

    fx.finish(item, "alice", "domain/A");
    assert!(fx.is_active(item, "domain/Body"));

    fx.finish(item, "alice", "domain/Body");
    assert!(fx.is_active(item, "domain/Body"));
    assert_eq!(fx.state(item, "domain/Body"), "Waiting");
    assert_eq!(fx.state(item, "domain/A"), "Finished");
    assert!(!fx.is_active(item, "domain/End"));

    fx.set_item_property(item, "Again", "2");
    fx.finish(item, "alice", "domain/Body");
    assert_eq!(fx.state(item, "domain/Body"), "Finished");
    assert!(!fx.is_active(item, "domain/Body"));
    assert!(fx.is_active(item, "domain/End"));
    assert_eq!(fx.events_of(item, "workflow/domain/Body"), 4);
}
