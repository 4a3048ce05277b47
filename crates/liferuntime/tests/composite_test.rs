mod common;

use common::{agent, Fixture};
use lifecore::machines::composite_trans;
use lifecore::{BuiltInProperty, ItemId, KernelError};
use liferuntime::{JobScope, Workflow};

/// domain: A -> Sub{S1 -> S2} -> Z
fn nested() -> Workflow {
    let mut wf = Workflow::new(ItemId::new());
    let d = wf.domain();
    let a = wf.add_activity(d, "A", true).unwrap();
    let sub = wf.add_composite(d, "Sub", false).unwrap();
    let z = wf.add_activity(d, "Z", false).unwrap();
    let s1 = wf.add_activity(sub, "S1", true).unwrap();
    let s2 = wf.add_activity(sub, "S2", false).unwrap();
    wf.add_next(a, sub).unwrap();
    wf.add_next(sub, z).unwrap();
    wf.add_next(s1, s2).unwrap();
    wf
}

#[test]
fn composite_starts_its_first_child() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.finish(item, "alice", "domain/A");

    assert_eq!(fx.state(item, "domain/Sub"), "Started");
    assert!(fx.is_active(item, "domain/Sub"));
    assert!(fx.is_active(item, "domain/Sub/S1"));
    assert!(!fx.is_active(item, "domain/Z"));
}

#[test]
fn composite_completes_when_its_last_child_finishes() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.finish(item, "alice", "domain/A");
    fx.finish(item, "alice", "domain/Sub/S1");
    assert_eq!(fx.state(item, "domain/Sub"), "Started");

    fx.finish(item, "alice", "domain/Sub/S2");

    assert_eq!(fx.state(item, "domain/Sub"), "Finished");
    assert!(!fx.is_active(item, "domain/Sub"));
    assert!(fx.is_active(item, "domain/Z"));
}

#[test]
fn storage_failure_while_entering_a_composite_is_reported_unchanged() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.start(item, "alice", "domain/A").unwrap();

    // A's record goes through, the automatic start of Sub does not
    fx.storage.fail_nth_commit(2);
    let result = fx.complete(item, "alice", "domain/A");
    assert!(matches!(result, Err(KernelError::Persistency(_))), "{:?}", result);

    assert_eq!(fx.state(item, "domain/A"), "Started");
    assert_eq!(fx.state(item, "domain/Sub"), "Waiting");
    assert!(!fx.is_active(item, "domain/Sub"));
    assert!(!fx.is_active(item, "domain/Sub/S1"));
    assert_eq!(fx.storage.inner.open_transactions(), 0);

    fx.complete(item, "alice", "domain/A").unwrap();
    assert_eq!(fx.state(item, "domain/Sub"), "Started");
    assert!(fx.is_active(item, "domain/Sub/S1"));
}

#[test]
fn composite_with_active_children_completes_only_when_abortable() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.finish(item, "alice", "domain/A");

    let result = fx.kernel.request_action(
        &agent("alice"),
        item,
        "domain/Sub",
        composite_trans::COMPLETE,
        "",
    );
    assert!(matches!(result, Err(KernelError::InvalidTransition(_))));
    assert!(fx.is_active(item, "domain/Sub/S1"));

    let fx = Fixture::new();
    let mut wf = nested();
    let sub = wf.search("domain/Sub").unwrap();
    wf.set_builtin(sub, BuiltInProperty::Abortable, true).unwrap();
    let item = fx.create(wf);
    fx.finish(item, "alice", "domain/A");

    fx.kernel
        .request_action(&agent("alice"), item, "domain/Sub", composite_trans::COMPLETE, "")
        .unwrap();
    assert_eq!(fx.state(item, "domain/Sub"), "Finished");
    assert!(!fx.is_active(item, "domain/Sub/S1"));
    assert!(fx.is_active(item, "domain/Z"));
}

#[test]
fn has_active_looks_into_nested_composites() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.finish(item, "alice", "domain/A");

    let wf = fx.kernel.load_workflow(item).unwrap();
    assert!(wf.has_active(wf.search("domain/Sub").unwrap()));
    assert!(wf.has_active(wf.domain()));
    assert!(!wf.has_active(wf.search("domain/Z").unwrap()));
}

#[test]
fn composite_offers_its_own_jobs_only_without_active_children() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.finish(item, "alice", "domain/A");

    let jobs = fx.kernel.calculate_jobs(&agent("alice"), item, JobScope::Domain).unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].refers_to("workflow/domain/Sub/S1"));

    let all = fx.kernel.calculate_all_jobs(&agent("alice"), item, JobScope::Domain).unwrap();
    assert!(all.iter().any(|j| j.refers_to("workflow/domain/Sub")));
    assert!(all.iter().all(|j| !j.refers_to("workflow/domain/Z")));
}

#[test]
fn dead_end_in_the_domain_keeps_the_last_step_active() {
    let fx = Fixture::new();
    let item = fx.create(nested());
    fx.finish(item, "alice", "domain/A");
    fx.finish(item, "alice", "domain/Sub/S1");
    fx.finish(item, "alice", "domain/Sub/S2");
    fx.finish(item, "alice", "domain/Z");

    assert_eq!(fx.state(item, "domain/Z"), "Finished");
    assert!(fx.is_active(item, "domain/Z"));
    assert_eq!(fx.state(item, "domain"), "Started");
}

#[test]
fn predefined_steps_are_always_available() {
    let fx = Fixture::new();
    let item = fx.create(nested());

    let wf = fx.kernel.load_workflow(item).unwrap();
    assert!(wf.is_active(wf.predefined()));
    assert!(fx
        .kernel
        .calculate_jobs(&agent("alice"), item, JobScope::Predefined)
        .unwrap()
        .is_empty());
}
