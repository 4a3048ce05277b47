mod common;

use common::{agent, Fixture};
use lifecore::audit::cluster;
use lifecore::machines::default_trans;
use lifecore::memory::MemoryDescriptions;
use lifecore::{BuiltInProperty, ClusterObject, ClusterStorage, ItemId, KernelError, Schema};
use liferuntime::{SplitKind, Workflow};

/// domain: A -> B, A for clerks, B for reviewers
fn two_steps() -> Workflow {
    let mut wf = Workflow::new(ItemId::new());
    let d = wf.domain();
    let a = wf.add_activity(d, "A", true).unwrap();
    let b = wf.add_activity(d, "B", false).unwrap();
    wf.add_next(a, b).unwrap();
    wf.set_builtin(a, BuiltInProperty::AgentRole, "Clerk").unwrap();
    wf.set_builtin(b, BuiltInProperty::AgentRole, "Reviewer").unwrap();
    wf
}

#[test]
fn creating_an_item_activates_the_first_step() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());

    assert!(fx.is_active(item, "domain/A"));
    assert!(!fx.is_active(item, "domain/B"));
    assert_eq!(fx.state(item, "domain"), "Started");
    assert_eq!(fx.state(item, "domain/A"), "Waiting");
}

#[test]
fn creating_an_item_twice_fails() {
    let fx = Fixture::new();
    let wf = two_steps();
    let again = wf.clone();
    fx.create(wf);

    let result = fx.kernel.create_item(&agent("alice"), again);
    assert!(matches!(result, Err(KernelError::ObjectAlreadyExists(_))));
}

#[test]
fn completing_a_step_moves_on_to_the_next() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());

    fx.finish(item, "alice", "domain/A");

    assert_eq!(fx.state(item, "domain/A"), "Finished");
    assert!(!fx.is_active(item, "domain/A"));
    assert!(fx.is_active(item, "domain/B"));
    assert_eq!(fx.events_of(item, "workflow/domain/A"), 2);
}

#[test]
fn illegal_transition_leaves_the_state_unchanged() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());

    let result = fx.complete(item, "alice", "domain/A");
    assert!(matches!(result, Err(KernelError::InvalidTransition(_))));

    let result = fx.kernel.request_action(&agent("alice"), item, "domain/A", 42, "");
    assert!(matches!(result, Err(KernelError::InvalidTransition(_))));

    assert_eq!(fx.state(item, "domain/A"), "Waiting");
    assert_eq!(fx.events_of(item, "workflow/domain/A"), 0);
}

#[test]
fn agent_without_the_role_is_refused() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());

    let result = fx.start(item, "bob", "domain/A");
    assert!(matches!(result, Err(KernelError::AccessRights(_))));

    // admins may stand in for any role
    fx.start(item, "root", "domain/A").unwrap();
    assert_eq!(fx.state(item, "domain/A"), "Started");
}

#[test]
fn started_step_is_reserved_by_its_agent() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());
    fx.start(item, "alice", "domain/A").unwrap();

    let wf = fx.kernel.load_workflow(item).unwrap();
    let a = wf.search("domain/A").unwrap();
    assert_eq!(
        wf.properties(a).unwrap().builtin_string(BuiltInProperty::AgentName).as_deref(),
        Some("alice")
    );

    let result = fx.complete(item, "root", "domain/A");
    assert!(matches!(result, Err(KernelError::AccessRights(_))));

    fx.complete(item, "alice", "domain/A").unwrap();
    let wf = fx.kernel.load_workflow(item).unwrap();
    assert_eq!(wf.properties(a).unwrap().builtin_string(BuiltInProperty::AgentName), None);
}

#[test]
fn unknown_path_or_non_activity_is_not_found() {
    let fx = Fixture::new();
    let mut wf = two_steps();
    let d = wf.domain();
    let split = wf.add_split(d, "S", SplitKind::And, false).unwrap();
    let b = wf.search("domain/B").unwrap();
    wf.add_next(b, split).unwrap();
    let item = fx.create(wf);

    let result = fx.start(item, "alice", "domain/Missing");
    assert!(matches!(result, Err(KernelError::ObjectNotFound(_))));

    let result = fx.start(item, "alice", "domain/S");
    assert!(matches!(result, Err(KernelError::ObjectNotFound(_))));
}

#[test]
fn outcome_is_stored_with_its_viewpoints() {
    let descriptions = MemoryDescriptions::new().with_schema(Schema::new("Report", 2));
    let fx = Fixture::with_descriptions(descriptions);

    let mut wf = two_steps();
    let a = wf.search("domain/A").unwrap();
    wf.set_builtin(a, BuiltInProperty::SchemaType, "Report").unwrap();
    wf.set_builtin(a, BuiltInProperty::SchemaVersion, 2i64).unwrap();
    wf.set_builtin(a, BuiltInProperty::Viewpoint, "draft").unwrap();
    let item = fx.create(wf);

    fx.start(item, "alice", "domain/A").unwrap();

    let result = fx.complete(item, "alice", "domain/A");
    assert!(matches!(result, Err(KernelError::InvalidData(_))));
    assert_eq!(fx.state(item, "domain/A"), "Started");

    let outcome = fx
        .kernel
        .request_action(&agent("alice"), item, "domain/A", default_trans::COMPLETE, "<report/>")
        .unwrap();
    assert_eq!(outcome, "<report/>");

    let objects = fx.storage.inner.objects(item);
    let event = objects
        .values()
        .filter_map(ClusterObject::as_event)
        .find(|e| e.step_path == "workflow/domain/A" && e.transition == default_trans::COMPLETE)
        .unwrap();
    assert_eq!(event.schema.as_ref().map(|s| s.name.as_str()), Some("Report"));
    assert_eq!(event.view_name.as_deref(), Some("draft"));

    let outcome_path = format!("{}/Report/2/{}", cluster::OUTCOME, event.id);
    assert_eq!(
        objects.get(&outcome_path).and_then(ClusterObject::as_outcome).map(|o| o.data.as_str()),
        Some("<report/>")
    );
    for view in ["draft", "last"] {
        let vp = objects
            .get(&format!("{}/Report/{}", cluster::VIEWPOINT, view))
            .and_then(ClusterObject::as_viewpoint)
            .unwrap();
        assert_eq!(vp.event_id, event.id);
    }
}

#[test]
fn event_ids_follow_each_other() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());
    fx.finish(item, "alice", "domain/A");

    let mut ids = fx
        .storage
        .inner
        .contents(item, cluster::AUDIT_TRAIL, None)
        .unwrap()
        .into_iter()
        .map(|id| id.parse::<u64>().unwrap())
        .collect::<Vec<_>>();
    ids.sort();
    // root start, domain start, A start, A complete
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

#[test]
fn breakpoint_pauses_after_the_step_finishes() {
    let fx = Fixture::new();
    let mut wf = two_steps();
    let a = wf.search("domain/A").unwrap();
    wf.set_builtin(a, BuiltInProperty::Breakpoint, true).unwrap();
    let item = fx.create(wf);

    fx.finish(item, "alice", "domain/A");

    assert_eq!(fx.state(item, "domain/A"), "Finished");
    assert!(!fx.is_active(item, "domain/B"));
}

#[test]
fn skip_needs_the_skippable_property() {
    let fx = Fixture::new();
    let mut wf = two_steps();
    let b = wf.search("domain/B").unwrap();
    wf.set_property(b, "Skippable", true).unwrap();
    let item = fx.create(wf);

    let result = fx
        .kernel
        .request_action(&agent("alice"), item, "domain/A", default_trans::SKIP, "");
    assert!(matches!(result, Err(KernelError::AccessRights(_))));

    fx.finish(item, "alice", "domain/A");
    fx.kernel
        .request_action(&agent("bob"), item, "domain/B", default_trans::SKIP, "")
        .unwrap();
    assert_eq!(fx.state(item, "domain/B"), "Finished");
}

#[test]
fn failed_commit_keeps_the_stored_lifecycle() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());
    let before = fx.storage.inner.contents(item, cluster::AUDIT_TRAIL, None).unwrap();

    fx.storage.fail(true);
    let result = fx.start(item, "alice", "domain/A");
    assert!(matches!(result, Err(KernelError::Persistency(_))));
    fx.storage.fail(false);

    assert_eq!(fx.state(item, "domain/A"), "Waiting");
    assert_eq!(fx.storage.inner.contents(item, cluster::AUDIT_TRAIL, None).unwrap(), before);
    assert_eq!(fx.storage.inner.open_transactions(), 0);

    fx.start(item, "alice", "domain/A").unwrap();
    assert_eq!(fx.state(item, "domain/A"), "Started");
}

#[test]
fn workflow_round_trips_through_storage() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());
    fx.start(item, "alice", "domain/A").unwrap();

    let stored = fx.kernel.load_workflow(item).unwrap();
    let json = stored.to_json().unwrap();
    let restored = Workflow::from_json(&json).unwrap();

    assert_eq!(restored.item(), item);
    assert_eq!(restored.vertex_count(), stored.vertex_count());
    let a = restored.search("domain/A").unwrap();
    assert_eq!(restored.state_name(a, &fx.kernel).unwrap(), "Started");
}

#[test]
fn corrupted_lifecycle_is_refused_on_load() {
    let fx = Fixture::new();
    let item = fx.create(two_steps());

    let mut value = match fx.storage.inner.get(item, cluster::WORKFLOW, None).unwrap() {
        ClusterObject::Lifecycle(value) => value,
        other => panic!("unexpected {:?}", other),
    };
    value["root"] = serde_json::json!(999);
    let txn = fx.storage.begin().unwrap();
    fx.storage.put(item, &ClusterObject::Lifecycle(value), txn).unwrap();
    fx.storage.commit(txn).unwrap();
    fx.storage.close(txn);

    assert!(matches!(fx.kernel.load_workflow(item), Err(KernelError::InvalidData(_))));
    let result = fx.start(item, "alice", "domain/A");
    assert!(matches!(result, Err(KernelError::InvalidData(_))));
    assert_eq!(fx.storage.inner.open_transactions(), 0);
}
