use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use papertrail::prelude::*;
use serde_json::json;

// ─── Fixtures ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    username: String,
}

impl Entity for User {
    fn entity_id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Group {
    id: i64,
    name: String,
}

impl Entity for Group {
    fn entity_id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}

/// Stand-in for the application's own tables.
#[derive(Default)]
struct Directory {
    users: Mutex<HashMap<i64, User>>,
    groups: Mutex<HashMap<i64, Group>>,
}

impl Directory {
    fn create_user(&self, id: i64, username: &str) -> User {
        let user = User {
            id,
            username: username.into(),
        };
        self.users.lock().unwrap().insert(id, user.clone());
        user
    }

    fn create_group(&self, id: i64, name: &str) -> Group {
        let group = Group {
            id,
            name: name.into(),
        };
        self.groups.lock().unwrap().insert(id, group.clone());
        group
    }
}

fn registry(directory: &Arc<Directory>) -> KindRegistry {
    let mut registry = KindRegistry::new();

    let users = directory.clone();
    registry
        .register::<User, _>("auth.user", move |id: &EntityId| -> Result<Option<User>> {
            Ok(match id {
                EntityId::Int(n) => users.users.lock().unwrap().get(n).cloned(),
                EntityId::Text(_) => None,
            })
        })
        .unwrap();

    let groups = directory.clone();
    registry
        .register::<Group, _>("auth.group", move |id: &EntityId| -> Result<Option<Group>> {
            Ok(match id {
                EntityId::Int(n) => groups.groups.lock().unwrap().get(n).cloned(),
                EntityId::Text(_) => None,
            })
        })
        .unwrap();

    registry
}

/// One trail per store adapter, sharing the same directory.
fn trails() -> Vec<(&'static str, Trail<Box<dyn EntryStore>>, Arc<Directory>)> {
    let memory_dir = Arc::new(Directory::default());
    let sqlite_dir = Arc::new(Directory::default());

    let memory: Box<dyn EntryStore> = Box::new(MemoryStore::new());
    let sqlite: Box<dyn EntryStore> = Box::new(SqliteStore::open_in_memory().unwrap());

    vec![
        ("memory", Trail::new(memory, registry(&memory_dir)), memory_dir),
        ("sqlite", Trail::new(sqlite, registry(&sqlite_dir)), sqlite_dir),
    ]
}

fn ids<S: EntryStore>(set: &QuerySet<'_, S>) -> BTreeSet<EntryId> {
    set.ids().unwrap().into_iter().collect()
}

// ─── Recording ───────────────────────────────────────────────────

#[test]
fn external_key_create_is_idempotent() {
    for (store, trail, _) in trails() {
        let first = trail
            .record(NewEntry::new("t", "m1").with_external_key("X"))
            .unwrap();
        let second = trail
            .record(NewEntry::new("t", "m2").with_external_key("X"))
            .unwrap();

        assert_eq!(second.id, first.id, "{store}");
        assert_eq!(second.message, "m1", "{store}");
        assert_eq!(trail.entries().count().unwrap(), 1, "{store}");
    }
}

#[test]
fn payload_round_trips_structurally() {
    for (store, trail, _) in trails() {
        let data = json!({"k": "v", "n": 3, "nested": {"list": [1, 2.5, null, true]}});
        let entry = trail
            .record(NewEntry::new("t", "m").with_data(data.clone()))
            .unwrap();

        let read_back = trail.get(entry.id).unwrap().unwrap();
        assert_eq!(read_back.data, Some(data), "{store}");
    }
}

#[test]
fn overridden_timestamp_is_kept() {
    for (store, trail, _) in trails() {
        let imported_at = Utc.with_ymd_and_hms(2019, 3, 4, 5, 6, 7).unwrap();
        let entry = trail
            .record(NewEntry::new("import", "Imported row").with_timestamp(imported_at))
            .unwrap();

        assert_eq!(entry.timestamp, imported_at, "{store}");
        assert_eq!(
            trail.get(entry.id).unwrap().unwrap().timestamp,
            imported_at,
            "{store}"
        );
    }
}

#[test]
fn listener_runs_once_per_created_entry() {
    for (store, trail, _) in trails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        trail.subscribe(Arc::new(move |_: &Entry| -> Result<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        trail.record(NewEntry::new("test", "Testing signal")).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1, "{store}");
    }
}

// ─── Relation queries ────────────────────────────────────────────

#[test]
fn relation_and_semantics() {
    for (store, trail, dir) in trails() {
        let u = trail.reference_for(&dir.create_user(1, "testuser")).unwrap();
        let g = trail.reference_for(&dir.create_group(1, "Test Group")).unwrap();

        let e1 = trail
            .record(NewEntry::new("e1", "m").with_target("user", u.clone()))
            .unwrap();
        trail
            .record(NewEntry::new("e2", "m").with_target("group", g.clone()))
            .unwrap();
        let e3 = trail
            .record(
                NewEntry::new("e3", "m")
                    .with_target("user", u.clone())
                    .with_target("group", g.clone()),
            )
            .unwrap();

        let both = trail.related_to(Relations::new().named("user", u.clone()).named("group", g.clone()));
        assert_eq!(ids(&both), BTreeSet::from([e3.id]), "{store}");

        let positional = trail.related_to(Relations::new().any(u.clone()));
        assert_eq!(ids(&positional), BTreeSet::from([e1.id, e3.id]), "{store}");

        let wrong_name = trail.related_to(Relations::new().named("user", g.clone()));
        assert_eq!(wrong_name.count().unwrap(), 0, "{store}");
    }
}

#[test]
fn relation_or_is_deduplicated() {
    for (store, trail, dir) in trails() {
        let u = trail.reference_for(&dir.create_user(1, "testuser")).unwrap();
        let g = trail.reference_for(&dir.create_group(1, "Test Group")).unwrap();

        trail.record(NewEntry::new("e1", "m").with_target("user", u.clone())).unwrap();
        trail.record(NewEntry::new("e2", "m").with_target("group", g.clone())).unwrap();
        trail
            .record(
                NewEntry::new("e3", "m")
                    .with_target("user", u.clone())
                    .with_target("group", g.clone()),
            )
            .unwrap();

        let either = trail
            .entries()
            .filter(Predicate::related_to(u.clone()) | Predicate::related_to(g.clone()));
        let found = either.fetch().unwrap();
        assert_eq!(found.len(), 3, "{store}");
        assert_eq!(ids(&either).len(), 3, "{store}");

        let any_of = trail.related_to(Relations::new().any(RelatedTo::any_of([u, g])));
        assert_eq!(any_of.count().unwrap(), 3, "{store}");
    }
}

#[test]
fn related_to_counts_over_mixed_trail() {
    for (store, trail, dir) in trails() {
        trail.record(NewEntry::new("test", "Testing entry")).unwrap();

        let user = dir.create_user(1, "testuser");
        let u = trail.reference_for(&user).unwrap();
        trail
            .record(NewEntry::new("test-user-created", "User created").with_target("user", u.clone()))
            .unwrap();

        let group = dir.create_group(1, "Test Group");
        let g = trail.reference_for(&group).unwrap();
        trail
            .record(NewEntry::new("test-group-created", "Group created").with_target("group", g.clone()))
            .unwrap();

        trail
            .record(
                NewEntry::new("test-group-added-user", "User added to group")
                    .with_target("user", u.clone())
                    .with_target("group", g.clone()),
            )
            .unwrap();
        trail
            .record(NewEntry::new("test-extra-data", "Testing extra data").with_data(json!({"key": "value"})))
            .unwrap();
        trail
            .record(NewEntry::new("test-overridden-timestamp", "Importing").with_timestamp(Utc::now()))
            .unwrap();
        trail.record(NewEntry::new("other", "Not a test entry")).unwrap();

        let qs = trail.query(EntryQuery::new().event_type_prefix("test"));
        assert_eq!(qs.count().unwrap(), 6, "{store}");

        let count = |relations: Relations| qs.clone().related_to(relations).count().unwrap();
        assert_eq!(count(Relations::new().any(u.clone())), 2, "{store}");
        assert_eq!(count(Relations::new().any(g.clone())), 2, "{store}");
        assert_eq!(count(Relations::new().named("user", u.clone())), 2, "{store}");
        assert_eq!(count(Relations::new().named("group", g.clone())), 2, "{store}");
        assert_eq!(count(Relations::new().named("user", g.clone())), 0, "{store}");
        assert_eq!(count(Relations::new().named("group", u.clone())), 0, "{store}");
        assert_eq!(count(Relations::new().any(u.clone()).any(g.clone())), 1, "{store}");
        assert_eq!(
            count(Relations::new().named("user", u.clone()).named("group", g.clone())),
            1,
            "{store}"
        );

        // Chaining is equivalent to a merged call.
        let chained = qs
            .clone()
            .related_to(Relations::new().named("user", u.clone()))
            .related_to(Relations::new().named("group", g.clone()));
        let merged = qs
            .clone()
            .related_to(Relations::new().named("user", u.clone()).named("group", g.clone()));
        assert_eq!(ids(&chained), ids(&merged), "{store}");

        // Predicates filtered one by one match the positional form.
        let filtered = qs
            .clone()
            .filter(Predicate::related_to(u.clone()))
            .filter(Predicate::related_to(g.clone()));
        let positional = qs.clone().related_to(Relations::new().any(u.clone()).any(g.clone()));
        assert_eq!(ids(&filtered), ids(&positional), "{store}");

        let or = qs
            .clone()
            .filter(Predicate::related_to(u.clone()) | Predicate::related_to(g.clone()));
        assert_eq!(or.count().unwrap(), 3, "{store}");
    }
}

#[test]
fn zero_constraints_and_unknown_names() {
    for (store, trail, dir) in trails() {
        let u = trail.reference_for(&dir.create_user(1, "a")).unwrap();
        trail.record(NewEntry::new("t", "m").with_target("user", u.clone())).unwrap();
        trail.record(NewEntry::new("t", "m")).unwrap();

        assert_eq!(trail.related_to(Relations::new()).count().unwrap(), 2, "{store}");
        assert_eq!(
            trail.related_to(Relations::new().named("nobody-uses-this", u)).count().unwrap(),
            0,
            "{store}"
        );
        assert_eq!(
            trail
                .related_to(Relations::new().any(EntityRef::new("auth.group", 99)))
                .count()
                .unwrap(),
            0,
            "{store}"
        );
        assert!(!trail.entries().filter(Predicate::RelatedTo(RelatedTo::any_of([]))).exists().unwrap());
    }
}

#[test]
fn query_set_is_reissued_on_every_evaluation() {
    for (store, trail, dir) in trails() {
        let u = trail.reference_for(&dir.create_user(1, "a")).unwrap();
        let related = trail.related_to(Relations::new().any(u.clone()));
        assert_eq!(related.count().unwrap(), 0, "{store}");

        trail.record(NewEntry::new("t", "m").with_target("user", u)).unwrap();
        assert_eq!(related.count().unwrap(), 1, "{store}");
    }
}

// ─── Ordering ────────────────────────────────────────────────────

#[test]
fn default_ordering_is_newest_first_then_id() {
    for (store, trail, _) in trails() {
        let t = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();

        let e1 = trail.record(NewEntry::new("t", "t1").with_timestamp(t(1))).unwrap();
        let e3 = trail.record(NewEntry::new("t", "t3").with_timestamp(t(3))).unwrap();
        let e2 = trail.record(NewEntry::new("t", "t2").with_timestamp(t(2))).unwrap();
        let tie_a = trail.record(NewEntry::new("t", "tie a").with_timestamp(t(0))).unwrap();
        let tie_b = trail.record(NewEntry::new("t", "tie b").with_timestamp(t(0))).unwrap();

        assert_eq!(
            trail.entries().ids().unwrap(),
            vec![e3.id, e2.id, e1.id, tie_b.id, tie_a.id],
            "{store}"
        );
        assert_eq!(trail.entries().first().unwrap().map(|e| e.id), Some(e3.id), "{store}");
        assert_eq!(trail.entries().limit(2).ids().unwrap(), vec![e3.id, e2.id], "{store}");
    }
}

#[test]
fn time_window_and_message_filters() {
    for (store, trail, _) in trails() {
        let day = |d| Utc.with_ymd_and_hms(2026, 1, d, 12, 0, 0).unwrap();
        trail.record(NewEntry::new("t", "Alice signed up").with_timestamp(day(1))).unwrap();
        trail.record(NewEntry::new("t", "Bob signed up").with_timestamp(day(2))).unwrap();
        trail.record(NewEntry::new("t", "Bob left").with_timestamp(day(3))).unwrap();

        let window = trail.query(EntryQuery::new().since(day(2)).until(day(3)));
        let messages: Vec<_> = window.fetch().unwrap().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["Bob signed up"], "{store}");

        let bob = trail.query(EntryQuery::new().message_contains("Bob"));
        assert_eq!(bob.count().unwrap(), 2, "{store}");
        let bob_lowercase = trail.query(EntryQuery::new().message_contains("bob"));
        assert_eq!(bob_lowercase.count().unwrap(), 0, "{store}");
    }
}

// ─── Targets ─────────────────────────────────────────────────────

#[test]
fn replace_versus_no_replace() {
    for (store, trail, dir) in trails() {
        let a = dir.create_user(1, "a");
        let b = dir.create_user(2, "b");
        let e = trail.record(NewEntry::new("t", "m")).unwrap();

        trail.assign_entity(e.id, "owner", &a, AssignMode::Replace).unwrap();
        let err = trail
            .assign_entity(e.id, "owner", &b, AssignMode::NoReplace)
            .unwrap_err();
        assert!(matches!(err, TrailError::DuplicateTarget { .. }), "{store}");
        assert_eq!(trail.get_target::<User>(e.id, "owner").unwrap(), Some(a.clone()), "{store}");

        trail.assign_entity(e.id, "owner", &b, AssignMode::default()).unwrap();
        assert_eq!(trail.get_target::<User>(e.id, "owner").unwrap(), Some(b), "{store}");
        assert_eq!(trail.store().entry_targets(e.id).unwrap().len(), 1, "{store}");
    }
}

#[test]
fn dangling_reference_is_tolerated() {
    for (store, trail, dir) in trails() {
        let x = dir.create_user(7, "x");
        let e = trail
            .record(NewEntry::new("t", "m").with_target("x", trail.reference_for(&x).unwrap()))
            .unwrap();

        dir.users.lock().unwrap().remove(&7);

        assert!(trail.has_target(e.id, "x").unwrap(), "{store}");
        assert_eq!(trail.get_target::<User>(e.id, "x").unwrap(), None, "{store}");
    }
}

#[test]
fn setters_and_getters() {
    for (store, trail, dir) in trails() {
        let e = trail.record(NewEntry::new("test-entry", "Test Entry")).unwrap();
        assert!(trail.targets_map(e.id).unwrap().is_empty(), "{store}");

        let user = dir.create_user(1, "testuser");
        trail.assign_entity(e.id, "target1", &user, AssignMode::Replace).unwrap();

        assert_eq!(trail.get_target::<User>(e.id, "target1").unwrap(), Some(user.clone()), "{store}");
        assert_eq!(trail.get_target::<User>(e.id, "target2").unwrap(), None, "{store}");
        assert!(trail.has_target(e.id, "target1").unwrap(), "{store}");
        assert!(!trail.has_target(e.id, "target2").unwrap(), "{store}");

        // A target to an entity that never existed.
        let virtual_ref = trail.registry().reference("auth.user", 10000).unwrap();
        trail
            .assign_target(e.id, "virtual", virtual_ref.clone(), AssignMode::Replace)
            .unwrap();
        assert!(trail.has_target(e.id, "virtual").unwrap(), "{store}");
        assert_eq!(trail.get_target::<User>(e.id, "virtual").unwrap(), None, "{store}");

        let map = trail.targets_map(e.id).unwrap();
        assert_eq!(map.len(), 2, "{store}");
        assert!(map["target1"].is_live(), "{store}");
        assert_eq!(map["virtual"].reference(), &virtual_ref, "{store}");
        assert!(!map["virtual"].is_live(), "{store}");

        // Wrong type for the kind resolves to nothing.
        assert_eq!(trail.get_target::<Group>(e.id, "target1").unwrap(), None, "{store}");
    }
}

#[test]
fn targets_keep_assignment_order_when_replaced() {
    for (store, trail, dir) in trails() {
        let a = trail.reference_for(&dir.create_user(1, "a")).unwrap();
        let b = trail.reference_for(&dir.create_user(2, "b")).unwrap();
        let g = trail.reference_for(&dir.create_group(1, "g")).unwrap();

        let e = trail
            .record(
                NewEntry::new("t", "m")
                    .with_target("owner", a)
                    .with_target("group", g),
            )
            .unwrap();
        trail.assign_target(e.id, "owner", b.clone(), AssignMode::Replace).unwrap();

        let names: Vec<_> = trail
            .get(e.id)
            .unwrap()
            .unwrap()
            .targets
            .into_iter()
            .map(|t| t.relation_name)
            .collect();
        assert_eq!(names, vec!["owner", "group"], "{store}");
        assert_eq!(trail.target_reference(e.id, "owner").unwrap(), Some(b), "{store}");
    }
}

#[test]
fn retarget_scoped_and_global() {
    for (store, trail, dir) in trails() {
        let old = trail.reference_for(&dir.create_user(1, "duplicate")).unwrap();
        let new = trail.reference_for(&dir.create_user(2, "canonical")).unwrap();

        let e1 = trail.record(NewEntry::new("t", "m").with_target("user", old.clone())).unwrap();
        let e2 = trail
            .record(
                NewEntry::new("t", "m")
                    .with_target("user", old.clone())
                    .with_target("also", new.clone()),
            )
            .unwrap();

        let only_e1 = RetargetScope::Entries(BTreeSet::from([e1.id]));
        assert_eq!(trail.retarget_globally(&old, &new, &only_e1).unwrap(), 1, "{store}");
        assert_eq!(trail.target_reference(e2.id, "user").unwrap(), Some(old.clone()), "{store}");

        assert_eq!(trail.retarget_globally(&old, &new, &RetargetScope::All).unwrap(), 1, "{store}");
        // Both names of e2 now point at the same entity.
        assert_eq!(trail.target_reference(e2.id, "user").unwrap(), Some(new.clone()), "{store}");
        assert_eq!(trail.target_reference(e2.id, "also").unwrap(), Some(new.clone()), "{store}");
        assert_eq!(trail.related_to(Relations::new().any(new)).count().unwrap(), 2, "{store}");
    }
}

#[test]
fn large_reference_sets_are_answered() {
    for (store, trail, _) in trails() {
        let hit = trail
            .record(NewEntry::new("t", "hit").with_target("user", EntityRef::new("auth.user", 500)))
            .unwrap();
        trail
            .record(NewEntry::new("t", "miss").with_target("user", EntityRef::new("auth.user", 5_000)))
            .unwrap();

        let users: Vec<_> = (0..1_000).map(|i| EntityRef::new("auth.user", i)).collect();
        let any = trail.related_to(Relations::new().any(users.clone()));
        assert_eq!(any.ids().unwrap(), vec![hit.id], "{store}");

        let named = trail.related_to(Relations::new().named("user", users.clone()));
        assert_eq!(named.count().unwrap(), 1, "{store}");
        let wrong_name = trail.related_to(Relations::new().named("owner", users));
        assert_eq!(wrong_name.count().unwrap(), 0, "{store}");

        // Far more entry ids than one statement can bind.
        let mut scope: BTreeSet<EntryId> = (1_000..41_000).map(EntryId).collect();
        scope.insert(hit.id);
        let moved = trail
            .retarget_globally(
                &EntityRef::new("auth.user", 500),
                &EntityRef::new("auth.user", 1),
                &RetargetScope::Entries(scope),
            )
            .unwrap();
        assert_eq!(moved, 1, "{store}");
        assert_eq!(
            trail.target_reference(hit.id, "user").unwrap(),
            Some(EntityRef::new("auth.user", 1)),
            "{store}"
        );
    }
}

#[test]
fn timestamps_beyond_four_digit_years_stay_readable() {
    for (store, trail, _) in trails() {
        let future = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        let ancient = Utc.with_ymd_and_hms(-1, 6, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let f = trail.record(NewEntry::new("t", "future").with_timestamp(future)).unwrap();
        let a = trail.record(NewEntry::new("t", "ancient").with_timestamp(ancient)).unwrap();
        let n = trail.record(NewEntry::new("t", "now").with_timestamp(now)).unwrap();

        let entries = trail.entries().fetch().unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![f.id, n.id, a.id], "{store}");
        assert_eq!(entries[0].timestamp, future, "{store}");
        assert_eq!(entries[2].timestamp, ancient, "{store}");

        assert_eq!(trail.query(EntryQuery::new().since(now)).count().unwrap(), 2, "{store}");
        assert_eq!(trail.query(EntryQuery::new().until(now)).count().unwrap(), 1, "{store}");
    }
}

#[test]
fn text_ids_are_supported() {
    for (store, trail, _) in trails() {
        let mut kinds = KindRegistry::new();
        kinds.register_kind("doc").unwrap();
        let docs = Trail::new(MemoryStore::new(), kinds);
        let reference = EntityRef::new("doc", "a:b:c");
        docs.record(NewEntry::new("t", "m").with_target("doc", reference.clone())).unwrap();
        assert_eq!(docs.related_to(Relations::new().any(reference)).count().unwrap(), 1, "{store}");

        // Unregistered kinds are rejected on the other trail.
        let err = trail
            .record(NewEntry::new("t", "m").with_target("doc", EntityRef::new("doc", "x")))
            .unwrap_err();
        assert!(matches!(err, TrailError::UnregisteredKind { .. }), "{store}");
    }
}

#[test]
fn sqlite_trail_survives_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("trail.db");
    let dir = Arc::new(Directory::default());
    let user = dir.create_user(1, "alice");

    {
        let trail = Trail::new(SqliteStore::open(&path).unwrap(), registry(&dir));
        trail
            .record(
                NewEntry::new("login", "Alice logged in")
                    .with_target("user", trail.reference_for(&user).unwrap())
                    .with_external_key("session-1"),
            )
            .unwrap();
    }

    let trail = Trail::new(SqliteStore::open(&path).unwrap(), registry(&dir));
    let outcome = trail
        .record_outcome(NewEntry::new("login", "again").with_external_key("session-1"))
        .unwrap();
    assert!(!outcome.is_created());

    let related = trail.related_to(Relations::new().named("user", trail.reference_for(&user).unwrap()));
    let entries = related.fetch().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(trail.get_target::<User>(entries[0].id, "user").unwrap(), Some(user));
}
