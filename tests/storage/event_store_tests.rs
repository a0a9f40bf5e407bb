//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.
//!
//! Every test works in its own instance, so implementations can share one
//! store across the whole suite.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use iam_eventstore::event::BaseEvent;
use iam_eventstore::search::Query;
use iam_eventstore::storage::EventStore;
use iam_eventstore::{
    Aggregate, Columns, Command, Context, Error, Event, FieldObject, FieldOperation, FieldQuery,
    Position, SearchQueryBuilder, UniqueConstraint,
};

/// Command with freely configurable payload and side effects.
pub struct StoreCommand {
    base: BaseEvent,
    payload: Option<Value>,
    unique_constraints: Vec<UniqueConstraint>,
    field_operations: Vec<FieldOperation>,
}

impl StoreCommand {
    pub fn new(ctx: &Context, aggregate_type: &str, id: &str, event_type: &str) -> Self {
        let aggregate = Aggregate::new(ctx, id, aggregate_type, "v1");
        Self {
            base: BaseEvent::new_for_push(ctx, &aggregate, event_type),
            payload: None,
            unique_constraints: Vec::new(),
            field_operations: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_unique(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    pub fn with_field(mut self, operation: FieldOperation) -> Self {
        self.field_operations.push(operation);
        self
    }

    pub fn arc(self) -> Arc<dyn Command> {
        Arc::new(self)
    }
}

impl Command for StoreCommand {
    fn base(&self) -> &BaseEvent {
        &self.base
    }

    fn payload(&self) -> iam_eventstore::Result<Option<Value>> {
        Ok(self.payload.clone())
    }

    fn unique_constraints(&self) -> Vec<UniqueConstraint> {
        self.unique_constraints.clone()
    }

    fn field_operations(&self) -> Vec<FieldOperation> {
        self.field_operations.clone()
    }
}

/// Context in a fresh instance.
pub fn fresh_context() -> Context {
    Context::new()
        .with_instance_id(Uuid::new_v4().to_string())
        .with_resource_owner("org-1")
        .with_creator("tester")
        .with_service("contract")
}

fn cmd(ctx: &Context, id: &str, event_type: &str) -> Arc<dyn Command> {
    StoreCommand::new(ctx, "org", id, event_type).arc()
}

fn stream(ctx: &Context, id: &str) -> SearchQueryBuilder {
    SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .add_query()
        .aggregate_types(["org"])
        .aggregate_ids([id])
        .builder()
}

fn build(builder: SearchQueryBuilder) -> Query {
    builder.build().expect("query should build")
}

fn sequences(events: &[Event]) -> Vec<u64> {
    events.iter().map(|e| e.sequence).collect()
}

async fn push_stream<S: EventStore>(store: &S, ctx: &Context, id: &str, count: usize) {
    let commands: Vec<_> = (0..count).map(|_| cmd(ctx, id, "org.changed")).collect();
    store
        .push(ctx, &commands)
        .await
        .expect("push should succeed");
}

// =============================================================================
// EventStore::push tests
// =============================================================================

pub async fn test_push_assigns_contiguous_sequences<S: EventStore>(store: &S) {
    let ctx = fresh_context();

    let first = store
        .push(
            &ctx,
            &[
                cmd(&ctx, "o1", "org.added"),
                cmd(&ctx, "o1", "org.changed"),
                cmd(&ctx, "o1", "org.changed"),
            ],
        )
        .await
        .expect("first push should succeed");
    assert_eq!(sequences(&first), vec![1, 2, 3]);
    assert!(first
        .iter()
        .all(|e| e.position.global == first[0].position.global));
    let orders: Vec<u32> = first.iter().map(|e| e.position.in_tx_order).collect();
    assert_eq!(orders, vec![0, 1, 2]);

    let second = store
        .push(&ctx, &[cmd(&ctx, "o1", "org.changed"), cmd(&ctx, "o1", "org.changed")])
        .await
        .expect("second push should succeed");
    assert_eq!(sequences(&second), vec![4, 5]);
    assert!(second[0].position > first[2].position);
}

pub async fn test_push_interleaved_aggregates<S: EventStore>(store: &S) {
    let ctx = fresh_context();

    let events = store
        .push(
            &ctx,
            &[
                cmd(&ctx, "a", "org.added"),
                cmd(&ctx, "b", "org.added"),
                cmd(&ctx, "a", "org.changed"),
            ],
        )
        .await
        .expect("push should succeed");
    assert_eq!(sequences(&events), vec![1, 1, 2]);
}

pub async fn test_push_empty_batch_fails<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let err = store.push(&ctx, &[]).await.unwrap_err();
    assert!(err.is_invalid_argument(), "got {err:?}");
}

pub async fn test_push_inherits_first_owner<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    push_stream(store, &ctx, "o1", 1).await;

    let other_owner = ctx.clone().with_resource_owner("org-2");
    let events = store
        .push(&other_owner, &[cmd(&other_owner, "o1", "org.changed")])
        .await
        .expect("push should succeed");
    assert_eq!(events[0].aggregate.resource_owner, "org-1");

    let stored = store.filter(&ctx, &build(stream(&ctx, "o1"))).await.unwrap();
    assert!(stored.iter().all(|e| e.aggregate.resource_owner == "org-1"));
}

pub async fn test_pushed_events_round_trip<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let pushed = store
        .push(
            &ctx,
            &[
                cmd(&ctx, "o1", "org.added"),
                StoreCommand::new(&ctx, "org", "o1", "org.domain.added")
                    .with_payload(json!({"domain": "x.localhost", "primary": true, "weight": 2.5}))
                    .arc(),
            ],
        )
        .await
        .expect("push should succeed");

    let stored = store.filter(&ctx, &build(stream(&ctx, "o1"))).await.unwrap();
    assert_eq!(stored, pushed);
    assert_eq!(stored[0].payload, None);
    assert_eq!(stored[1].creator, "tester");
    assert_eq!(stored[1].service, "contract");
}

pub async fn test_cancelled_push_persists_nothing<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let cancelled = ctx.clone();
    cancelled.cancel();

    let err = store
        .push(&cancelled, &[cmd(&cancelled, "o1", "org.added")])
        .await
        .unwrap_err();
    assert!(err.is_canceled(), "got {err:?}");

    // clones share the token, so read back through a live context
    let live = Context::new();
    let stored = store.filter(&live, &build(stream(&ctx, "o1"))).await.unwrap();
    assert!(stored.is_empty());
}

pub async fn test_push_after_cancelled_push<S: EventStore>(store: &S) {
    for round in 0..40 {
        let ctx = fresh_context();
        let canceller = ctx.clone();
        let cancel = tokio::spawn(async move {
            for _ in 0..round % 10 {
                tokio::task::yield_now().await;
            }
            canceller.cancel();
        });

        match store.push(&ctx, &[cmd(&ctx, "o1", "org.added")]).await {
            Ok(events) => assert_eq!(sequences(&events), vec![1]),
            Err(err) => assert!(err.is_canceled(), "round {round}: got {err:?}"),
        }
        cancel.await.expect("cancel task should finish");

        // a cancelled push must leave no open transaction behind
        let live = fresh_context();
        let events = store
            .push(&live, &[cmd(&live, "o1", "org.added")])
            .await
            .unwrap_or_else(|err| panic!("round {round}: push after cancel failed: {err:?}"));
        assert_eq!(sequences(&events), vec![1]);
    }
}

// =============================================================================
// EventStore::filter tests
// =============================================================================

pub async fn test_filter_branches_and_lists<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store
        .push(
            &ctx,
            &[
                cmd(&ctx, "o1", "org.added"),
                cmd(&ctx, "o1", "org.removed"),
                StoreCommand::new(&ctx, "user", "u1", "user.added").arc(),
                StoreCommand::new(&ctx, "user", "u2", "user.added").arc(),
            ],
        )
        .await
        .unwrap();

    let builder = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .add_query()
        .aggregate_types(["org"])
        .event_types(["org.removed"])
        .or()
        .aggregate_types(["user"])
        .aggregate_ids(["u1", "u2"])
        .builder();
    let events = store.filter(&ctx, &build(builder)).await.unwrap();
    let ids: Vec<(&str, &str)> = events
        .iter()
        .map(|e| (e.aggregate.id.as_str(), e.event_type.as_str()))
        .collect();
    assert_eq!(
        ids,
        vec![("o1", "org.removed"), ("u1", "user.added"), ("u2", "user.added")]
    );
}

pub async fn test_filter_order_limit_offset<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    push_stream(store, &ctx, "o1", 5).await;

    let desc = stream(&ctx, "o1").order_desc().limit(2);
    let events = store.filter(&ctx, &build(desc)).await.unwrap();
    assert_eq!(sequences(&events), vec![5, 4]);

    let offset = stream(&ctx, "o1").offset(3);
    let events = store.filter(&ctx, &build(offset)).await.unwrap();
    assert_eq!(sequences(&events), vec![4, 5]);

    let page = stream(&ctx, "o1").limit(2).offset(1);
    let events = store.filter(&ctx, &build(page)).await.unwrap();
    assert_eq!(sequences(&events), vec![2, 3]);
}

pub async fn test_filter_sequence_bounds<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    push_stream(store, &ctx, "o1", 5).await;

    let newer = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .add_query()
        .aggregate_ids(["o1"])
        .sequence_greater(2)
        .builder();
    let events = store.filter(&ctx, &build(newer)).await.unwrap();
    assert_eq!(sequences(&events), vec![3, 4, 5]);

    let older = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .add_query()
        .aggregate_ids(["o1"])
        .sequence_less(3)
        .builder();
    let events = store.filter(&ctx, &build(older)).await.unwrap();
    assert_eq!(sequences(&events), vec![1, 2]);

    // descending order pages backwards from the cursor
    let backwards = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .order_desc()
        .limit(2)
        .add_query()
        .aggregate_ids(["o1"])
        .sequence_greater(4)
        .builder();
    let events = store.filter(&ctx, &build(backwards)).await.unwrap();
    assert_eq!(sequences(&events), vec![3, 2]);
}

pub async fn test_filter_builder_constraints<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let before = Utc::now() - Duration::seconds(60);
    let first = store
        .push(&ctx, &[cmd(&ctx, "o1", "org.added")])
        .await
        .unwrap();

    let editor = ctx.clone().with_creator("editor");
    store
        .push(&editor, &[cmd(&editor, "o2", "org.added")])
        .await
        .unwrap();

    let by_creator = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .creator("editor")
        .add_query()
        .aggregate_types(["org"])
        .builder();
    let events = store.filter(&ctx, &build(by_creator)).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].aggregate.id, "o2");

    let after_first = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .position_after(first[0].position.global)
        .add_query()
        .aggregate_types(["org"])
        .builder();
    let events = store.filter(&ctx, &build(after_first)).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].aggregate.id, "o2");

    let recent = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .resource_owner("org-1")
        .creation_date_after(before)
        .add_query()
        .aggregate_types(["org"])
        .builder();
    assert_eq!(store.filter(&ctx, &build(recent)).await.unwrap().len(), 2);

    let foreign = SearchQueryBuilder::new(Columns::Event)
        .instance_id(ctx.instance_id())
        .resource_owner("org-2")
        .add_query()
        .aggregate_types(["org"])
        .builder();
    assert!(store.filter(&ctx, &build(foreign)).await.unwrap().is_empty());
}

pub async fn test_filter_event_data<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store
        .push(
            &ctx,
            &[
                StoreCommand::new(&ctx, "org", "o1", "org.domain.added")
                    .with_payload(json!({
                        "domain": "x.localhost",
                        "primary": true,
                        "count": 3,
                        "owner": {"kind": "org"}
                    }))
                    .arc(),
                StoreCommand::new(&ctx, "org", "o1", "org.domain.added")
                    .with_payload(json!({"domain": "y.localhost", "primary": false, "count": "3"}))
                    .arc(),
                cmd(&ctx, "o1", "org.deactivated"),
            ],
        )
        .await
        .unwrap();

    let with_data = |data: Value| {
        SearchQueryBuilder::new(Columns::Event)
            .instance_id(ctx.instance_id())
            .add_query()
            .aggregate_types(["org"])
            .event_data(data)
            .builder()
    };

    let events = store
        .filter(&ctx, &build(with_data(json!({"domain": "x.localhost"}))))
        .await
        .unwrap();
    assert_eq!(sequences(&events), vec![1]);

    let events = store
        .filter(&ctx, &build(with_data(json!({"primary": false}))))
        .await
        .unwrap();
    assert_eq!(sequences(&events), vec![2]);

    // number and string never match each other
    let events = store
        .filter(&ctx, &build(with_data(json!({"count": 3}))))
        .await
        .unwrap();
    assert_eq!(sequences(&events), vec![1]);

    let events = store
        .filter(&ctx, &build(with_data(json!({"owner": {"kind": "org"}}))))
        .await
        .unwrap();
    assert_eq!(sequences(&events), vec![1]);

    // booleans are not numbers
    for number in [json!({"primary": 1}), json!({"primary": 0})] {
        let events = store.filter(&ctx, &build(with_data(number))).await.unwrap();
        assert!(events.is_empty());
    }

    // the payload-less event contains no leaf, not even null
    let events = store
        .filter(&ctx, &build(with_data(json!({"missing": null}))))
        .await
        .unwrap();
    assert_eq!(sequences(&events), vec![1, 2]);

    // stored events evaluate in memory exactly like the backend filter
    let stored = store.filter(&ctx, &build(stream(&ctx, "o1"))).await.unwrap();
    for data in [json!({"primary": 1}), json!({"missing": null}), json!({"count": 3})] {
        let query = build(with_data(data));
        let expected = store.filter(&ctx, &query).await.unwrap();
        let matched: Vec<_> = stored
            .iter()
            .filter(|e| query.matches_event(e))
            .cloned()
            .collect();
        assert_eq!(matched, expected);
    }

    let events = store
        .filter(
            &ctx,
            &build(with_data(json!({"domain": "x.localhost", "primary": false}))),
        )
        .await
        .unwrap();
    assert!(events.is_empty());
}

// =============================================================================
// EventStore::latest_* tests
// =============================================================================

pub async fn test_latest_sequence_and_position<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let max_sequence = |columns: Columns| {
        SearchQueryBuilder::new(columns)
            .instance_id(ctx.instance_id())
            .add_query()
            .aggregate_types(["org"])
            .aggregate_ids(["o1"])
            .builder()
    };

    let empty = store
        .latest_sequence(&ctx, &build(max_sequence(Columns::MaxSequence)))
        .await
        .unwrap();
    assert_eq!(empty, 0);
    let empty = store
        .latest_position(&ctx, &build(max_sequence(Columns::MaxPosition)))
        .await
        .unwrap();
    assert_eq!(empty, Position::default());

    push_stream(store, &ctx, "o1", 2).await;
    let last = store
        .push(&ctx, &[cmd(&ctx, "o1", "org.changed"), cmd(&ctx, "o2", "org.added")])
        .await
        .unwrap();

    let latest = store
        .latest_sequence(&ctx, &build(max_sequence(Columns::MaxSequence)))
        .await
        .unwrap();
    assert_eq!(latest, 3);

    let position = store
        .latest_position(&ctx, &build(max_sequence(Columns::MaxPosition)))
        .await
        .unwrap();
    assert_eq!(position, last[0].position);
}

// =============================================================================
// Unique constraint tests
// =============================================================================

fn add_user(ctx: &Context, id: &str, username: &str) -> Arc<dyn Command> {
    StoreCommand::new(ctx, "user", id, "user.added")
        .with_unique(UniqueConstraint::add(
            "usernames",
            username,
            "Errors.User.AlreadyExists",
        ))
        .arc()
}

fn users(ctx: &Context) -> Query {
    build(
        SearchQueryBuilder::new(Columns::Event)
            .instance_id(ctx.instance_id())
            .add_query()
            .aggregate_types(["user"])
            .builder(),
    )
}

pub async fn test_unique_violation_aborts_batch<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store.push(&ctx, &[add_user(&ctx, "u1", "alice")]).await.unwrap();

    let err = store
        .push(
            &ctx,
            &[
                StoreCommand::new(&ctx, "user", "u2", "user.changed").arc(),
                add_user(&ctx, "u3", "alice"),
            ],
        )
        .await
        .unwrap_err();
    match &err {
        Error::UniqueConstraintViolation {
            unique_type,
            unique_field,
            message,
        } => {
            assert_eq!(unique_type, "usernames");
            assert_eq!(unique_field, "alice");
            assert_eq!(message, "Errors.User.AlreadyExists");
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
    assert!(err.is_already_exists());

    let stored = store.filter(&ctx, &users(&ctx)).await.unwrap();
    assert_eq!(stored.len(), 1, "failed batch must leave no events");
}

pub async fn test_unique_violation_within_batch<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let err = store
        .push(&ctx, &[add_user(&ctx, "u1", "bob"), add_user(&ctx, "u2", "bob")])
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
    assert!(store.filter(&ctx, &users(&ctx)).await.unwrap().is_empty());

    // nothing of the failed batch was kept
    store.push(&ctx, &[add_user(&ctx, "u1", "bob")]).await.unwrap();
}

pub async fn test_unique_remove_absent_is_noop<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store
        .push(
            &ctx,
            &[StoreCommand::new(&ctx, "user", "u1", "user.removed")
                .with_unique(UniqueConstraint::remove("usernames", "never-added"))
                .arc()],
        )
        .await
        .expect("removing an absent key should succeed");
}

pub async fn test_unique_remove_releases_key<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store.push(&ctx, &[add_user(&ctx, "u1", "carol")]).await.unwrap();
    store
        .push(
            &ctx,
            &[StoreCommand::new(&ctx, "user", "u1", "user.removed")
                .with_unique(UniqueConstraint::remove("usernames", "carol"))
                .arc()],
        )
        .await
        .unwrap();

    store
        .push(&ctx, &[add_user(&ctx, "u2", "carol")])
        .await
        .expect("released key should be available again");
}

pub async fn test_unique_instance_and_global_scope<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    let other = fresh_context();

    store.push(&ctx, &[add_user(&ctx, "u1", "dave")]).await.unwrap();
    store
        .push(&other, &[add_user(&other, "u1", "dave")])
        .await
        .expect("instance constraints do not collide across instances");

    let domain = format!("{}.localhost", Uuid::new_v4());
    let add_domain = |ctx: &Context| {
        StoreCommand::new(ctx, "org", "o1", "org.domain.added")
            .with_unique(UniqueConstraint::add_global(
                "domains",
                domain.as_str(),
                "Errors.Org.Domain.AlreadyExists",
            ))
            .arc()
    };
    store.push(&ctx, &[add_domain(&ctx)]).await.unwrap();
    let err = store.push(&other, &[add_domain(&other)]).await.unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
}

pub async fn test_unique_remove_instance<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store
        .push(&ctx, &[add_user(&ctx, "u1", "erin"), add_user(&ctx, "u2", "frank")])
        .await
        .unwrap();

    let remove_instance = StoreCommand::new(&ctx, "instance", ctx.instance_id(), "instance.removed")
        .with_unique(UniqueConstraint::remove_instance())
        .arc();
    store.push(&ctx, &[remove_instance.clone()]).await.unwrap();
    store
        .push(&ctx, &[remove_instance])
        .await
        .expect("repeated instance removal should succeed");

    store
        .push(&ctx, &[add_user(&ctx, "u3", "erin"), add_user(&ctx, "u4", "frank")])
        .await
        .expect("instance constraints should be gone");
}

// =============================================================================
// Search field tests
// =============================================================================

fn login_name(ctx: &Context, id: &str, name: &str) -> Arc<dyn Command> {
    StoreCommand::new(ctx, "user", id, "user.added")
        .with_field(FieldOperation::set_unique(
            FieldObject::new("user", id, 1),
            "login_name",
            json!(name),
        ))
        .with_field(FieldOperation::set(
            FieldObject::new("user", id, 1),
            "state",
            json!("active"),
        ))
        .arc()
}

pub async fn test_search_fields_lifecycle<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store
        .push(&ctx, &[login_name(&ctx, "u1", "alice"), login_name(&ctx, "u2", "bob")])
        .await
        .unwrap();

    let by_name = FieldQuery::new()
        .instance_id(ctx.instance_id())
        .object_type("user")
        .field_name("login_name")
        .value(json!("bob"));
    let fields = store.search_fields(&ctx, &by_name).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].aggregate.id, "u2");
    assert!(fields[0].unique);

    let all = FieldQuery::new().instance_id(ctx.instance_id());
    let fields = store.search_fields(&ctx, &all).await.unwrap();
    assert_eq!(fields.len(), 4);

    // upsert keeps one row per field
    store
        .push(
            &ctx,
            &[StoreCommand::new(&ctx, "user", "u1", "user.deactivated")
                .with_field(FieldOperation::set(
                    FieldObject::new("user", "u1", 1),
                    "state",
                    json!("inactive"),
                ))
                .arc()],
        )
        .await
        .unwrap();
    let state = FieldQuery::new()
        .instance_id(ctx.instance_id())
        .field_name("state")
        .aggregate_id("u1");
    let fields = store.search_fields(&ctx, &state).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].value, json!("inactive"));

    store
        .push(
            &ctx,
            &[StoreCommand::new(&ctx, "user", "u1", "user.removed")
                .with_field(FieldOperation::RemoveAggregate)
                .arc()],
        )
        .await
        .unwrap();
    let fields = store.search_fields(&ctx, &all).await.unwrap();
    assert!(fields.iter().all(|f| f.aggregate.id == "u2"));

    store
        .push(
            &ctx,
            &[StoreCommand::new(&ctx, "user", "u2", "user.changed")
                .with_field(FieldOperation::remove_object("user", "u2"))
                .arc()],
        )
        .await
        .unwrap();
    assert!(store.search_fields(&ctx, &all).await.unwrap().is_empty());
}

pub async fn test_unique_field_clash_aborts_push<S: EventStore>(store: &S) {
    let ctx = fresh_context();
    store.push(&ctx, &[login_name(&ctx, "u1", "alice")]).await.unwrap();

    let err = store
        .push(&ctx, &[login_name(&ctx, "u2", "alice")])
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
    assert_eq!(store.filter(&ctx, &users(&ctx)).await.unwrap().len(), 1);

    // same value in another instance is fine
    let other = fresh_context();
    store
        .push(&other, &[login_name(&other, "u2", "alice")])
        .await
        .unwrap();
}

/// Macro to run all EventStore tests against a store implementation.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        // push tests
        test_push_assigns_contiguous_sequences($store).await;
        println!("  test_push_assigns_contiguous_sequences: PASSED");

        test_push_interleaved_aggregates($store).await;
        println!("  test_push_interleaved_aggregates: PASSED");

        test_push_empty_batch_fails($store).await;
        println!("  test_push_empty_batch_fails: PASSED");

        test_push_inherits_first_owner($store).await;
        println!("  test_push_inherits_first_owner: PASSED");

        test_pushed_events_round_trip($store).await;
        println!("  test_pushed_events_round_trip: PASSED");

        test_cancelled_push_persists_nothing($store).await;
        println!("  test_cancelled_push_persists_nothing: PASSED");

        test_push_after_cancelled_push($store).await;
        println!("  test_push_after_cancelled_push: PASSED");

        // filter tests
        test_filter_branches_and_lists($store).await;
        println!("  test_filter_branches_and_lists: PASSED");

        test_filter_order_limit_offset($store).await;
        println!("  test_filter_order_limit_offset: PASSED");

        test_filter_sequence_bounds($store).await;
        println!("  test_filter_sequence_bounds: PASSED");

        test_filter_builder_constraints($store).await;
        println!("  test_filter_builder_constraints: PASSED");

        test_filter_event_data($store).await;
        println!("  test_filter_event_data: PASSED");

        test_latest_sequence_and_position($store).await;
        println!("  test_latest_sequence_and_position: PASSED");

        // unique constraint tests
        test_unique_violation_aborts_batch($store).await;
        println!("  test_unique_violation_aborts_batch: PASSED");

        test_unique_violation_within_batch($store).await;
        println!("  test_unique_violation_within_batch: PASSED");

        test_unique_remove_absent_is_noop($store).await;
        println!("  test_unique_remove_absent_is_noop: PASSED");

        test_unique_remove_releases_key($store).await;
        println!("  test_unique_remove_releases_key: PASSED");

        test_unique_instance_and_global_scope($store).await;
        println!("  test_unique_instance_and_global_scope: PASSED");

        test_unique_remove_instance($store).await;
        println!("  test_unique_remove_instance: PASSED");

        // search field tests
        test_search_fields_lifecycle($store).await;
        println!("  test_search_fields_lifecycle: PASSED");

        test_unique_field_clash_aborts_push($store).await;
        println!("  test_unique_field_clash_aborts_push: PASSED");
    };
}
