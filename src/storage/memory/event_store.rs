//! Memory EventStore implementation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::aggregate::Aggregate;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Command, Event, Position};
use crate::field::{FieldOperation, FieldQuery, SearchField};
use crate::search::Query;
use crate::storage::helpers::{now, stamp_event, stream_key, SequencePlan, StreamHead};
use crate::storage::EventStore;
use crate::unique_constraint::{UniqueConstraint, UniqueConstraintAction};

/// `(instance_id, unique_type, unique_field)`
type UniqueKey = (String, String, String);

#[derive(Default)]
struct State {
    /// Ordered by position.
    events: Vec<Event>,
    position: u64,
    unique_constraints: HashSet<UniqueKey>,
    fields: Vec<SearchField>,
}

/// Event store keeping everything in memory.
///
/// Pushes hold the write lock for the whole batch and stage unique
/// constraints and fields on copies, so a failing batch leaves no trace.
#[derive(Default)]
pub struct MemoryEventStore {
    state: RwLock<State>,
    fail_on_push: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following push fail with a retryable error.
    pub fn set_fail_on_push(&self, fail: bool) {
        self.fail_on_push.store(fail, Ordering::SeqCst);
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn stream_head(events: &[Event], aggregate: &Aggregate) -> StreamHead {
    let key = stream_key(aggregate);
    match events
        .iter()
        .rev()
        .find(|event| stream_key(&event.aggregate) == key)
    {
        Some(latest) => StreamHead::new(
            latest.sequence,
            Some(latest.aggregate.resource_owner.clone()),
            aggregate,
        ),
        None => StreamHead::new(0, None, aggregate),
    }
}

fn apply_unique_constraint(
    uniques: &mut HashSet<UniqueKey>,
    aggregate: &Aggregate,
    constraint: &UniqueConstraint,
) -> Result<()> {
    let key = (
        constraint.scope(&aggregate.instance_id).to_string(),
        constraint.unique_type.clone(),
        constraint.unique_field.clone(),
    );
    match constraint.action {
        UniqueConstraintAction::Add => {
            if !uniques.insert(key) {
                warn!(
                    unique_type = %constraint.unique_type,
                    unique_field = %constraint.unique_field,
                    "Unique constraint already taken"
                );
                return Err(Error::UniqueConstraintViolation {
                    unique_type: constraint.unique_type.clone(),
                    unique_field: constraint.unique_field.clone(),
                    message: constraint.error_message.clone(),
                });
            }
        }
        UniqueConstraintAction::Remove => {
            uniques.remove(&key);
        }
        UniqueConstraintAction::InstanceRemove => {
            uniques.retain(|(instance_id, _, _)| *instance_id != aggregate.instance_id);
        }
    }
    Ok(())
}

fn same_aggregate(field: &SearchField, aggregate: &Aggregate) -> bool {
    field.aggregate.instance_id == aggregate.instance_id
        && field.aggregate.aggregate_type == aggregate.aggregate_type
        && field.aggregate.id == aggregate.id
}

fn apply_field_operation(
    fields: &mut Vec<SearchField>,
    aggregate: &Aggregate,
    operation: FieldOperation,
) -> Result<()> {
    match operation {
        FieldOperation::Set {
            object,
            field_name,
            value,
            unique,
        } => {
            let same_row = |field: &SearchField| {
                same_aggregate(field, aggregate)
                    && field.object.object_type == object.object_type
                    && field.object.object_id == object.object_id
                    && field.field_name == field_name
            };
            let existing = fields.iter().position(|field| same_row(field));
            let clash = unique
                && fields.iter().any(|field| {
                    field.unique
                        && !same_row(field)
                        && field.aggregate.instance_id == aggregate.instance_id
                        && field.object.object_type == object.object_type
                        && field.field_name == field_name
                        && field.value == value
                });
            if clash {
                return Err(Error::already_exists(
                    "STORE-4kZqd",
                    "Errors.Field.ValueNotUnique",
                ));
            }
            let row = SearchField {
                aggregate: aggregate.clone(),
                object,
                field_name,
                value,
                unique,
            };
            match existing {
                Some(index) => fields[index] = row,
                None => fields.push(row),
            }
        }
        FieldOperation::RemoveObject {
            object_type,
            object_id,
        } => fields.retain(|field| {
            !(same_aggregate(field, aggregate)
                && field.object.object_type == object_type
                && field.object.object_id == object_id)
        }),
        FieldOperation::RemoveAggregate => {
            fields.retain(|field| !same_aggregate(field, aggregate))
        }
    }
    Ok(())
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn push(&self, ctx: &Context, commands: &[Arc<dyn Command>]) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Err(Error::invalid_argument(
                "STORE-Jb9rQ",
                "Errors.Push.NoCommands",
            ));
        }
        ctx.check()?;
        if self.fail_on_push.load(Ordering::SeqCst) {
            return Err(Error::Retryable("injected push failure".to_string()));
        }

        let mut state = self.state.write().await;
        let global = state.position + 1;
        let created_at = now();

        let mut plan = SequencePlan::new();
        for command in commands {
            let key = stream_key(command.aggregate());
            if !plan.contains(&key) {
                plan.insert(key, stream_head(&state.events, command.aggregate()));
            }
        }

        let mut uniques = state.unique_constraints.clone();
        let mut fields = state.fields.clone();
        let mut events = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let (sequence, owner) = plan.next(command.aggregate())?;
            let in_tx_order = u32::try_from(index)
                .map_err(|_| Error::invalid_argument("STORE-Ut0pZ", "Errors.Push.TooManyEvents"))?;
            let event = stamp_event(
                command.as_ref(),
                sequence,
                Position::new(global, in_tx_order),
                created_at,
                owner,
                command.payload()?,
            );
            for constraint in command.unique_constraints() {
                apply_unique_constraint(&mut uniques, command.aggregate(), &constraint)?;
            }
            for operation in command.field_operations() {
                apply_field_operation(&mut fields, &event.aggregate, operation)?;
            }
            events.push(event);
        }
        ctx.check()?;

        state.position = global;
        state.unique_constraints = uniques;
        state.fields = fields;
        state.events.extend(events.iter().cloned());

        debug!(
            event_count = events.len(),
            position = global,
            "Events committed"
        );
        Ok(events)
    }

    async fn filter(&self, ctx: &Context, query: &Query) -> Result<Vec<Event>> {
        ctx.check()?;
        let state = self.state.read().await;
        let matching = state.events.iter().filter(|event| query.matches_event(event));

        let ordered: Vec<&Event> = if query.desc {
            matching.rev().collect()
        } else {
            matching.collect()
        };
        let limit = if query.limit == 0 {
            usize::MAX
        } else {
            query.limit as usize
        };

        Ok(ordered
            .into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_sequence(&self, ctx: &Context, query: &Query) -> Result<u64> {
        ctx.check()?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| query.matches_event(event))
            .map(|event| event.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn latest_position(&self, ctx: &Context, query: &Query) -> Result<Position> {
        ctx.check()?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| query.matches_event(event))
            .map(|event| event.position)
            .max()
            .unwrap_or_default())
    }

    async fn search_fields(&self, ctx: &Context, query: &FieldQuery) -> Result<Vec<SearchField>> {
        ctx.check()?;
        let state = self.state.read().await;
        let mut fields: Vec<SearchField> = state
            .fields
            .iter()
            .filter(|field| query.matches(field))
            .cloned()
            .collect();
        fields.sort_by(|a, b| {
            (&a.aggregate.id, &a.object.object_id, &a.field_name).cmp(&(
                &b.aggregate.id,
                &b.object.object_id,
                &b.field_name,
            ))
        });
        Ok(fields)
    }
}
