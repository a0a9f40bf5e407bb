//! Test utilities: a generic command and event fixtures.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::aggregate::Aggregate;
use crate::context::Context;
use crate::error::Result;
use crate::event::{BaseEvent, Command, Event, Position};
use crate::field::FieldOperation;
use crate::unique_constraint::UniqueConstraint;

pub const TEST_INSTANCE: &str = "instance";
pub const TEST_OWNER: &str = "org-1";

pub fn test_context() -> Context {
    Context::new()
        .with_instance_id(TEST_INSTANCE)
        .with_resource_owner(TEST_OWNER)
        .with_creator("tester")
        .with_service("test")
}

/// Command with freely configurable payload and side effects.
#[derive(Debug, Clone)]
pub struct TestCommand {
    base: BaseEvent,
    payload: Option<Value>,
    unique_constraints: Vec<UniqueConstraint>,
    field_operations: Vec<FieldOperation>,
}

impl TestCommand {
    pub fn new(aggregate_type: &str, id: &str, event_type: &str) -> Self {
        Self::in_context(&test_context(), aggregate_type, id, event_type)
    }

    pub fn in_context(ctx: &Context, aggregate_type: &str, id: &str, event_type: &str) -> Self {
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

    pub fn with_unique_constraint(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    pub fn with_field_operation(mut self, operation: FieldOperation) -> Self {
        self.field_operations.push(operation);
        self
    }

    pub fn into_arc(self) -> Arc<dyn Command> {
        Arc::new(self)
    }
}

impl Command for TestCommand {
    fn base(&self) -> &BaseEvent {
        &self.base
    }

    fn payload(&self) -> Result<Option<Value>> {
        Ok(self.payload.clone())
    }

    fn unique_constraints(&self) -> Vec<UniqueConstraint> {
        self.unique_constraints.clone()
    }

    fn field_operations(&self) -> Vec<FieldOperation> {
        self.field_operations.clone()
    }
}

/// The event `command` would become at `sequence` in push `global`.
pub fn persisted(command: TestCommand, sequence: u64, global: u64) -> Event {
    Event {
        aggregate: command.base.aggregate.clone(),
        event_type: command.base.event_type.clone(),
        revision: command.base.revision,
        sequence,
        position: Position::new(global, 0),
        created_at: Utc::now(),
        creator: command.base.creator.clone(),
        service: command.base.service.clone(),
        payload: command.payload,
    }
}
