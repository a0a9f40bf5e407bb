//! Events and commands.
//!
//! A [`Command`] is a proposed, unpersisted event. It becomes an [`Event`]
//! only through a push, which stamps sequence, position and creation date.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::Aggregate;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::field::FieldOperation;
use crate::unique_constraint::UniqueConstraint;

/// Type of an event, e.g. `"org.added"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Store-wide ordering token.
///
/// All events of one push share `global`; `in_tx_order` is the submission
/// index within that push.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub global: u64,
    pub in_tx_order: u32,
}

impl Position {
    pub fn new(global: u64, in_tx_order: u32) -> Self {
        Self {
            global,
            in_tx_order,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.global, self.in_tx_order)
    }
}

/// An immutable, sequenced fact read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub aggregate: Aggregate,
    pub event_type: EventType,
    pub revision: u16,
    /// Per-aggregate sequence, starting at 1. Zero for pending events.
    pub sequence: u64,
    pub position: Position,
    pub created_at: DateTime<Utc>,
    pub creator: String,
    pub service: String,
    pub payload: Option<Value>,
}

impl Event {
    /// Build the not-yet-persisted view of a command.
    ///
    /// Used to expose commands of the current preparation run to later
    /// validations as if they were already committed.
    pub fn pending(command: &dyn Command) -> Result<Self> {
        let base = command.base();
        Ok(Self {
            aggregate: base.aggregate.clone(),
            event_type: base.event_type.clone(),
            revision: base.revision,
            sequence: 0,
            position: Position::default(),
            created_at: Utc::now(),
            creator: base.creator.clone(),
            service: base.service.clone(),
            payload: command.payload()?,
        })
    }

    /// True for events built from commands that were not pushed yet.
    pub fn is_pending(&self) -> bool {
        self.sequence == 0
    }

    /// Deserialize the payload into `T`. A missing payload reads as `null`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.payload.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

/// Shared fields of every command, held by value inside concrete commands.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseEvent {
    pub aggregate: Aggregate,
    pub event_type: EventType,
    pub revision: u16,
    pub creator: String,
    pub service: String,
}

impl BaseEvent {
    /// Capture actor and originating service from the context at
    /// construction time, not at persist time.
    pub fn new_for_push(
        ctx: &Context,
        aggregate: &Aggregate,
        event_type: impl Into<EventType>,
    ) -> Self {
        Self {
            aggregate: aggregate.clone(),
            event_type: event_type.into(),
            revision: 1,
            creator: ctx.creator().to_string(),
            service: ctx.service().to_string(),
        }
    }

    pub fn with_revision(mut self, revision: u16) -> Self {
        self.revision = revision;
        self
    }
}

/// A proposed event waiting to be pushed.
pub trait Command: Send + Sync + 'static {
    fn base(&self) -> &BaseEvent;

    /// Serializable payload of the event, `None` for payload-less events.
    fn payload(&self) -> Result<Option<Value>>;

    fn unique_constraints(&self) -> Vec<UniqueConstraint> {
        Vec::new()
    }

    fn field_operations(&self) -> Vec<FieldOperation> {
        Vec::new()
    }

    fn aggregate(&self) -> &Aggregate {
        &self.base().aggregate
    }

    fn event_type(&self) -> &EventType {
        &self.base().event_type
    }

    fn creator(&self) -> &str {
        &self.base().creator
    }

    fn revision(&self) -> u16 {
        self.base().revision
    }
}

impl fmt::Debug for dyn Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("aggregate", self.aggregate())
            .field("event_type", self.event_type())
            .field("creator", &self.creator())
            .finish_non_exhaustive()
    }
}

/// Serialize a payload struct for [`Command::payload`].
pub fn payload_of<T: Serialize>(data: &T) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(data)?))
}

/// Structural checks run on every command before a push opens I/O.
pub fn validate_command(command: &dyn Command) -> Result<()> {
    command.aggregate().validate()?;
    if command.event_type().is_empty() {
        return Err(Error::invalid_argument(
            "EVENT-x7Pq2",
            "Errors.Event.TypeMissing",
        ));
    }
    Ok(())
}
