//! Write and read model reduction.
//!
//! Domain models hold a [`WriteModel`] or [`ReadModel`] by value, fold the
//! buffered events into their own fields in [`Reducer::reduce`], then call
//! the base `reduce` to advance the bookkeeping and drop the buffer.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::{Event, Position};
use crate::search::SearchQueryBuilder;

/// Accumulates events and folds them into state.
pub trait Reducer: Send {
    fn append_events(&mut self, events: Vec<Event>);

    /// Fold the buffered events. Input must be a fresh slice in stream order.
    fn reduce(&mut self) -> Result<()>;
}

/// A reducer that knows which events it needs.
pub trait QueryReducer: Reducer {
    fn query(&self) -> SearchQueryBuilder;
}

/// Command-side projection base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteModel {
    pub aggregate_id: String,
    pub resource_owner: String,
    pub instance_id: String,
    pub processed_sequence: u64,
    pub change_date: Option<DateTime<Utc>>,
    /// Buffered, not yet reduced events.
    pub events: Vec<Event>,
}

impl WriteModel {
    pub fn new(aggregate_id: impl Into<String>, resource_owner: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            ..Self::default()
        }
    }

    /// True once at least one event was reduced.
    pub fn exists(&self) -> bool {
        self.processed_sequence > 0 || self.change_date.is_some()
    }
}

impl Reducer for WriteModel {
    fn append_events(&mut self, events: Vec<Event>) {
        self.events.extend(events);
    }

    fn reduce(&mut self) -> Result<()> {
        let (Some(first), Some(last)) = (self.events.first(), self.events.last()) else {
            return Ok(());
        };
        if self.aggregate_id.is_empty() {
            self.aggregate_id = first.aggregate.id.clone();
        }
        if self.resource_owner.is_empty() {
            self.resource_owner = first.aggregate.resource_owner.clone();
        }
        if self.instance_id.is_empty() {
            self.instance_id = first.aggregate.instance_id.clone();
        }
        self.processed_sequence = last.sequence;
        self.change_date = Some(last.created_at);
        self.events.clear();
        Ok(())
    }
}

/// Query-side projection base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModel {
    pub aggregate_id: String,
    pub resource_owner: String,
    pub instance_id: String,
    pub processed_sequence: u64,
    pub creation_date: Option<DateTime<Utc>>,
    pub change_date: Option<DateTime<Utc>>,
    pub position: Position,
    pub events: Vec<Event>,
}

impl Reducer for ReadModel {
    fn append_events(&mut self, events: Vec<Event>) {
        self.events.extend(events);
    }

    fn reduce(&mut self) -> Result<()> {
        let (Some(first), Some(last)) = (self.events.first(), self.events.last()) else {
            return Ok(());
        };
        if self.aggregate_id.is_empty() {
            self.aggregate_id = first.aggregate.id.clone();
        }
        if self.resource_owner.is_empty() {
            self.resource_owner = first.aggregate.resource_owner.clone();
        }
        if self.instance_id.is_empty() {
            self.instance_id = first.aggregate.instance_id.clone();
        }
        if self.creation_date.is_none() {
            self.creation_date = Some(first.created_at);
        }
        self.processed_sequence = last.sequence;
        self.change_date = Some(last.created_at);
        self.position = last.position;
        self.events.clear();
        Ok(())
    }
}
