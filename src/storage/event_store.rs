//! EventStore trait definition.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::event::{Command, Event, Position};
use crate::field::{FieldQuery, SearchField};
use crate::search::Query;

/// Interface for event persistence.
///
/// The `(instance_id, aggregate_type, aggregate_id, sequence)` tuple forms
/// the unique key for stored events.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `MemoryEventStore`: in-process storage
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of commands in one transaction.
    ///
    /// Sequences continue each aggregate's stream in submission order, all
    /// events share one global position, unique constraints and field
    /// operations are applied. Either every event is persisted or none.
    async fn push(&self, ctx: &Context, commands: &[Arc<dyn Command>]) -> Result<Vec<Event>>;

    /// Events matching `query`, ordered by position.
    async fn filter(&self, ctx: &Context, query: &Query) -> Result<Vec<Event>>;

    /// Highest sequence of the events matching `query`, 0 if there are none.
    async fn latest_sequence(&self, ctx: &Context, query: &Query) -> Result<u64>;

    /// Highest position of the events matching `query`, the zero position if
    /// there are none.
    async fn latest_position(&self, ctx: &Context, query: &Query) -> Result<Position>;

    /// Stored search fields matching `query`.
    async fn search_fields(&self, ctx: &Context, query: &FieldQuery) -> Result<Vec<SearchField>>;
}
