//! IAM Eventstore - event-sourcing core
//!
//! Aggregates append events through an atomic, optimistically concurrent
//! push. Commands are prepared against a transaction-local view of the
//! store, write models are rebuilt by reducing filtered events, and
//! subscribers receive every persisted event after commit.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod eventstore;
pub mod field;
pub mod mapper;
pub mod preparation;
pub mod reducer;
pub mod search;
pub mod storage;
pub mod subscription;
pub mod unique_constraint;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use aggregate::{Aggregate, AggregateType, Version};
pub use context::Context;
pub use error::{Error, ErrorKind, Result};
pub use event::{BaseEvent, Command, Event, EventType, Position};
pub use eventstore::Eventstore;
pub use field::{FieldObject, FieldOperation, FieldQuery, SearchField};
pub use mapper::EventRegistry;
pub use preparation::{create_commands, validation, CreateCommands, EventFilter, Validation};
pub use reducer::{QueryReducer, ReadModel, Reducer, WriteModel};
pub use search::{Columns, SearchQuery, SearchQueryBuilder};
pub use subscription::{Interest, Subscription, SubscriptionRegistry};
pub use unique_constraint::UniqueConstraint;
