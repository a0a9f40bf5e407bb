//! SQLite implementation of the event store.

mod event_store;
mod query;

pub use event_store::SqliteEventStore;
