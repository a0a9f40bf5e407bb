//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Events table schema.
#[derive(Iden, Clone, Copy)]
pub enum Events {
    Table,
    #[iden = "instance_id"]
    InstanceId,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_version"]
    AggregateVersion,
    #[iden = "sequence"]
    Sequence,
    #[iden = "position"]
    Position,
    #[iden = "in_tx_order"]
    InTxOrder,
    #[iden = "event_type"]
    EventType,
    #[iden = "revision"]
    Revision,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "creator"]
    Creator,
    #[iden = "service"]
    Service,
    #[iden = "owner"]
    Owner,
    #[iden = "payload"]
    Payload,
}

/// Unique constraints table schema.
#[derive(Iden)]
pub enum UniqueConstraints {
    Table,
    #[iden = "instance_id"]
    InstanceId,
    #[iden = "unique_type"]
    UniqueType,
    #[iden = "unique_field"]
    UniqueField,
}

/// Single-row global position counter.
#[derive(Iden)]
pub enum EventPositions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "position"]
    Position,
}

/// Search fields table schema.
#[derive(Iden, Clone, Copy)]
pub enum Fields {
    Table,
    #[iden = "instance_id"]
    InstanceId,
    #[iden = "resource_owner"]
    ResourceOwner,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_version"]
    AggregateVersion,
    #[iden = "object_type"]
    ObjectType,
    #[iden = "object_id"]
    ObjectId,
    #[iden = "object_revision"]
    ObjectRevision,
    #[iden = "field_name"]
    FieldName,
    #[iden = "value"]
    Value,
    #[iden = "value_must_be_unique"]
    ValueMustBeUnique,
}

/// SQL for creating the events table.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    instance_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    aggregate_version TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    position INTEGER NOT NULL,
    in_tx_order INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    revision INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    creator TEXT NOT NULL,
    service TEXT NOT NULL,
    owner TEXT NOT NULL,
    payload BLOB,
    PRIMARY KEY (instance_id, aggregate_type, aggregate_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_events_position ON events(position, in_tx_order);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(instance_id, aggregate_type, event_type);
"#;

/// SQL for creating the unique constraints table.
pub const CREATE_UNIQUE_CONSTRAINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS unique_constraints (
    instance_id TEXT NOT NULL,
    unique_type TEXT NOT NULL,
    unique_field TEXT NOT NULL,
    PRIMARY KEY (instance_id, unique_type, unique_field)
);
"#;

/// SQL for creating and seeding the position counter.
pub const CREATE_EVENT_POSITIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event_positions (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    position INTEGER NOT NULL
);

INSERT OR IGNORE INTO event_positions (id, position) VALUES (1, 0);
"#;

/// SQL for creating the search fields table.
pub const CREATE_FIELDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fields (
    instance_id TEXT NOT NULL,
    resource_owner TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    aggregate_version TEXT NOT NULL,
    object_type TEXT NOT NULL,
    object_id TEXT NOT NULL,
    object_revision INTEGER NOT NULL,
    field_name TEXT NOT NULL,
    value TEXT NOT NULL,
    value_must_be_unique INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (instance_id, aggregate_type, aggregate_id, object_type, object_id, field_name)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_fields_unique_value
    ON fields(instance_id, object_type, field_name, value)
    WHERE value_must_be_unique = 1;
"#;
