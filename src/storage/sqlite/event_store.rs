//! SQLite EventStore implementation.

use std::sync::Arc;

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::aggregate::Aggregate;
use crate::codec::{JsonCodec, PayloadCodec};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Command, Event, EventType, Position};
use crate::field::{FieldObject, FieldOperation, FieldQuery, SearchField};
use crate::search::Query;
use crate::storage::helpers::{
    format_timestamp, now, parse_timestamp, stamp_event, stream_key, SequencePlan, StreamHead,
};
use crate::storage::schema::{
    EventPositions, Events, Fields, UniqueConstraints, CREATE_EVENTS_TABLE,
    CREATE_EVENT_POSITIONS_TABLE, CREATE_FIELDS_TABLE, CREATE_UNIQUE_CONSTRAINTS_TABLE,
};
use crate::storage::EventStore;
use crate::unique_constraint::{UniqueConstraint, UniqueConstraintAction};

use super::query::{select_events, select_max_position, select_max_sequence};

/// SQLite implementation of EventStore.
///
/// Writers serialize on `BEGIN IMMEDIATE`; the first statement of every push
/// increments the single-row position counter, which yields the batch's
/// global position. Stream heads are read under that lock, so no isolation
/// level beyond SQLite's default is required.
pub struct SqliteEventStore {
    pool: SqlitePool,
    codec: Arc<dyn PayloadCodec>,
}

impl SqliteEventStore {
    /// Create a new SQLite event store with the JSON codec.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_codec(pool, Arc::new(JsonCodec))
    }

    pub fn with_codec(pool: SqlitePool, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { pool, codec }
    }

    /// Create tables and seed the position counter.
    pub async fn init(&self) -> Result<()> {
        for statement in [
            CREATE_EVENTS_TABLE,
            CREATE_UNIQUE_CONSTRAINTS_TABLE,
            CREATE_EVENT_POSITIONS_TABLE,
            CREATE_FIELDS_TABLE,
        ] {
            sqlx::raw_sql(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Everything a push does before COMMIT.
    async fn write_batch(
        &self,
        conn: &mut SqliteConnection,
        commands: &[Arc<dyn Command>],
    ) -> Result<Vec<Event>> {
        let global = Self::next_position(conn).await?;
        let created_at = now();

        let mut plan = SequencePlan::new();
        for command in commands {
            let key = stream_key(command.aggregate());
            if !plan.contains(&key) {
                let head = Self::stream_head(conn, command.aggregate()).await?;
                plan.insert(key, head);
            }
        }

        let mut events = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let (sequence, owner) = plan.next(command.aggregate())?;
            let in_tx_order = u32::try_from(index)
                .map_err(|_| Error::invalid_argument("STORE-Ut0pZ", "Errors.Push.TooManyEvents"))?;
            let payload = command.payload()?;
            let event = stamp_event(
                command.as_ref(),
                sequence,
                Position::new(global, in_tx_order),
                created_at,
                owner,
                payload,
            );
            self.insert_event(conn, &event).await?;

            for constraint in command.unique_constraints() {
                Self::apply_unique_constraint(conn, command.aggregate(), &constraint).await?;
            }
            for operation in command.field_operations() {
                Self::apply_field_operation(conn, &event.aggregate, operation).await?;
            }
            events.push(event);
        }
        Ok(events)
    }

    async fn next_position(conn: &mut SqliteConnection) -> Result<u64> {
        let (sql, values) = sea_query::Query::update()
            .table(EventPositions::Table)
            .value(
                EventPositions::Position,
                Expr::col(EventPositions::Position).add(1),
            )
            .and_where(Expr::col(EventPositions::Id).eq(1))
            .returning_col(EventPositions::Position)
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values).fetch_one(&mut *conn).await?;
        Ok(row.try_get::<i64, _>(0)? as u64)
    }

    async fn stream_head(conn: &mut SqliteConnection, aggregate: &Aggregate) -> Result<StreamHead> {
        let (sql, values) = sea_query::Query::select()
            .columns([Events::Sequence, Events::Owner])
            .from(Events::Table)
            .and_where(Expr::col(Events::InstanceId).eq(aggregate.instance_id.as_str()))
            .and_where(Expr::col(Events::AggregateType).eq(aggregate.aggregate_type.as_str()))
            .and_where(Expr::col(Events::AggregateId).eq(aggregate.id.as_str()))
            .order_by(Events::Sequence, Order::Desc)
            .limit(1)
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&mut *conn)
            .await?;

        // owners are inherited, so the latest event carries the first owner
        match row {
            Some(row) => {
                let latest: i64 = row.try_get(0)?;
                let owner: String = row.try_get(1)?;
                Ok(StreamHead::new(latest as u64, Some(owner), aggregate))
            }
            None => Ok(StreamHead::new(0, None, aggregate)),
        }
    }

    async fn insert_event(&self, conn: &mut SqliteConnection, event: &Event) -> Result<()> {
        let payload = event
            .payload
            .as_ref()
            .map(|value| self.codec.encode(value))
            .transpose()?;

        let (sql, values) = sea_query::Query::insert()
            .into_table(Events::Table)
            .columns(super::query::EVENT_COLUMNS)
            .values_panic([
                event.aggregate.instance_id.as_str().into(),
                event.aggregate.aggregate_type.as_str().into(),
                event.aggregate.id.as_str().into(),
                event.aggregate.version.as_str().into(),
                (event.sequence as i64).into(),
                (event.position.global as i64).into(),
                event.position.in_tx_order.into(),
                event.event_type.as_str().into(),
                i64::from(event.revision).into(),
                format_timestamp(&event.created_at).into(),
                event.creator.as_str().into(),
                event.service.as_str().into(),
                event.aggregate.resource_owner.as_str().into(),
                payload.into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *conn).await?;
        Ok(())
    }

    async fn apply_unique_constraint(
        conn: &mut SqliteConnection,
        aggregate: &Aggregate,
        constraint: &UniqueConstraint,
    ) -> Result<()> {
        let scope = constraint.scope(&aggregate.instance_id);
        let (sql, values) = match constraint.action {
            UniqueConstraintAction::Add => sea_query::Query::insert()
                .into_table(UniqueConstraints::Table)
                .columns([
                    UniqueConstraints::InstanceId,
                    UniqueConstraints::UniqueType,
                    UniqueConstraints::UniqueField,
                ])
                .values_panic([
                    scope.into(),
                    constraint.unique_type.as_str().into(),
                    constraint.unique_field.as_str().into(),
                ])
                .build_sqlx(SqliteQueryBuilder),
            UniqueConstraintAction::Remove => sea_query::Query::delete()
                .from_table(UniqueConstraints::Table)
                .and_where(Expr::col(UniqueConstraints::InstanceId).eq(scope))
                .and_where(
                    Expr::col(UniqueConstraints::UniqueType).eq(constraint.unique_type.as_str()),
                )
                .and_where(
                    Expr::col(UniqueConstraints::UniqueField).eq(constraint.unique_field.as_str()),
                )
                .build_sqlx(SqliteQueryBuilder),
            UniqueConstraintAction::InstanceRemove => sea_query::Query::delete()
                .from_table(UniqueConstraints::Table)
                .and_where(
                    Expr::col(UniqueConstraints::InstanceId).eq(aggregate.instance_id.as_str()),
                )
                .build_sqlx(SqliteQueryBuilder),
        };

        match sqlx::query_with(&sql, values).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                warn!(
                    unique_type = %constraint.unique_type,
                    unique_field = %constraint.unique_field,
                    "Unique constraint already taken"
                );
                Err(Error::UniqueConstraintViolation {
                    unique_type: constraint.unique_type.clone(),
                    unique_field: constraint.unique_field.clone(),
                    message: constraint.error_message.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_field_operation(
        conn: &mut SqliteConnection,
        aggregate: &Aggregate,
        operation: FieldOperation,
    ) -> Result<()> {
        let by_aggregate = || {
            sea_query::Query::delete()
                .from_table(Fields::Table)
                .and_where(Expr::col(Fields::InstanceId).eq(aggregate.instance_id.as_str()))
                .and_where(Expr::col(Fields::AggregateType).eq(aggregate.aggregate_type.as_str()))
                .and_where(Expr::col(Fields::AggregateId).eq(aggregate.id.as_str()))
                .to_owned()
        };

        let (sql, values) = match &operation {
            FieldOperation::Set {
                object,
                field_name,
                value,
                unique,
            } => sea_query::Query::insert()
                .into_table(Fields::Table)
                .columns([
                    Fields::InstanceId,
                    Fields::ResourceOwner,
                    Fields::AggregateType,
                    Fields::AggregateId,
                    Fields::AggregateVersion,
                    Fields::ObjectType,
                    Fields::ObjectId,
                    Fields::ObjectRevision,
                    Fields::FieldName,
                    Fields::Value,
                    Fields::ValueMustBeUnique,
                ])
                .values_panic([
                    aggregate.instance_id.as_str().into(),
                    aggregate.resource_owner.as_str().into(),
                    aggregate.aggregate_type.as_str().into(),
                    aggregate.id.as_str().into(),
                    aggregate.version.as_str().into(),
                    object.object_type.as_str().into(),
                    object.object_id.as_str().into(),
                    i32::from(object.revision).into(),
                    field_name.as_str().into(),
                    serde_json::to_string(value)?.into(),
                    (*unique).into(),
                ])
                .on_conflict(
                    OnConflict::columns([
                        Fields::InstanceId,
                        Fields::AggregateType,
                        Fields::AggregateId,
                        Fields::ObjectType,
                        Fields::ObjectId,
                        Fields::FieldName,
                    ])
                    .update_columns([
                        Fields::ResourceOwner,
                        Fields::AggregateVersion,
                        Fields::ObjectRevision,
                        Fields::Value,
                        Fields::ValueMustBeUnique,
                    ])
                    .to_owned(),
                )
                .build_sqlx(SqliteQueryBuilder),
            FieldOperation::RemoveObject {
                object_type,
                object_id,
            } => by_aggregate()
                .and_where(Expr::col(Fields::ObjectType).eq(object_type.as_str()))
                .and_where(Expr::col(Fields::ObjectId).eq(object_id.as_str()))
                .build_sqlx(SqliteQueryBuilder),
            FieldOperation::RemoveAggregate => by_aggregate().build_sqlx(SqliteQueryBuilder),
        };

        match sqlx::query_with(&sql, values).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(Error::already_exists(
                "STORE-4kZqd",
                "Errors.Field.ValueNotUnique",
            )),
            Err(err) => Err(err.into()),
        }
    }

    fn decode_event(&self, row: &SqliteRow) -> Result<Event> {
        let payload: Option<Vec<u8>> = row.try_get("payload")?;
        let payload = payload
            .map(|bytes| self.codec.decode(&bytes))
            .transpose()?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Event {
            aggregate: Aggregate {
                id: row.try_get("aggregate_id")?,
                aggregate_type: row.try_get::<String, _>("aggregate_type")?.into(),
                version: row.try_get::<String, _>("aggregate_version")?.as_str().into(),
                resource_owner: row.try_get("owner")?,
                instance_id: row.try_get("instance_id")?,
            },
            event_type: EventType::new(row.try_get::<String, _>("event_type")?),
            revision: row.try_get::<i64, _>("revision")? as u16,
            sequence: row.try_get::<i64, _>("sequence")? as u64,
            position: Position::new(
                row.try_get::<i64, _>("position")? as u64,
                row.try_get::<i64, _>("in_tx_order")? as u32,
            ),
            created_at: parse_timestamp(&created_at)?,
            creator: row.try_get("creator")?,
            service: row.try_get("service")?,
            payload,
        })
    }

    fn check_codec(&self, query: &Query) -> Result<()> {
        if query.uses_event_data() && !self.codec.is_json_text() {
            return Err(Error::invalid_argument(
                "STORE-q8Wmv",
                format!(
                    "Errors.Query.EventDataUnsupported: codec {}",
                    self.codec.name()
                ),
            ));
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn push(&self, ctx: &Context, commands: &[Arc<dyn Command>]) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Err(Error::invalid_argument(
                "STORE-Jb9rQ",
                "Errors.Push.NoCommands",
            ));
        }

        ctx.check()?;
        let mut conn = ctx.run(async { Ok::<_, Error>(self.pool.acquire().await?) }).await?;

        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        // BEGIN and COMMIT never race the context: once BEGIN ran, every exit
        // goes through COMMIT or ROLLBACK.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = ctx.run(self.write_batch(&mut *conn, commands)).await;
        let result = match result.and_then(|events| ctx.check().map(|_| events)) {
            Ok(events) => match sqlx::query("COMMIT").execute(&mut *conn).await {
                Ok(_) => Ok(events),
                Err(e) => Err(Error::from(e)),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(events) => {
                debug!(
                    event_count = events.len(),
                    position = events[0].position.global,
                    "Events committed"
                );
                Ok(events)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    debug!(error = %rollback, "Rollback after failed push");
                }
                Err(e)
            }
        }
    }

    async fn filter(&self, ctx: &Context, query: &Query) -> Result<Vec<Event>> {
        self.check_codec(query)?;
        let (sql, values) = select_events(query)?.build_sqlx(SqliteQueryBuilder);

        let rows = ctx
            .run(async { Ok::<_, Error>(sqlx::query_with(&sql, values).fetch_all(&self.pool).await?) })
            .await?;

        rows.iter().map(|row| self.decode_event(row)).collect()
    }

    async fn latest_sequence(&self, ctx: &Context, query: &Query) -> Result<u64> {
        self.check_codec(query)?;
        let (sql, values) = select_max_sequence(query)?.build_sqlx(SqliteQueryBuilder);

        let row = ctx
            .run(async { Ok::<_, Error>(sqlx::query_with(&sql, values).fetch_one(&self.pool).await?) })
            .await?;
        let max: Option<i64> = row.try_get(0)?;
        Ok(max.unwrap_or(0) as u64)
    }

    async fn latest_position(&self, ctx: &Context, query: &Query) -> Result<Position> {
        self.check_codec(query)?;
        let (sql, values) = select_max_position(query)?.build_sqlx(SqliteQueryBuilder);

        let row = ctx
            .run(async { Ok::<_, Error>(sqlx::query_with(&sql, values).fetch_optional(&self.pool).await?) })
            .await?;
        match row {
            Some(row) => Ok(Position::new(
                row.try_get::<i64, _>(0)? as u64,
                row.try_get::<i64, _>(1)? as u32,
            )),
            None => Ok(Position::default()),
        }
    }

    async fn search_fields(&self, ctx: &Context, query: &FieldQuery) -> Result<Vec<SearchField>> {
        let mut stmt = sea_query::Query::select();
        stmt.columns([
            Fields::InstanceId,
            Fields::ResourceOwner,
            Fields::AggregateType,
            Fields::AggregateId,
            Fields::AggregateVersion,
            Fields::ObjectType,
            Fields::ObjectId,
            Fields::ObjectRevision,
            Fields::FieldName,
            Fields::Value,
            Fields::ValueMustBeUnique,
        ])
        .from(Fields::Table)
        .and_where(Expr::col(Fields::InstanceId).eq(query.instance_id.as_str()));
        if let Some(object_type) = &query.object_type {
            stmt.and_where(Expr::col(Fields::ObjectType).eq(object_type.as_str()));
        }
        if let Some(field_name) = &query.field_name {
            stmt.and_where(Expr::col(Fields::FieldName).eq(field_name.as_str()));
        }
        if let Some(value) = &query.value {
            stmt.and_where(Expr::col(Fields::Value).eq(serde_json::to_string(value)?));
        }
        if let Some(aggregate_id) = &query.aggregate_id {
            stmt.and_where(Expr::col(Fields::AggregateId).eq(aggregate_id.as_str()));
        }
        stmt.order_by(Fields::AggregateId, Order::Asc)
            .order_by(Fields::ObjectId, Order::Asc)
            .order_by(Fields::FieldName, Order::Asc);
        let (sql, values) = stmt.build_sqlx(SqliteQueryBuilder);

        let rows = ctx
            .run(async { Ok::<_, Error>(sqlx::query_with(&sql, values).fetch_all(&self.pool).await?) })
            .await?;

        rows.iter()
            .map(|row| {
                let value: String = row.try_get("value")?;
                Ok(SearchField {
                    aggregate: Aggregate {
                        id: row.try_get("aggregate_id")?,
                        aggregate_type: row.try_get::<String, _>("aggregate_type")?.into(),
                        version: row
                            .try_get::<String, _>("aggregate_version")?
                            .as_str()
                            .into(),
                        resource_owner: row.try_get("resource_owner")?,
                        instance_id: row.try_get("instance_id")?,
                    },
                    object: FieldObject::new(
                        row.try_get::<String, _>("object_type")?,
                        row.try_get::<String, _>("object_id")?,
                        row.try_get::<i64, _>("object_revision")? as u8,
                    ),
                    field_name: row.try_get("field_name")?,
                    value: serde_json::from_str(&value)?,
                    unique: row.try_get("value_must_be_unique")?,
                })
            })
            .collect()
    }
}
