//! Eventstore facade.
//!
//! Ties a storage backend to the subscription registry and exposes the
//! engine entry points: prepare, push, filter and the scalar queries.
//!
//! # Example
//!
//! ```ignore
//! let es = Eventstore::in_memory();
//! let events = es
//!     .prepare_and_push(&ctx, vec![add_org(&ctx, "o1", "ACME")])
//!     .await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use backon::ExponentialBuilder;
use tracing::{debug, info};

use crate::config::{Config, RetryConfig};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{validate_command, Command, Event, Position};
use crate::field::{FieldQuery, SearchField};
use crate::preparation::{prepare_commands, EventFilter, Validation};
use crate::reducer::{QueryReducer, Reducer};
use crate::search::{Columns, Query, SearchQueryBuilder};
use crate::storage::{init_storage, EventStore, MemoryEventStore};
use crate::subscription::{Interest, Subscription, SubscriptionRegistry};

/// Event store engine. Clones share backend and subscriptions.
#[derive(Clone)]
pub struct Eventstore {
    store: Arc<dyn EventStore>,
    subscriptions: SubscriptionRegistry,
    retry: RetryConfig,
}

impl Eventstore {
    pub fn new(store: Arc<dyn EventStore>, subscriptions: SubscriptionRegistry) -> Self {
        Self {
            store,
            subscriptions,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the backoff policy used by [`Self::retry_backoff`].
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Engine over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryEventStore::new()),
            SubscriptionRegistry::default(),
        )
    }

    /// Build backend and registry from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = init_storage(&config.storage).await?;
        let subscriptions = SubscriptionRegistry::new(config.subscriptions.queue_capacity);
        Ok(Self::new(store, subscriptions).with_retry(config.retry.clone()))
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Configured backoff for [`crate::utils::retry::prepare_and_push_with_retry`].
    pub fn retry_backoff(&self) -> ExponentialBuilder {
        self.retry.backoff()
    }

    /// Persist a batch atomically and notify subscribers.
    #[tracing::instrument(
        name = "eventstore.push",
        skip_all,
        fields(instance_id = %ctx.instance_id(), command_count = commands.len())
    )]
    pub async fn push(&self, ctx: &Context, commands: Vec<Arc<dyn Command>>) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Err(Error::invalid_argument(
                "EVENT-0wbYa",
                "Errors.Push.NoCommands",
            ));
        }
        for command in &commands {
            validate_command(command.as_ref())?;
        }
        ctx.check()?;

        let events = self.store.push(ctx, &commands).await?;
        if let Some(first) = events.first() {
            info!(
                event_count = events.len(),
                position = first.position.global,
                "Events pushed"
            );
        }
        self.subscriptions.notify(&events);
        Ok(events)
    }

    /// Run validations and create steps against this store.
    #[tracing::instrument(name = "eventstore.prepare", skip_all, fields(instance_id = %ctx.instance_id()))]
    pub async fn prepare(
        &self,
        ctx: &Context,
        validations: Vec<Validation>,
    ) -> Result<Vec<Arc<dyn Command>>> {
        let filter: Arc<dyn EventFilter> = Arc::new(self.clone());
        prepare_commands(ctx, filter, validations).await
    }

    pub async fn prepare_and_push(
        &self,
        ctx: &Context,
        validations: Vec<Validation>,
    ) -> Result<Vec<Event>> {
        let commands = self.prepare(ctx, validations).await?;
        self.push(ctx, commands).await
    }

    /// Events matching `builder`, which must select [`Columns::Event`].
    #[tracing::instrument(name = "eventstore.filter", skip_all, fields(instance_id = %ctx.instance_id()))]
    pub async fn filter(&self, ctx: &Context, builder: SearchQueryBuilder) -> Result<Vec<Event>> {
        let query = self.query(ctx, builder, Columns::Event)?;
        let events = self.store.filter(ctx, &query).await?;
        debug!(event_count = events.len(), "Events filtered");
        Ok(events)
    }

    /// Highest sequence matching `builder`, which must select
    /// [`Columns::MaxSequence`].
    pub async fn latest_sequence(&self, ctx: &Context, builder: SearchQueryBuilder) -> Result<u64> {
        let query = self.query(ctx, builder, Columns::MaxSequence)?;
        self.store.latest_sequence(ctx, &query).await
    }

    /// Highest position matching `builder`, which must select
    /// [`Columns::MaxPosition`].
    pub async fn latest_position(
        &self,
        ctx: &Context,
        builder: SearchQueryBuilder,
    ) -> Result<Position> {
        let query = self.query(ctx, builder, Columns::MaxPosition)?;
        self.store.latest_position(ctx, &query).await
    }

    /// Filter, then append to and reduce `reducer`.
    pub async fn filter_to_reducer<R>(
        &self,
        ctx: &Context,
        builder: SearchQueryBuilder,
        reducer: &mut R,
    ) -> Result<()>
    where
        R: Reducer + ?Sized,
    {
        let events = self.filter(ctx, builder).await?;
        reducer.append_events(events);
        reducer.reduce()
    }

    /// Like [`Self::filter_to_reducer`] with the reducer's own query.
    pub async fn filter_to_query_reducer<R>(&self, ctx: &Context, reducer: &mut R) -> Result<()>
    where
        R: QueryReducer + ?Sized,
    {
        let builder = reducer.query();
        self.filter_to_reducer(ctx, builder, reducer).await
    }

    /// Stored search fields. An unscoped query uses the context instance.
    pub async fn search_fields(
        &self,
        ctx: &Context,
        mut query: FieldQuery,
    ) -> Result<Vec<SearchField>> {
        if query.instance_id.is_empty() {
            query.instance_id = ctx.instance_id().to_string();
        }
        self.store.search_fields(ctx, &query).await
    }

    pub fn subscribe(&self, interest: Interest) -> Subscription {
        self.subscriptions.subscribe(interest)
    }

    fn query(&self, ctx: &Context, builder: SearchQueryBuilder, columns: Columns) -> Result<Query> {
        ctx.check()?;
        if builder.get_columns() != columns {
            return Err(Error::precondition_failed(
                "EVENT-Xq2ea",
                format!(
                    "Errors.Query.InvalidColumns: expected {columns:?}, got {:?}",
                    builder.get_columns()
                ),
            ));
        }
        builder.scoped_to(ctx).build()
    }
}

#[async_trait]
impl EventFilter for Eventstore {
    async fn filter(&self, ctx: &Context, query: SearchQueryBuilder) -> Result<Vec<Event>> {
        Eventstore::filter(self, ctx, query).await
    }
}
