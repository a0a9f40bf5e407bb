//! Command preparation.
//!
//! A [`Validation`] checks input shape without I/O and yields a
//! [`CreateCommands`] step. [`prepare_commands`] runs every validation, then
//! every create step in order. Each create step reads through a
//! [`TransactionFilter`] that overlays the commands produced so far onto the
//! durable store, so later steps see earlier ones before anything is pushed.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Command, Event};
use crate::search::SearchQueryBuilder;

/// Read access to events, as seen by a create step.
#[async_trait]
pub trait EventFilter: Send + Sync {
    async fn filter(&self, ctx: &Context, query: SearchQueryBuilder) -> Result<Vec<Event>>;
}

/// Second stage of a validation: build commands against current state.
pub type CreateCommands = Box<
    dyn FnOnce(Context, Arc<dyn EventFilter>) -> BoxFuture<'static, Result<Vec<Arc<dyn Command>>>>
        + Send,
>;

/// First stage: synchronous input checks. `Ok(None)` means nothing to do.
pub type Validation = Box<dyn FnOnce() -> Result<Option<CreateCommands>> + Send>;

pub fn validation<F>(validate: F) -> Validation
where
    F: FnOnce() -> Result<Option<CreateCommands>> + Send + 'static,
{
    Box::new(validate)
}

pub fn create_commands<F, Fut>(create: F) -> CreateCommands
where
    F: FnOnce(Context, Arc<dyn EventFilter>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<Arc<dyn Command>>>> + Send + 'static,
{
    Box::new(move |ctx, filter| Box::pin(create(ctx, filter)))
}

/// Run validations, then create steps, and return the ordered batch.
///
/// Fails with [`Error::NotExecutable`] if no validation produced a create
/// step. Any error aborts the whole batch.
pub async fn prepare_commands(
    ctx: &Context,
    filter: Arc<dyn EventFilter>,
    validations: Vec<Validation>,
) -> Result<Vec<Arc<dyn Command>>> {
    let mut creators = Vec::with_capacity(validations.len());
    for validate in validations {
        if let Some(create) = validate()? {
            creators.push(create);
        }
    }
    if creators.is_empty() {
        return Err(Error::NotExecutable);
    }

    let mut commands: Vec<Arc<dyn Command>> = Vec::new();
    for create in creators {
        ctx.check()?;
        let overlay = TransactionFilter::new(Arc::clone(&filter), commands.clone());
        let created = create(ctx.clone(), Arc::new(overlay)).await?;
        commands.extend(created);
    }

    debug!(command_count = commands.len(), "Commands prepared");
    Ok(commands)
}

/// Filter that appends matching, not yet pushed commands to durable results.
///
/// Every read re-matches all pending commands, which is quadratic in the
/// batch size.
pub struct TransactionFilter {
    inner: Arc<dyn EventFilter>,
    pending: Vec<Arc<dyn Command>>,
}

impl TransactionFilter {
    pub fn new(inner: Arc<dyn EventFilter>, pending: Vec<Arc<dyn Command>>) -> Self {
        Self { inner, pending }
    }
}

#[async_trait]
impl EventFilter for TransactionFilter {
    async fn filter(&self, ctx: &Context, query: SearchQueryBuilder) -> Result<Vec<Event>> {
        let query = query.scoped_to(ctx);
        let mut events = self.inner.filter(ctx, query.clone()).await?;
        if self.pending.is_empty() {
            return Ok(events);
        }
        for command in query.matches(&self.pending)? {
            events.push(Event::pending(command.as_ref())?);
        }
        Ok(events)
    }
}
