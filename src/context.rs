//! Request context.
//!
//! Carries the ambient identity of a request (instance, resource owner,
//! acting user, originating service) together with a cancellation token.
//! Aggregates and events read their defaults from it at construction time.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Ambient request data passed to every engine entry point.
#[derive(Debug, Clone, Default)]
pub struct Context {
    instance_id: String,
    resource_owner: String,
    creator: String,
    service: String,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn with_resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = resource_owner.into();
        self
    }

    /// Set the acting user recorded as creator of pushed events.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Set the originating service tag.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Replace the cancellation token, e.g. with a child of a request-wide token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn resource_owner(&self) -> &str {
        &self.resource_owner
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel this context and every clone sharing its token.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fail with [`Error::Canceled`] if the context was canceled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }

    /// Run `fut` unless the context gets canceled first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(Error::Canceled),
            result = fut => result,
        }
    }
}
