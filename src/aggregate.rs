//! Aggregate identity.
//!
//! `id + aggregate_type + instance_id` identifies one event stream. The
//! resource owner is the tenant scope copied onto every event of the stream.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v[0-9]+(\.[0-9]+){0,2}$").expect("version pattern is a valid regex")
});

/// Type of an aggregate, e.g. `"org"` or `"user"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateType(String);

impl AggregateType {
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

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AggregateType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AggregateType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Semantic version of an aggregate's event schema: `v<major>[.<minor>[.<patch>]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<()> {
        if !VERSION_PATTERN.is_match(&self.0) {
            return Err(Error::precondition_failed(
                "MODEL-luDuS",
                "Errors.Aggregate.VersionInvalid",
            ));
        }
        Ok(())
    }
}

impl Default for Version {
    fn default() -> Self {
        Self("v1".to_string())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity of a domain entity stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: String,
    pub aggregate_type: AggregateType,
    pub version: Version,
    pub resource_owner: String,
    pub instance_id: String,
}

impl Aggregate {
    /// Create an aggregate scoped to the context's resource owner and instance.
    pub fn new(
        ctx: &Context,
        id: impl Into<String>,
        aggregate_type: impl Into<AggregateType>,
        version: impl Into<Version>,
    ) -> Self {
        Self {
            id: id.into(),
            aggregate_type: aggregate_type.into(),
            version: version.into(),
            resource_owner: ctx.resource_owner().to_string(),
            instance_id: ctx.instance_id().to_string(),
        }
    }

    /// Override the resource owner taken from the context.
    pub fn with_resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = resource_owner.into();
        self
    }

    /// Override the instance taken from the context.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Structural validation performed before a push opens any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_argument(
                "MODEL-Sz8aN",
                "Errors.Aggregate.IdMissing",
            ));
        }
        if self.aggregate_type.is_empty() {
            return Err(Error::invalid_argument(
                "MODEL-Kc7uF",
                "Errors.Aggregate.TypeMissing",
            ));
        }
        self.version.validate()
    }
}
