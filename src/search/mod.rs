//! Search query builder.
//!
//! ```ignore
//! let query = SearchQueryBuilder::new(Columns::Event)
//!     .resource_owner("org-1")
//!     .add_query()
//!     .aggregate_types(["org"])
//!     .aggregate_ids(["o1"])
//!     .or()
//!     .aggregate_types(["user"])
//!     .event_types(["user.added"])
//!     .builder();
//! ```
//!
//! Builder-level constraints apply to every branch; branch setters AND
//! within their branch; branches OR with each other. The built [`Query`] is
//! evaluated either by a storage backend or in memory via [`Query::matches`],
//! with identical semantics.

mod filter;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::aggregate::AggregateType;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Command, EventType};

pub use filter::{Columns, Filter, FilterField, FilterValue, Operation, Query, Subject};
pub(crate) use filter::{data_leaves, json_path};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQueryBuilder {
    columns: Columns,
    limit: u64,
    offset: u64,
    desc: bool,
    resource_owner: Option<String>,
    instance_id: Option<String>,
    instance_ids: Vec<String>,
    creator: Option<String>,
    creation_date_after: Option<DateTime<Utc>>,
    position_after: Option<u64>,
    queries: Vec<QueryClause>,
}

/// Predicates of one OR-branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryClause {
    aggregate_types: Vec<AggregateType>,
    aggregate_ids: Vec<String>,
    event_types: Vec<EventType>,
    sequence_greater: Option<u64>,
    sequence_less: Option<u64>,
    event_data: Option<Value>,
}

impl SearchQueryBuilder {
    pub fn new(columns: Columns) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn columns(mut self, columns: Columns) -> Self {
        self.columns = columns;
        self
    }

    /// Zero means unlimited.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn order_asc(mut self) -> Self {
        self.desc = false;
        self
    }

    pub fn order_desc(mut self) -> Self {
        self.desc = true;
        self
    }

    pub fn resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = Some(resource_owner.into());
        self
    }

    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Restrict to any of several instances. Combined with `instance_id`
    /// both constraints must hold.
    pub fn instance_ids<I, S>(mut self, instance_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instance_ids = instance_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn creation_date_after(mut self, after: DateTime<Utc>) -> Self {
        self.creation_date_after = Some(after);
        self
    }

    /// Only events of pushes with a global position above `position`.
    pub fn position_after(mut self, position: u64) -> Self {
        self.position_after = Some(position);
        self
    }

    /// Open a new OR-branch.
    pub fn add_query(self) -> SearchQuery {
        SearchQuery {
            builder: self,
            clause: QueryClause::default(),
        }
    }

    pub fn get_columns(&self) -> Columns {
        self.columns
    }

    pub fn get_instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Scope an unscoped builder to the context's instance.
    pub(crate) fn scoped_to(mut self, ctx: &Context) -> Self {
        if self.instance_id.is_none() && self.instance_ids.is_empty() && !ctx.instance_id().is_empty()
        {
            self.instance_id = Some(ctx.instance_id().to_string());
        }
        self
    }

    /// Validate and flatten into a [`Query`].
    pub fn build(&self) -> Result<Query> {
        if self.queries.is_empty() {
            return Err(Error::precondition_failed(
                "MODEL-4m9gs",
                "Errors.Query.NoQueries",
            ));
        }

        let global = self.global_filters();
        let mut branches = Vec::with_capacity(self.queries.len());
        for clause in &self.queries {
            let mut branch = clause.filters(self.desc)?;
            branch.extend(global.iter().cloned());
            for filter in &branch {
                filter.validate()?;
            }
            branches.push(branch);
        }

        Ok(Query {
            columns: self.columns,
            desc: self.desc,
            limit: self.limit,
            offset: self.offset,
            branches,
        })
    }

    /// Commands of `commands` the query would select once persisted.
    pub fn matches(&self, commands: &[Arc<dyn Command>]) -> Result<Vec<Arc<dyn Command>>> {
        let query = self.build()?;
        let mut matched = Vec::new();
        for command in commands {
            if query.matches_command(command.as_ref())? {
                matched.push(Arc::clone(command));
            }
        }
        Ok(matched)
    }

    fn global_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(owner) = self.resource_owner.as_ref().filter(|o| !o.is_empty()) {
            filters.push(Filter::new(
                FilterField::ResourceOwner,
                FilterValue::Text(owner.clone()),
                Operation::Equals,
            ));
        }
        if let Some(instance_id) = &self.instance_id {
            filters.push(Filter::new(
                FilterField::InstanceId,
                FilterValue::Text(instance_id.clone()),
                Operation::Equals,
            ));
        }
        filters.extend(Filter::text(FilterField::InstanceId, self.instance_ids.clone()));
        if let Some(creator) = self.creator.as_ref().filter(|c| !c.is_empty()) {
            filters.push(Filter::new(
                FilterField::Creator,
                FilterValue::Text(creator.clone()),
                Operation::Equals,
            ));
        }
        if let Some(after) = self.creation_date_after {
            filters.push(Filter::new(
                FilterField::CreationDate,
                FilterValue::Time(after),
                Operation::Greater,
            ));
        }
        if let Some(position) = self.position_after {
            filters.push(Filter::new(
                FilterField::Position,
                FilterValue::Unsigned(position),
                Operation::Greater,
            ));
        }
        filters
    }
}

impl QueryClause {
    fn filters(&self, desc: bool) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();
        filters.extend(Filter::text(
            FilterField::AggregateType,
            self.aggregate_types.iter().map(|t| t.to_string()).collect(),
        ));
        filters.extend(Filter::text(
            FilterField::AggregateId,
            self.aggregate_ids.clone(),
        ));
        filters.extend(Filter::text(
            FilterField::EventType,
            self.event_types.iter().map(|t| t.to_string()).collect(),
        ));
        if let Some(sequence) = self.sequence_greater {
            // descending order pages backwards from the cursor
            let operation = if desc {
                Operation::Less
            } else {
                Operation::Greater
            };
            filters.push(Filter::new(
                FilterField::Sequence,
                FilterValue::Unsigned(sequence),
                operation,
            ));
        }
        if let Some(sequence) = self.sequence_less {
            filters.push(Filter::new(
                FilterField::Sequence,
                FilterValue::Unsigned(sequence),
                Operation::Less,
            ));
        }
        if let Some(data) = &self.event_data {
            filters.push(Filter::new(
                FilterField::EventData,
                FilterValue::Data(data_object(data)?),
                Operation::JsonContains,
            ));
        }
        Ok(filters)
    }
}

fn data_object(data: &Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(Error::precondition_failed(
            "MODEL-Xq3o1",
            "Errors.Query.EventDataNotAnObject",
        )),
    }
}

/// One OR-branch under construction.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    builder: SearchQueryBuilder,
    clause: QueryClause,
}

impl SearchQuery {
    pub fn aggregate_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AggregateType>,
    {
        self.clause.aggregate_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn aggregate_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clause.aggregate_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn event_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.clause.event_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Events after `sequence`, or before it when the builder sorts
    /// descending.
    pub fn sequence_greater(mut self, sequence: u64) -> Self {
        self.clause.sequence_greater = Some(sequence);
        self
    }

    pub fn sequence_less(mut self, sequence: u64) -> Self {
        self.clause.sequence_less = Some(sequence);
        self
    }

    /// Payload must contain every leaf of `data`, an object without arrays.
    pub fn event_data(mut self, data: Value) -> Self {
        self.clause.event_data = Some(data);
        self
    }

    /// Close this branch and open the next.
    pub fn or(self) -> SearchQuery {
        self.builder().add_query()
    }

    /// Close this branch.
    pub fn builder(mut self) -> SearchQueryBuilder {
        self.builder.queries.push(self.clause);
        self.builder
    }
}
