//! Shared storage helper functions.
//!
//! Common logic for sequence assignment, event stamping and timestamp
//! handling used across storage backend implementations.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;

use crate::aggregate::Aggregate;
use crate::error::{Error, Result};
use crate::event::{Command, Event, Position};

/// `(instance_id, aggregate_type, aggregate_id)` of one event stream.
pub type StreamKey = (String, String, String);

pub fn stream_key(aggregate: &Aggregate) -> StreamKey {
    (
        aggregate.instance_id.clone(),
        aggregate.aggregate_type.to_string(),
        aggregate.id.clone(),
    )
}

/// Head of a stream as seen inside the push transaction.
#[derive(Debug, Clone)]
pub struct StreamHead {
    pub next_sequence: u64,
    /// Resource owner of the stream's first event.
    pub owner: String,
}

impl StreamHead {
    pub fn new(latest_sequence: u64, first_owner: Option<String>, aggregate: &Aggregate) -> Self {
        Self {
            next_sequence: latest_sequence + 1,
            owner: first_owner.unwrap_or_else(|| aggregate.resource_owner.clone()),
        }
    }
}

/// Sequence assignment for one push.
///
/// Backends look up each stream's head once, under their write lock, then
/// stamp commands in submission order.
#[derive(Debug, Default)]
pub struct SequencePlan {
    heads: HashMap<StreamKey, StreamHead>,
}

impl SequencePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.heads.contains_key(key)
    }

    pub fn insert(&mut self, key: StreamKey, head: StreamHead) {
        self.heads.insert(key, head);
    }

    /// Take the next sequence of the command's stream.
    pub fn next(&mut self, aggregate: &Aggregate) -> Result<(u64, String)> {
        let head = self
            .heads
            .get_mut(&stream_key(aggregate))
            .ok_or_else(|| Error::Internal(format!("no stream head for {}", aggregate.id)))?;
        let sequence = head.next_sequence;
        head.next_sequence += 1;
        Ok((sequence, head.owner.clone()))
    }
}

/// Build the persisted view of a command.
pub fn stamp_event(
    command: &dyn Command,
    sequence: u64,
    position: Position,
    created_at: DateTime<Utc>,
    owner: String,
    payload: Option<Value>,
) -> Event {
    let base = command.base();
    let mut aggregate = base.aggregate.clone();
    aggregate.resource_owner = owner;
    Event {
        aggregate,
        event_type: base.event_type.clone(),
        revision: base.revision,
        sequence,
        position,
        created_at,
        creator: base.creator.clone(),
        service: base.service.clone(),
        payload,
    }
}

/// Commit timestamp at storage precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC3339 so stored timestamps compare lexicographically.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid stored timestamp {value}: {e}")))
}
