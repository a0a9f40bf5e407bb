//! Built query representation and its in-memory evaluator.
//!
//! A [`Query`] is an OR of branches, each branch an AND of [`Filter`]s.
//! Storage backends render the same filters to their native query
//! language; [`Filter::matches`] is the reference semantics they follow.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::aggregate::Aggregate;
use crate::error::{Error, Result};
use crate::event::{Command, Event, EventType, Position};

/// Output shape of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Columns {
    /// Full event rows.
    #[default]
    Event,
    /// Highest sequence of the matching events.
    MaxSequence,
    /// Highest position of the matching events.
    MaxPosition,
}

/// Event attribute a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    AggregateType,
    AggregateId,
    EventType,
    Sequence,
    Position,
    CreationDate,
    ResourceOwner,
    InstanceId,
    Creator,
    EventData,
}

impl FilterField {
    fn is_text(self) -> bool {
        matches!(
            self,
            Self::AggregateType
                | Self::AggregateId
                | Self::EventType
                | Self::ResourceOwner
                | Self::InstanceId
                | Self::Creator
        )
    }

    /// Identity fields never match an empty value.
    fn requires_value(self) -> bool {
        matches!(self, Self::AggregateType | Self::AggregateId | Self::EventType)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Equals,
    Greater,
    Less,
    In,
    /// The payload contains every leaf of the filter object.
    JsonContains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    TextList(Vec<String>),
    Unsigned(u64),
    Time(DateTime<Utc>),
    Data(Map<String, Value>),
}

/// A single predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: FilterField,
    pub value: FilterValue,
    pub operation: Operation,
}

impl Filter {
    pub fn new(field: FilterField, value: FilterValue, operation: Operation) -> Self {
        Self {
            field,
            value,
            operation,
        }
    }

    /// Text filter: one value renders `Equals`, several render `In`.
    pub(crate) fn text(field: FilterField, mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => Some(Self::new(
                field,
                FilterValue::Text(values.remove(0)),
                Operation::Equals,
            )),
            _ => Some(Self::new(field, FilterValue::TextList(values), Operation::In)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = match (&self.value, self.operation) {
            (FilterValue::Text(text), Operation::Equals) => {
                self.field.is_text() && !(self.field.requires_value() && text.is_empty())
            }
            (FilterValue::TextList(list), Operation::In) => {
                self.field.is_text()
                    && !list.is_empty()
                    && !(self.field.requires_value() && list.iter().any(String::is_empty))
            }
            (FilterValue::Unsigned(_), Operation::Equals | Operation::Greater | Operation::Less) => {
                matches!(self.field, FilterField::Sequence | FilterField::Position)
            }
            (FilterValue::Time(_), Operation::Equals | Operation::Greater | Operation::Less) => {
                self.field == FilterField::CreationDate
            }
            (FilterValue::Data(data), Operation::JsonContains) => {
                self.field == FilterField::EventData && valid_data_object(data)
            }
            _ => false,
        };
        if !valid {
            return Err(Error::precondition_failed(
                "REPO-7fWm2",
                format!(
                    "Errors.Query.FilterInvalid: {:?} {:?}",
                    self.field, self.operation
                ),
            ));
        }
        Ok(())
    }

    /// Evaluate the filter against one event or command.
    pub fn matches(&self, subject: &Subject<'_>) -> bool {
        match &self.value {
            FilterValue::Text(expected) => subject.text(self.field) == Some(expected.as_str()),
            FilterValue::TextList(expected) => subject
                .text(self.field)
                .is_some_and(|actual| expected.iter().any(|e| e == actual)),
            FilterValue::Unsigned(expected) => {
                let actual = match self.field {
                    FilterField::Sequence => subject.sequence,
                    FilterField::Position => subject.position.map(|p| p.global),
                    _ => return false,
                };
                compare_cursor(actual, expected, self.operation)
            }
            FilterValue::Time(expected) => {
                compare_cursor(subject.created_at, expected, self.operation)
            }
            FilterValue::Data(expected) => data_leaves(expected)
                .iter()
                .all(|(path, leaf)| leaf_matches(subject.payload, path, leaf)),
        }
    }
}

/// Cursor comparison. Subjects without a cursor value are pending and
/// therefore newer than anything persisted.
fn compare_cursor<T: PartialOrd>(actual: Option<T>, expected: &T, operation: Operation) -> bool {
    match (actual, operation) {
        (None, Operation::Greater) => true,
        (None, _) => false,
        (Some(actual), Operation::Equals) => actual == *expected,
        (Some(actual), Operation::Greater) => actual > *expected,
        (Some(actual), Operation::Less) => actual < *expected,
        _ => false,
    }
}

fn valid_data_object(data: &Map<String, Value>) -> bool {
    !data.is_empty()
        && data.iter().all(|(key, value)| {
            !key.is_empty()
                && !key.contains('"')
                && match value {
                    Value::Array(_) => false,
                    Value::Object(nested) => valid_data_object(nested),
                    _ => true,
                }
        })
}

/// Flatten a containment object into `(path, scalar)` leaves.
pub(crate) fn data_leaves(data: &Map<String, Value>) -> Vec<(Vec<&str>, &Value)> {
    let mut leaves = Vec::new();
    collect_leaves(data, &mut Vec::new(), &mut leaves);
    leaves
}

fn collect_leaves<'a>(
    data: &'a Map<String, Value>,
    prefix: &mut Vec<&'a str>,
    leaves: &mut Vec<(Vec<&'a str>, &'a Value)>,
) {
    for (key, value) in data {
        prefix.push(key);
        match value {
            Value::Object(nested) => collect_leaves(nested, prefix, leaves),
            leaf => leaves.push((prefix.clone(), leaf)),
        }
        prefix.pop();
    }
}

/// Render a leaf path as an SQLite JSON path: `$."a"."b"`.
pub(crate) fn json_path(path: &[&str]) -> String {
    let mut rendered = String::from("$");
    for key in path {
        rendered.push_str(".\"");
        rendered.push_str(key);
        rendered.push('"');
    }
    rendered
}

/// Missing keys read as JSON null, numbers compare numerically. Events
/// without payload match nothing.
fn leaf_matches(payload: Option<&Value>, path: &[&str], leaf: &Value) -> bool {
    let Some(payload) = payload else {
        return false;
    };
    let found = path
        .iter()
        .try_fold(payload, |current, key| current.get(*key));
    match (leaf, found) {
        (Value::Null, None | Some(Value::Null)) => true,
        (Value::Bool(expected), Some(Value::Bool(actual))) => expected == actual,
        (Value::Number(expected), Some(Value::Number(actual))) => numbers_equal(expected, actual),
        (Value::String(expected), Some(Value::String(actual))) => expected == actual,
        _ => false,
    }
}

/// 64-bit signed integers compare exactly. Anything else compares as f64,
/// the way SQLite reads integers beyond `i64` from JSON text.
fn numbers_equal(expected: &Number, actual: &Number) -> bool {
    if let (Some(expected), Some(actual)) = (expected.as_i64(), actual.as_i64()) {
        return expected == actual;
    }
    expected.as_f64() == actual.as_f64()
}

/// The attributes of an event or command a filter can see.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub aggregate: &'a Aggregate,
    pub event_type: &'a EventType,
    pub creator: &'a str,
    pub sequence: Option<u64>,
    pub position: Option<Position>,
    pub created_at: Option<DateTime<Utc>>,
    pub payload: Option<&'a Value>,
}

impl<'a> Subject<'a> {
    pub fn event(event: &'a Event) -> Self {
        let persisted = !event.is_pending();
        Self {
            aggregate: &event.aggregate,
            event_type: &event.event_type,
            creator: &event.creator,
            sequence: persisted.then_some(event.sequence),
            position: persisted.then_some(event.position),
            created_at: persisted.then_some(event.created_at),
            payload: event.payload.as_ref(),
        }
    }

    pub fn command(command: &'a dyn Command, payload: Option<&'a Value>) -> Self {
        Self {
            aggregate: command.aggregate(),
            event_type: command.event_type(),
            creator: command.creator(),
            sequence: None,
            position: None,
            created_at: None,
            payload,
        }
    }

    fn text(&self, field: FilterField) -> Option<&'a str> {
        match field {
            FilterField::AggregateType => Some(self.aggregate.aggregate_type.as_str()),
            FilterField::AggregateId => Some(&self.aggregate.id),
            FilterField::EventType => Some(self.event_type.as_str()),
            FilterField::ResourceOwner => Some(&self.aggregate.resource_owner),
            FilterField::InstanceId => Some(&self.aggregate.instance_id),
            FilterField::Creator => Some(self.creator),
            _ => None,
        }
    }
}

/// A validated query ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub columns: Columns,
    pub desc: bool,
    /// Zero means unlimited.
    pub limit: u64,
    pub offset: u64,
    /// OR of ANDed filters.
    pub branches: Vec<Vec<Filter>>,
}

impl Query {
    pub fn matches_event(&self, event: &Event) -> bool {
        self.matches(&Subject::event(event))
    }

    pub fn matches_command(&self, command: &dyn Command) -> Result<bool> {
        let payload = command.payload()?;
        Ok(self.matches(&Subject::command(command, payload.as_ref())))
    }

    pub fn matches(&self, subject: &Subject<'_>) -> bool {
        self.branches
            .iter()
            .any(|branch| branch.iter().all(|filter| filter.matches(subject)))
    }

    /// True if any branch filters on the payload.
    pub fn uses_event_data(&self) -> bool {
        self.branches
            .iter()
            .flatten()
            .any(|filter| filter.field == FilterField::EventData)
    }
}
