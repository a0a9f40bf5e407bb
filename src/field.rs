//! Search fields.
//!
//! Commands can maintain small key/value lookups next to the event log
//! ("which user owns login name X") without building a projection. Field
//! operations are applied in the push transaction of the carrying command.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::Aggregate;

/// An object inside an aggregate that owns fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldObject {
    pub object_type: String,
    pub object_id: String,
    pub revision: u8,
}

impl FieldObject {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>, revision: u8) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            revision,
        }
    }
}

/// Mutation of the field table carried by a command.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    /// Upsert `field_name` of `object`. Unique fields must not share a value
    /// with another object of the same type and field within the instance.
    Set {
        object: FieldObject,
        field_name: String,
        value: Value,
        unique: bool,
    },
    /// Remove every field of one object of the command's aggregate.
    RemoveObject {
        object_type: String,
        object_id: String,
    },
    /// Remove every field of the command's aggregate.
    RemoveAggregate,
}

impl FieldOperation {
    pub fn set(object: FieldObject, field_name: impl Into<String>, value: Value) -> Self {
        Self::Set {
            object,
            field_name: field_name.into(),
            value,
            unique: false,
        }
    }

    pub fn set_unique(object: FieldObject, field_name: impl Into<String>, value: Value) -> Self {
        Self::Set {
            object,
            field_name: field_name.into(),
            value,
            unique: true,
        }
    }

    pub fn remove_object(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self::RemoveObject {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

/// A stored field row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchField {
    pub aggregate: Aggregate,
    pub object: FieldObject,
    pub field_name: String,
    pub value: Value,
    pub unique: bool,
}

/// Lookup of stored fields, scoped to one instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldQuery {
    pub instance_id: String,
    pub object_type: Option<String>,
    pub field_name: Option<String>,
    pub value: Option<Value>,
    pub aggregate_id: Option<String>,
}

impl FieldQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn aggregate_id(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_id = Some(aggregate_id.into());
        self
    }

    /// In-memory evaluation, kept identical to the SQL rendering.
    pub fn matches(&self, field: &SearchField) -> bool {
        field.aggregate.instance_id == self.instance_id
            && self
                .object_type
                .as_ref()
                .map_or(true, |t| *t == field.object.object_type)
            && self
                .field_name
                .as_ref()
                .map_or(true, |n| *n == field.field_name)
            && self.value.as_ref().map_or(true, |v| *v == field.value)
            && self
                .aggregate_id
                .as_ref()
                .map_or(true, |id| *id == field.aggregate.id)
    }
}
