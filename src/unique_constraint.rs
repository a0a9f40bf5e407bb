//! Declarative global-uniqueness assertions attached to commands.
//!
//! Constraints are pure data; the push engine materializes them as rows keyed
//! by `(instance, unique_type, unique_field)` in the same transaction as the
//! events that carry them.

/// What a push does with a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraintAction {
    /// Insert the row; an existing row aborts the push.
    Add,
    /// Delete the row; an absent row is a no-op.
    Remove,
    /// Delete every row of the command's instance.
    InstanceRemove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub unique_type: String,
    pub unique_field: String,
    pub action: UniqueConstraintAction,
    /// Message key returned to the caller when an Add conflicts.
    pub error_message: String,
    /// Global constraints are shared by all instances.
    pub is_global: bool,
}

impl UniqueConstraint {
    pub fn add(
        unique_type: impl Into<String>,
        unique_field: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Add,
            error_message: error_message.into(),
            is_global: false,
        }
    }

    pub fn add_global(
        unique_type: impl Into<String>,
        unique_field: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            is_global: true,
            ..Self::add(unique_type, unique_field, error_message)
        }
    }

    pub fn remove(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Remove,
            error_message: String::new(),
            is_global: false,
        }
    }

    pub fn remove_global(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self {
            is_global: true,
            ..Self::remove(unique_type, unique_field)
        }
    }

    /// Drop all constraints of the instance the carrying command belongs to.
    pub fn remove_instance() -> Self {
        Self {
            unique_type: String::new(),
            unique_field: String::new(),
            action: UniqueConstraintAction::InstanceRemove,
            error_message: String::new(),
            is_global: false,
        }
    }

    /// Instance scope of the row; global constraints use the empty instance.
    pub fn scope<'a>(&self, instance_id: &'a str) -> &'a str {
        if self.is_global {
            ""
        } else {
            instance_id
        }
    }
}
