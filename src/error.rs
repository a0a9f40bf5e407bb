//! Error taxonomy for the event store.
//!
//! Every error maps to exactly one [`ErrorKind`]. Caller-facing variants carry
//! an opaque error id and a message key; rendering user text is left to the
//! command layer.

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, rejected before any I/O.
    InvalidArgument,
    /// No validation produced commands.
    NotExecutable,
    /// A uniqueness assertion conflicts with existing state.
    AlreadyExists,
    /// Referenced aggregate or state is absent.
    NotFound,
    /// State exists but is not in the required condition.
    PreconditionFailed,
    /// Unexpected persistence or serialization failure.
    Internal,
    /// Transient store contention, safe to retry from preparation.
    Retryable,
    /// The context was canceled mid-operation.
    Canceled,
}

/// Errors that can occur in the event store, the preparation pipeline
/// and the storage backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument [{id}]: {message}")]
    InvalidArgument { id: &'static str, message: String },

    #[error("No validation produced commands")]
    NotExecutable,

    #[error("Unique constraint violated: type={unique_type}, field={unique_field} ({message})")]
    UniqueConstraintViolation {
        unique_type: String,
        unique_field: String,
        message: String,
    },

    #[error("Already exists [{id}]: {message}")]
    AlreadyExists { id: &'static str, message: String },

    #[error("Not found [{id}]: {message}")]
    NotFound { id: &'static str, message: String },

    #[error("Precondition failed [{id}]: {message}")]
    PreconditionFailed { id: &'static str, message: String },

    #[error("Unknown event type {event_type} for aggregate type {aggregate_type}")]
    UnknownEventType {
        aggregate_type: String,
        event_type: String,
    },

    #[error("Transient store contention: {0}")]
    Retryable(String),

    #[error("Operation canceled")]
    Canceled,

    #[cfg(feature = "sqlite")]
    #[error("Storage failure")]
    Database(#[source] sqlx::Error),

    #[error("Payload serialization failed")]
    Payload(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(id: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            id,
            message: message.into(),
        }
    }

    pub fn already_exists(id: &'static str, message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            id,
            message: message.into(),
        }
    }

    pub fn not_found(id: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            id,
            message: message.into(),
        }
    }

    pub fn precondition_failed(id: &'static str, message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            id,
            message: message.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotExecutable => ErrorKind::NotExecutable,
            Self::UniqueConstraintViolation { .. } | Self::AlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::Retryable(_) => ErrorKind::Retryable,
            Self::Canceled => ErrorKind::Canceled,
            #[cfg(feature = "sqlite")]
            Self::Database(_) => ErrorKind::Internal,
            Self::UnknownEventType { .. } | Self::Payload(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True when the whole Prepare -> Push pipeline may be rerun.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    pub fn is_precondition_failed(&self) -> bool {
        self.kind() == ErrorKind::PreconditionFailed
    }

    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }
}

/// SQLite result codes that signal lock contention.
#[cfg(feature = "sqlite")]
const SQLITE_CONTENTION_CODES: [&str; 4] = ["5", "6", "261", "517"];

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let contended = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| SQLITE_CONTENTION_CODES.contains(&&*code));
        if contended {
            return Self::Retryable("database is busy".to_string());
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return Self::Retryable("connection pool exhausted".to_string());
        }
        Self::Database(err)
    }
}
