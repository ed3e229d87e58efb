//! Error types for persistence operations.

use std::fmt;

use thiserror::Error;

/// What kind of database failure a [`StoreError::Database`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `SQLite` reported `SQLITE_BUSY` or `SQLITE_LOCKED`.
    BusyOrLocked,
    /// No pooled connection became free in time.
    PoolTimeout,
    /// A unique, foreign-key or check constraint rejected the write.
    Constraint,
    /// The pool was closed underneath the caller.
    PoolClosed,
    RowNotFound,
    Io,
    Other,
}

impl DbErrorKind {
    /// Classifies a driver error.
    #[must_use]
    pub fn of(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(database_error) => Self::of_database(database_error.as_ref()),
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            _ => Self::Other,
        }
    }

    fn of_database(error: &(dyn sqlx::error::DatabaseError + 'static)) -> Self {
        // Primary result codes 5 and 6; extended codes keep them in the low byte.
        let busy_code = error
            .code()
            .and_then(|code| code.parse::<u32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6));
        let message = error.message().to_ascii_lowercase();
        if busy_code || message.contains("is locked") || message.contains("is busy") {
            return Self::BusyOrLocked;
        }

        if error.is_unique_violation()
            || error.is_foreign_key_violation()
            || error.is_check_violation()
        {
            return Self::Constraint;
        }

        Self::Other
    }

    /// True for contention that a later attempt can get past.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::BusyOrLocked | Self::PoolTimeout)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BusyOrLocked => "busy",
            Self::PoolTimeout => "pool timeout",
            Self::Constraint => "constraint",
            Self::PoolClosed => "pool closed",
            Self::RowNotFound => "row not found",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the key-value store and the library datastore.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("database error ({kind}): {message}")]
    Database { kind: DbErrorKind, message: String },

    /// A persisted value could not be encoded or decoded.
    #[error("invalid stored value for '{key}': {message}")]
    Serialization { key: String, message: String },

    #[error("novel not found: id {0}")]
    NovelNotFound(i64),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::of(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    #[must_use]
    pub fn serialization(key: &str, error: &serde_json::Error) -> Self {
        Self::Serialization {
            key: key.to_string(),
            message: error.to_string(),
        }
    }

    /// Kind of the underlying database failure, if any.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::Serialization { .. } | Self::NovelNotFound(_) => None,
        }
    }

    /// True when retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.database_kind().is_some_and(DbErrorKind::is_transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(kind: DbErrorKind, message: &str) -> StoreError {
        StoreError::Database {
            kind,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_database_error_message_names_kind() {
        let err = database(DbErrorKind::BusyOrLocked, "database is locked");
        assert_eq!(err.to_string(), "database error (busy): database is locked");
    }

    #[test]
    fn test_contention_is_transient() {
        assert!(database(DbErrorKind::BusyOrLocked, "database is locked").is_transient());
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!database(DbErrorKind::Constraint, "UNIQUE constraint failed").is_transient());
        assert!(!StoreError::NovelNotFound(3).is_transient());
    }

    #[test]
    fn test_driver_errors_are_classified() {
        assert_eq!(
            StoreError::from(sqlx::Error::RowNotFound).database_kind(),
            Some(DbErrorKind::RowNotFound)
        );
        assert_eq!(
            StoreError::from(sqlx::Error::PoolClosed).database_kind(),
            Some(DbErrorKind::PoolClosed)
        );
    }

    #[test]
    fn test_serialization_error_names_key() {
        let json_error = serde_json::from_str::<Vec<u8>>("not json").err();
        let Some(json_error) = json_error else {
            panic!("expected a decode error");
        };
        let err = StoreError::serialization("background_task_queue", &json_error);
        assert!(err.to_string().contains("background_task_queue"));
        assert_eq!(err.database_kind(), None);
    }
}
