//! Ledger Error Types
//!
//! Two layers:
//! - [`DbErrorKind`] / [`classify`]: the only code that looks at driver error
//!   shapes (SQLSTATE codes, sqlx variants).
//! - [`LedgerError`]: the domain taxonomy callers reason about.

use std::fmt;

use thiserror::Error;

/// PostgreSQL SQLSTATE codes the ledger reacts to
pub mod sqlstate {
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const QUERY_CANCELED: &str = "57014";
}

/// Classified storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    NotFound,
    UniqueViolation,
    ForeignKeyViolation,
    /// CHECK constraint, e.g. `accounts_balance_non_negative`
    CheckViolation,
    SerializationFailure,
    Deadlock,
    /// Pool exhaustion, closed pool, socket or TLS failure, statement timeout
    Connection,
    Other,
}

impl DbErrorKind {
    /// Aborts the engine expects a clean re-run of the transaction to resolve
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbErrorKind::SerializationFailure | DbErrorKind::Deadlock)
    }
}

/// Map a SQLSTATE code to its class
pub fn classify_code(code: &str) -> DbErrorKind {
    match code {
        sqlstate::UNIQUE_VIOLATION => DbErrorKind::UniqueViolation,
        sqlstate::FOREIGN_KEY_VIOLATION => DbErrorKind::ForeignKeyViolation,
        sqlstate::CHECK_VIOLATION => DbErrorKind::CheckViolation,
        sqlstate::SERIALIZATION_FAILURE => DbErrorKind::SerializationFailure,
        sqlstate::DEADLOCK_DETECTED => DbErrorKind::Deadlock,
        sqlstate::QUERY_CANCELED => DbErrorKind::Connection,
        _ => DbErrorKind::Other,
    }
}

/// Classify an error returned by sqlx
pub fn classify(err: &sqlx::Error) -> DbErrorKind {
    match err {
        sqlx::Error::RowNotFound => DbErrorKind::NotFound,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| classify_code(&code))
            .unwrap_or(DbErrorKind::Other),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbErrorKind::Connection,
        _ => DbErrorKind::Other,
    }
}

/// Why a [`LedgerError::Transient`] happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientCause {
    Serialization,
    Deadlock,
    Connection,
    Timeout,
}

impl TransientCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientCause::Serialization => "serialization failure",
            TransientCause::Deadlock => "deadlock detected",
            TransientCause::Connection => "connection failure",
            TransientCause::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Bad input; storage was never touched
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: i64,
        balance: i64,
        requested: i64,
    },

    /// Unique or foreign-key violation surfaced from storage
    #[error("Conflict ({kind:?}): {message}")]
    Conflict { kind: DbErrorKind, message: String },

    #[error("Transient failure ({cause}): {message}")]
    Transient {
        cause: TransientCause,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Serialization and deadlock aborts; connection faults and timeouts are
    /// surfaced without a retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Transient {
                cause: TransientCause::Serialization | TransientCause::Deadlock,
                ..
            }
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient { .. })
    }

    pub(crate) fn timeout(message: impl Into<String>) -> Self {
        LedgerError::Transient {
            cause: TransientCause::Timeout,
            message: message.into(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Conflict {
                kind: DbErrorKind::UniqueViolation,
                ..
            } => "UNIQUE_VIOLATION",
            LedgerError::Conflict {
                kind: DbErrorKind::ForeignKeyViolation,
                ..
            } => "FOREIGN_KEY_VIOLATION",
            LedgerError::Conflict { .. } => "CONFLICT",
            LedgerError::Transient { .. } => "TRANSIENT",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_) => 400,
            LedgerError::NotFound(_) => 404,
            LedgerError::Conflict { .. } => 409,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::Transient { .. } => 503,
            LedgerError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        let message = e.to_string();
        match classify(&e) {
            DbErrorKind::NotFound => LedgerError::NotFound(message),
            kind @ (DbErrorKind::UniqueViolation
            | DbErrorKind::ForeignKeyViolation
            | DbErrorKind::CheckViolation) => LedgerError::Conflict { kind, message },
            DbErrorKind::SerializationFailure => LedgerError::Transient {
                cause: TransientCause::Serialization,
                message,
            },
            DbErrorKind::Deadlock => LedgerError::Transient {
                cause: TransientCause::Deadlock,
                message,
            },
            DbErrorKind::Connection => LedgerError::Transient {
                cause: TransientCause::Connection,
                message,
            },
            DbErrorKind::Other => LedgerError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;

    /// Minimal driver error carrying only a SQLSTATE
    #[derive(Debug)]
    struct FakePgError(&'static str);

    impl fmt::Display for FakePgError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl StdError for FakePgError {}

    impl DatabaseError for FakePgError {
        fn message(&self) -> &str {
            "fake postgres error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn pg_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakePgError(code)))
    }

    #[test]
    fn test_classify_driver_errors() {
        assert_eq!(classify(&sqlx::Error::RowNotFound), DbErrorKind::NotFound);
        assert_eq!(classify(&pg_error("23505")), DbErrorKind::UniqueViolation);
        assert_eq!(classify(&pg_error("23503")), DbErrorKind::ForeignKeyViolation);
        assert_eq!(classify(&pg_error("23514")), DbErrorKind::CheckViolation);
        assert_eq!(classify(&pg_error("40001")), DbErrorKind::SerializationFailure);
        assert_eq!(classify(&pg_error("40P01")), DbErrorKind::Deadlock);
        assert_eq!(classify(&pg_error("42P01")), DbErrorKind::Other);
        assert_eq!(classify(&sqlx::Error::PoolTimedOut), DbErrorKind::Connection);
        assert_eq!(
            classify(&sqlx::Error::ColumnNotFound("balance".into())),
            DbErrorKind::Other
        );
    }

    #[test]
    fn test_only_serialization_and_deadlock_are_retryable() {
        assert!(DbErrorKind::SerializationFailure.is_retryable());
        assert!(DbErrorKind::Deadlock.is_retryable());
        assert!(!DbErrorKind::Connection.is_retryable());
        assert!(!DbErrorKind::NotFound.is_retryable());

        assert!(LedgerError::from(pg_error("40001")).is_retryable());
        assert!(LedgerError::from(pg_error("40P01")).is_retryable());

        let pool_timeout = LedgerError::from(sqlx::Error::PoolTimedOut);
        assert!(pool_timeout.is_transient());
        assert!(!pool_timeout.is_retryable());
        assert!(!LedgerError::timeout("deadline").is_retryable());
    }

    #[test]
    fn test_sqlx_errors_map_to_taxonomy() {
        assert!(matches!(
            LedgerError::from(sqlx::Error::RowNotFound),
            LedgerError::NotFound(_)
        ));
        assert!(matches!(
            LedgerError::from(pg_error("23505")),
            LedgerError::Conflict {
                kind: DbErrorKind::UniqueViolation,
                ..
            }
        ));
        assert!(matches!(
            LedgerError::from(pg_error("XX000")),
            LedgerError::Internal(_)
        ));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::from(pg_error("23505")).code(), "UNIQUE_VIOLATION");
        assert_eq!(
            LedgerError::from(pg_error("23503")).code(),
            "FOREIGN_KEY_VIOLATION"
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                account_id: 1,
                balance: 70,
                requested: 500
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::Validation("x".into()).http_status(), 400);
        assert_eq!(LedgerError::NotFound("x".into()).http_status(), 404);
        assert_eq!(LedgerError::from(pg_error("23505")).http_status(), 409);
        assert_eq!(LedgerError::timeout("x").http_status(), 503);
        assert_eq!(LedgerError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn test_display() {
        let err = LedgerError::InsufficientFunds {
            account_id: 7,
            balance: 70,
            requested: 500,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds in account 7: balance 70, requested 500"
        );
        assert_eq!(
            LedgerError::timeout("tx").to_string(),
            "Transient failure (timeout): tx"
        );
    }
}
