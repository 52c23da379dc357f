use thiserror::Error;

/// Errors that can occur when interacting with the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction was chosen as a deadlock victim.
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    /// Waiting for a row lock exceeded the configured timeout.
    #[error("Lock wait timed out: {0}")]
    LockTimeout(String),

    /// The transaction could not be serialized against a concurrent one.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// A unique constraint rejected an insert.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// The connection to the database was lost or could not be acquired.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A write did not apply because a guarded precondition no longer held.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back onto the model.
    #[error("Invalid stored value: {0}")]
    Decode(String),
}

impl StoreError {
    /// Returns true if retrying the whole transaction from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Deadlock(_)
                | StoreError::LockTimeout(_)
                | StoreError::SerializationFailure(_)
                | StoreError::UniqueViolation { .. }
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err.code().map(|c| c.into_owned());
            let message = db_err.message().to_string();
            match code.as_deref() {
                Some("40P01") => return StoreError::Deadlock(message),
                Some("55P03") => return StoreError::LockTimeout(message),
                Some("40001") => return StoreError::SerializationFailure(message),
                Some("23505") => {
                    return StoreError::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    };
                }
                _ => {}
            }
        }

        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
