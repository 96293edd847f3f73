//! Database-specific error types and conversions.

use grove_core::error::GroveError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Invalid stored value: {0}")]
    Decode(String),
}

/// Prefixes of the messages a transaction script raises with `THROW`.
pub(crate) const CONFLICT_MARK: &str = "grove:conflict:";
pub(crate) const REJECTED_MARK: &str = "grove:rejected:";
pub(crate) const NOT_FOUND_MARK: &str = "grove:not-found:";

impl DbError {
    /// Classifies one statement error.
    ///
    /// Unique index violations surface as "Database index `...` already
    /// contains ..." and become [`DbError::Conflict`], as do guard failures
    /// thrown with [`CONFLICT_MARK`]. A repeated membership pair reads the
    /// same as the in-memory store's refusal.
    pub fn from_statement(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        let thrown = |mark: &str| {
            message
                .split_once(mark)
                .map(|(_, rest)| rest.trim_end_matches(['"', '\'', '`']).to_string())
        };

        if let Some(reason) = thrown(CONFLICT_MARK) {
            DbError::Conflict(reason)
        } else if let Some(reason) = thrown(REJECTED_MARK) {
            DbError::Rejected(reason)
        } else if let Some(target) = thrown(NOT_FOUND_MARK) {
            let (entity, id) = target.split_once(' ').unwrap_or(("record", target.as_str()));
            DbError::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            }
        } else if message.contains("idx_membership_pair") {
            DbError::Conflict("The member is already in the group".into())
        } else if message.contains("already contains") {
            DbError::Conflict(message)
        } else {
            DbError::Query(message)
        }
    }

    /// Classifies the errors of a failed transaction, in statement order.
    ///
    /// Statements around the failing one only report that the transaction
    /// was cancelled, so the first error that says more wins.
    pub fn from_statements(errors: impl IntoIterator<Item = surrealdb::Error>) -> Self {
        let mut fallback = None;
        for err in errors {
            match DbError::from_statement(err) {
                DbError::Query(message) => {
                    fallback.get_or_insert(message);
                }
                classified => return classified,
            }
        }
        DbError::Query(fallback.unwrap_or_else(|| "transaction failed".into()))
    }
}

impl From<DbError> for GroveError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => GroveError::NotFound { entity, id },
            DbError::Conflict(message) => GroveError::Conflict { message },
            DbError::Rejected(message) => GroveError::BadRequest { message },
            other => GroveError::Database(other.to_string()),
        }
    }
}
