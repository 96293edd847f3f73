//! Error types for the grove system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroveError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Not found, described by a message rather than an entity and id.
    #[error("Not found: {message}")]
    Missing { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Not acceptable: {reason}")]
    NotAcceptable { reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GroveError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::Missing {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// The human readable part of the error, without the category prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound { entity, id } => format!("Not found {entity} of id {id}"),
            Self::Missing { message }
            | Self::BadRequest { message }
            | Self::Conflict { message } => message.clone(),
            Self::Forbidden { reason } | Self::NotAcceptable { reason } => reason.clone(),
            Self::Database(msg) | Self::Upstream(msg) | Self::Internal(msg) => msg.clone(),
        }
    }

    /// Short machine-readable category, used in bulk status messages and
    /// log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::Missing { .. } => "not_found",
            Self::BadRequest { .. } => "bad_request",
            Self::Conflict { .. } => "conflict",
            Self::Forbidden { .. } => "forbidden",
            Self::NotAcceptable { .. } => "not_acceptable",
            Self::Database(_) => "database",
            Self::Upstream(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }
}

pub type GroveResult<T> = Result<T, GroveError>;
