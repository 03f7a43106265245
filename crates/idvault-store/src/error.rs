//! Store-specific error types and driver-error classification.

use idvault_core::error::{IdentityError, TransportError};
use scylla::transport::errors::{DbError, NewSessionError, QueryError};
use scylla::transport::iterator::NextRowError;
use tracing::error;

/// Store-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("failed to establish a session: {0}")]
    Session(#[from] NewSessionError),

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("unexpected row shape: {0}")]
    Decode(String),
}

impl From<NextRowError> for StoreError {
    fn from(err: NextRowError) -> Self {
        Self::decode(err)
    }
}

impl StoreError {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    fn transport_kind(&self) -> TransportError {
        match self {
            Self::Query(err) => classify(err),
            Self::Session(_) => TransportError::NoHostAvailable,
            Self::Config(message) => TransportError::Other((*message).into()),
            Self::Decode(message) => TransportError::Other(message.clone()),
        }
    }
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        // Logged here so the uniform outcome type does not swallow the
        // driver-level detail.
        error!(error = %err, "store operation failed");
        IdentityError::Transport(err.transport_kind())
    }
}

/// Folds a driver error into the transport-failure taxonomy.
pub(crate) fn classify(err: &QueryError) -> TransportError {
    match err {
        QueryError::DbError(db, message) => match db {
            DbError::Unavailable { .. } | DbError::Overloaded | DbError::IsBootstrapping => {
                TransportError::Unavailable
            }
            DbError::ReadTimeout { .. } | DbError::ReadFailure { .. } => {
                TransportError::ReadTimeout
            }
            DbError::WriteTimeout { .. } | DbError::WriteFailure { .. } => {
                TransportError::WriteTimeout
            }
            DbError::SyntaxError
            | DbError::Invalid
            | DbError::AlreadyExists { .. }
            | DbError::Unauthorized
            | DbError::AuthenticationError => TransportError::QueryValidation,
            _ => TransportError::Other(message.clone()),
        },
        QueryError::BadQuery(_) => TransportError::QueryValidation,
        QueryError::IoError(_) | QueryError::UnableToAllocStreamId => {
            TransportError::NoHostAvailable
        }
        other => TransportError::Other(other.to_string()),
    }
}
