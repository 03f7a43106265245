//! Error types for the identity store.

use thiserror::Error;

/// Errors surfaced by store operations.
///
/// Lookups that find nothing are not errors; they return `Ok(None)`.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A required parameter was empty or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A state-dependent precondition was violated, e.g. confirming a
    /// phone number when none is set, or adding a duplicate login.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The backing database rejected or failed the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Classified transport failures.
///
/// Backends fold every driver error into one of these kinds so hosts can
/// branch on the failure class without depending on driver types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no database host could be reached")]
    NoHostAvailable,

    #[error("not enough replicas were alive to satisfy the requested consistency")]
    Unavailable,

    #[error("the read did not complete within the replica timeout")]
    ReadTimeout,

    #[error("the write did not complete within the replica timeout")]
    WriteTimeout,

    #[error("the query was rejected as invalid")]
    QueryValidation,

    #[error("{0}")]
    Other(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
