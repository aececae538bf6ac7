//! Error types for fetch-program execution.

use crate::identity::Id;
use crate::round::Env;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for the library.
///
/// Every failure raised during a run carries the [`Env`] as it stood at the
/// point of failure, so callers can inspect the rounds that did commit and
/// the cache they produced.
#[derive(Error, Debug)]
pub enum FetchError {
    /// A single required fetch returned no value.
    #[error("identity {id:?} not found in source '{source_name}'")]
    NotFound {
        /// Environment at the point of failure.
        env: Env,
        /// Name of the source that was queried.
        source_name: String,
        /// The identity the source had no value for.
        id: Id,
    },

    /// A batch or concurrent round returned fewer values than it was asked
    /// for. Raised only after every branch of the round has completed, and
    /// before the round is committed to the log.
    #[error("sources are missing required identities: {missing:?}")]
    MissingIdentities {
        /// Environment at the point of failure.
        env: Env,
        /// The absent identities, grouped by source name.
        missing: HashMap<String, Vec<Id>>,
    },

    /// A user-lifted error, or a failure raised by a data source.
    #[error("unhandled exception: {cause}")]
    UnhandledException {
        /// Environment at the point of failure.
        env: Env,
        /// The underlying error.
        cause: Arc<anyhow::Error>,
    },

    /// An internal invariant was violated, e.g. a value produced by the
    /// erased layer did not have the type the program expected.
    #[error("internal error: {context}")]
    Internal {
        /// What went wrong.
        context: String,
    },
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// The environment at the point of failure, when the failure carries one.
    pub fn env(&self) -> Option<&Env> {
        match self {
            Self::NotFound { env, .. }
            | Self::MissingIdentities { env, .. }
            | Self::UnhandledException { env, .. } => Some(env),
            Self::Internal { .. } => None,
        }
    }

    /// Check whether this error is a single-identity miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check whether this error is a batch falling short of its request.
    pub fn is_missing_identities(&self) -> bool {
        matches!(self, Self::MissingIdentities { .. })
    }

    /// Check whether this error wraps a user or source failure.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Self::UnhandledException { .. })
    }
}

/// Internal-invariant error for a value whose erased type did not match the
/// type the surrounding program expected.
pub(crate) fn value_mismatch<T>(context: &str) -> FetchError {
    FetchError::Internal {
        context: format!(
            "{context}: value does not have the expected type {}",
            std::any::type_name::<T>()
        ),
    }
}

pub(crate) fn internal(context: impl Into<String>) -> FetchError {
    FetchError::Internal {
        context: context.into(),
    }
}
