//! Error types for the invoice core

use rust_decimal::Decimal;
use thiserror::Error;

use crate::lifecycle::TransitionError;
use crate::service::ServiceError;

/// Input rejected before it reaches the invoice service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("tax rate must be between 0 and 100, got {0}")]
    TaxRateOutOfRange(Decimal),

    #[error("{0} allows at most 2 decimal places")]
    TooPrecise(&'static str),

    #[error("invoice needs at least one line item with a description and a price")]
    NoValidLineItems,

    #[error("line item {}: {reason}", .index + 1)]
    LineItem { index: usize, reason: &'static str },

    #[error("total must be greater than zero")]
    NonPositiveTotal,
}

/// Failure of a repository operation.
///
/// The `Display` output is the single human-readable message the repository keeps as
/// its current error.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invoice {0} not found")]
    NotFound(i64),

    #[error("{0}")]
    Service(String),
}

impl RepositoryError {
    /// Lift a service failure for the given invoice.
    ///
    /// Auth failures are not special-cased here; the session layer above decides what
    /// to do with them.
    pub fn from_service(err: ServiceError, id: Option<i64>) -> Self {
        match (err, id) {
            (ServiceError::NotFound, Some(id)) => RepositoryError::NotFound(id),
            (err, _) => RepositoryError::Service(err.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}
