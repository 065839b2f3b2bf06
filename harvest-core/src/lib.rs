pub mod changes;
pub mod context;
pub mod filter;
pub mod repository;

pub use changes::{ChangeSet, Write};
pub use context::{Capability, RequestContext};
pub use filter::{Page, PickupFilter, PickupPage};
pub use repository::{
    AuditLog, ChangeStore, DriverRepository, FulfillmentStore, OrderRepository, PickupRepository,
};

use harvest_shared::{Availability, ModelError};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Conflicting update: {0}; refresh and retry")]
    Conflict(String),
    #[error("Driver {driver_id} is {availability} and cannot be assigned")]
    DriverUnavailable {
        driver_id: Uuid,
        availability: Availability,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Not permitted: {0}")]
    Forbidden(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Message safe to hand back to a caller. Storage details stay server-side.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Persistence(_) => "The request could not be completed".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ModelError> for CoreError {
    fn from(err: ModelError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Result of a status change. `no_op` is set when the entity was already in the
/// requested status and nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome<S> {
    pub previous: S,
    pub current: S,
    pub no_op: bool,
}

impl<S: Copy> TransitionOutcome<S> {
    pub fn applied(previous: S, current: S) -> Self {
        Self {
            previous,
            current,
            no_op: false,
        }
    }

    pub fn unchanged(status: S) -> Self {
        Self {
            previous: status,
            current: status,
            no_op: true,
        }
    }
}
