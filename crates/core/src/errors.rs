use thiserror::Error;

use crate::domain::approval::ApprovalStatus;
use crate::scoping::validator::SelectionViolation;

/// Failures reported by approval storage adapters.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage conflict: {0}")]
    Conflict(String),
    #[error("database failure: {0}")]
    Database(String),
    #[error("decode failure: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("selection failed validation with {} violation(s)", violations.len())]
    Validation { violations: Vec<SelectionViolation> },
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("approval `{approval_id}` is no longer pending (status {status:?})")]
    Concurrency { approval_id: String, status: ApprovalStatus },
    #[error("storage operation `{operation}` timed out after {timeout_ms}ms")]
    StorageTimeout { operation: &'static str, timeout_ms: u64 },
    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Concurrency { .. } => "concurrency",
            Self::StorageTimeout { .. } => "storage_timeout",
            Self::Storage(_) => "storage",
        }
    }

    pub fn violations(&self) -> &[SelectionViolation] {
        match self {
            Self::Validation { violations } => violations,
            _ => &[],
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::Validation { violations } => {
                InterfaceError::Unprocessable { message, violations, correlation_id }
            }
            Self::NotFound { .. } => InterfaceError::NotFound { message, correlation_id },
            Self::InvalidState(_) | Self::Concurrency { .. } => {
                InterfaceError::Conflict { message, correlation_id }
            }
            Self::StorageTimeout { .. } | Self::Storage(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(message) => Self::InvalidState(message),
            StoreError::Database(message) | StoreError::Decode(message) => Self::Storage(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, violations: Vec<SelectionViolation>, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unprocessable { .. } => {
                "The scoping selection is not valid. Review the listed violations."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record changed since it was loaded. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::approval::ApprovalStatus;
    use crate::domain::catalog::{EquipmentId, ModuleId};
    use crate::errors::{InterfaceError, StoreError, WorkflowError};
    use crate::scoping::validator::SelectionViolation;

    #[test]
    fn validation_error_keeps_violations_for_the_caller() {
        let violation = SelectionViolation::MissingRequired {
            equipment_id: EquipmentId("terminal".to_owned()),
            required_by: vec![ModuleId("pos".to_owned())],
        };
        let interface = WorkflowError::Validation { violations: vec![violation.clone()] }
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::Unprocessable { ref violations, ref correlation_id, .. }
                if violations == &vec![violation] && correlation_id == "req-1"
        ));
    }

    #[test]
    fn concurrency_and_invalid_state_map_to_conflict() {
        let concurrency = WorkflowError::Concurrency {
            approval_id: "apr-1".to_owned(),
            status: ApprovalStatus::Approved,
        }
        .into_interface("req-2");
        let invalid = WorkflowError::InvalidState("approved".to_owned()).into_interface("req-3");

        assert!(matches!(concurrency, InterfaceError::Conflict { .. }));
        assert!(matches!(invalid, InterfaceError::Conflict { .. }));
        assert_eq!(
            concurrency.user_message(),
            "The record changed since it was loaded. Refresh and try again."
        );
    }

    #[test]
    fn storage_timeout_maps_to_service_unavailable() {
        let interface = WorkflowError::StorageTimeout { operation: "apply_review", timeout_ms: 50 }
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-4");
    }

    #[test]
    fn store_conflict_surfaces_as_invalid_state() {
        let mapped = WorkflowError::from(StoreError::Conflict("successor exists".to_owned()));
        assert_eq!(mapped.kind(), "invalid_state");

        let mapped = WorkflowError::from(StoreError::Decode("bad status".to_owned()));
        assert_eq!(mapped.kind(), "storage");
    }
}
