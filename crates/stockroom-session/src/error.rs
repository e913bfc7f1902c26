//! # Ledger Error Types
//!
//! Errors surfaced by the mutation coordinator.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Stockroom                              │
//! │                                                                         │
//! │  Local checks (no round trip)          After a round trip              │
//! │  ────────────────────────────          ──────────────────              │
//! │  ValidationError ──┐                   BackendError::Conflict ──┐      │
//! │  ConstraintError ──┼─► LedgerError     BackendError::Transport ─┼─►    │
//! │  CoreError::NoChanges ─► NoOp          BackendError::NotFound ──┘      │
//! │                                                  LedgerError           │
//! │                                                                         │
//! │  Presentation layer receives { code: "CONFLICT", message: "..." }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use stockroom_core::{ConstraintError, CoreError, ValidationError};
use thiserror::Error;

use crate::busy::OperationKind;

/// Result type alias for coordinator operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result type alias for collaborator calls.
pub type BackendResult<T> = Result<T, BackendError>;

// =============================================================================
// Backend Error
// =============================================================================

/// What a persistence collaborator may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The collaborator rejected the change on a business rule or a
    /// concurrent modification.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The request did not complete. Opaque passthrough.
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
}

impl BackendError {
    pub fn conflict(message: impl Into<String>) -> Self {
        BackendError::Conflict {
            message: message.into(),
        }
    }

    pub fn variant_not_found(id: &str) -> Self {
        BackendError::NotFound {
            entity: "Variant".to_string(),
            id: id.to_string(),
        }
    }
}

// =============================================================================
// Ledger Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    // =========================================================================
    // Local (before any round trip)
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Constraint violated: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Nothing to save for variant {variant_id}")]
    NoOp { variant_id: String },

    #[error("A {operation} is already in progress for variant {variant_id}")]
    Busy {
        variant_id: String,
        operation: OperationKind,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // Remote (after a round trip)
    // =========================================================================
    #[error("Conflict on variant {variant_id}: {message}")]
    Conflict { variant_id: String, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    // =========================================================================
    // Setup
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl LedgerError {
    pub fn variant_not_found(id: &str) -> Self {
        LedgerError::NotFound {
            entity: "Variant".to_string(),
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        LedgerError::NotFound {
            entity: "Edit session".to_string(),
            id: id.to_string(),
        }
    }

    /// Attaches the variant a collaborator error refers to.
    pub fn from_backend(variant_id: &str, err: BackendError) -> Self {
        match err {
            BackendError::Conflict { message } => LedgerError::Conflict {
                variant_id: variant_id.to_string(),
                message,
            },
            BackendError::Transport(message) => LedgerError::Transport(message),
            BackendError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::Constraint(_) => ErrorCode::ConstraintViolation,
            LedgerError::NoOp { .. } => ErrorCode::NoChanges,
            LedgerError::Busy { .. } => ErrorCode::Busy,
            LedgerError::NotFound { .. } => ErrorCode::NotFound,
            LedgerError::Conflict { .. } => ErrorCode::Conflict,
            LedgerError::Transport(_) => ErrorCode::TransportError,
            LedgerError::Config(_) | LedgerError::ConfigRead(_) | LedgerError::ConfigParse(_) => {
                ErrorCode::ConfigError
            }
        }
    }

    /// Whether the user can act on the error and try again.
    ///
    /// ## Recoverable
    /// - Validation / constraint failures (fix the input)
    /// - Conflicts (the optimistic state has been rolled back)
    /// - Transport failures and busy flags (retry later)
    /// - No-op saves
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LedgerError::NotFound { .. }
                | LedgerError::Config(_)
                | LedgerError::ConfigRead(_)
                | LedgerError::ConfigParse(_)
        )
    }

    /// Serializable form for the presentation layer.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
            recoverable: self.is_recoverable(),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => LedgerError::Validation(e),
            CoreError::Constraint(e) => LedgerError::Constraint(e),
            CoreError::NoChanges { variant_id } => LedgerError::NoOp { variant_id },
        }
    }
}


// =============================================================================
// Error Codes
// =============================================================================

/// Machine-readable error codes.
///
/// ## Usage in Frontend
/// ```typescript
/// switch (e.code) {
///   case 'CONFLICT':
///     showToast(e.message);      // state already rolled back
///     break;
///   case 'NO_CHANGES':
///     closeEditor();
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ConstraintViolation,
    NoChanges,
    Busy,
    NotFound,
    Conflict,
    TransportError,
    ConfigError,
}

/// What the presentation layer receives when an operation fails.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_no_changes_becomes_no_op() {
        let err: LedgerError = CoreError::NoChanges {
            variant_id: "v1".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::NoChanges);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_backend_conflict_keeps_variant() {
        let err = LedgerError::from_backend(
            "v1",
            BackendError::conflict("only one active batch per option combination"),
        );
        assert_eq!(
            err.to_string(),
            "Conflict on variant v1: only one active batch per option combination"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_errors_keep_their_source() {
        use std::error::Error as _;

        let io: LedgerError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ledger.toml").into();
        assert!(matches!(io, LedgerError::ConfigRead(_)));
        assert!(io.source().is_some());
        assert_eq!(io.code(), ErrorCode::ConfigError);
        assert!(!io.is_recoverable());

        let parse: LedgerError = toml::from_str::<toml::Value>("max_images = ").unwrap_err().into();
        assert!(matches!(parse, LedgerError::ConfigParse(_)));
        assert!(parse.source().is_some());
        assert_eq!(parse.code(), ErrorCode::ConfigError);
    }

    #[test]
    fn test_report_serializes_screaming_code() {
        let report = LedgerError::Transport("timed out".to_string()).report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["code"], "TRANSPORT_ERROR");
        assert_eq!(json["recoverable"], true);

        let report = LedgerError::variant_not_found("v9").report();
        assert_eq!(serde_json::to_value(&report).unwrap()["code"], "NOT_FOUND");
        assert!(!report.recoverable);
    }
}
