//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── ValidationError  - Malformed input (amount, reason, file type)    │
//! │  ├── ConstraintError  - Business invariant would be violated           │
//! │  └── CoreError        - Either of the above, or "nothing to persist"   │
//! │                                                                         │
//! │  stockroom-session errors (separate crate)                             │
//! │  └── LedgerError      - Adds Conflict, Transport, Busy, NotFound       │
//! │                                                                         │
//! │  Flow: ValidationError/ConstraintError → CoreError → LedgerError       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every check that can produce one of these errors runs before any round
//! trip to the persistence collaborator, so a failure here never leaves a
//! partial mutation behind.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by the pure ledger logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Input could not be interpreted.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Input was well-formed but would break a variant invariant.
    #[error("Constraint violated: {0}")]
    Constraint(#[from] ConstraintError),

    /// Neither fields nor images differ from the persisted variant.
    #[error("Nothing to save for variant {variant_id}")]
    NoChanges { variant_id: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised when user input cannot be parsed or is missing, before
/// any business rule is consulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// A whole number was expected.
    #[error("{field} must be a whole number, got '{value}'")]
    NotAnInteger { field: String, value: String },

    /// Invalid format (e.g., "12.345" for a price).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A file offered as a variant image is not an image.
    #[error("{name} is not an image ({content_type})")]
    NotAnImage { name: String, content_type: String },

    /// An image id or index does not refer to anything in the working set.
    #[error("No image at {position}")]
    UnknownImage { position: String },
}

impl ValidationError {
    /// Creates a Required error for the named field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates a MustBePositive error for the named field.
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

// =============================================================================
// Constraint Error
// =============================================================================

/// Business invariant violations.
///
/// ## Invariants Guarded
/// ```text
/// stock ≥ 0                          → NegativeStock
/// scarcity_stock ≤ stock             → ScarcityExceedsStock
/// active ⇒ price > 0 ∧ cost > 0      → ActivationRequiresPricing
/// images ≤ MAX_VARIANT_IMAGES        → ImageCapExceeded
/// exactly one main image             → MainImageMismatch
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// The adjustment would take stock below zero. Never clamped.
    #[error("Stock for {sku} cannot go below zero: {stock_before} {delta:+} = {}", .stock_before + .delta)]
    NegativeStock {
        sku: String,
        stock_before: i64,
        delta: i64,
    },

    /// The scarcity threshold would exceed the stock it refers to.
    #[error("Scarcity stock {scarcity} cannot exceed stock {stock}")]
    ScarcityExceedsStock { scarcity: i64, stock: i64 },

    /// An active variant must keep a positive price and cost per item.
    #[error("Active variant {sku} requires a positive {field}")]
    ActivationRequiresPricing { sku: String, field: String },

    /// More images than a variant may hold.
    #[error("A variant can hold at most {max} images, got {requested}")]
    ImageCapExceeded { max: usize, requested: usize },

    /// Persisted images must flag exactly one main image.
    #[error("Variant {sku} must have exactly one main image, found {found}")]
    MainImageMismatch { sku: String, found: usize },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
