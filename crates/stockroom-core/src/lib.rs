//! # stockroom-core: Pure Inventory Ledger Logic
//!
//! This crate holds every rule that governs a product variant's stock,
//! pricing, images and batches, as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Admin UI intents (edit, adjust, restock, toggle)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        stockroom-session (VariantMutationCoordinator)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockroom-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────┐ │   │
//! │  │   │  money   │ │validation│ │  ledger  │ │  batch   │ │images│ │   │
//! │  │   │  Margin  │ │ Pricing  │ │  Stock   │ │  Batch   │ │ Set  │ │   │
//! │  │   │          │ │Validator │ │  Ledger  │ │ Manager  │ │Recon.│ │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘ └──────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Variant, StockLogEntry, images, reasons, batch identity
//! - [`money`] - Money (integer cents) and the margin calculator
//! - [`error`] - Validation and constraint errors
//! - [`validation`] - Field diffing, pricing and activation checks
//! - [`ledger`] - Reason-coded stock adjustments and the append-only log
//! - [`batch`] - Batch numbering and restock rows
//! - [`images`] - Image working set, cap, main image, commit diff
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::ledger::{AdjustmentRequest, StockLedger};
//! use stockroom_core::types::StockReason;
//! # use stockroom_core::types::{OptionValue, Variant};
//! # let variant = Variant {
//! #     id: "v1".into(), product_id: "p1".into(), sku: "TEE-M".into(),
//! #     price_cents: 2500, compare_at_price_cents: None, cost_per_item_cents: 900,
//! #     stock: 0, scarcity_stock: 0, batch_number: 1, is_active: false,
//! #     option_values: vec![OptionValue::new("Size", "M")], images: vec![],
//! #     supplier_id: None, shipment_id: None, created_at: chrono::Utc::now(),
//! # };
//!
//! let mut ledger = StockLedger::new();
//! let request = AdjustmentRequest::new(StockReason::Damaged, 5, "box arrived crushed");
//!
//! // Nothing to write off at zero stock: the entry is recorded as a restock.
//! let outcome = ledger
//!     .apply_adjustment(&variant, &request, "alice", chrono::Utc::now())
//!     .unwrap();
//! assert_eq!(outcome.entry.reason(), StockReason::ReturnRestock);
//! assert_eq!(outcome.new_stock, 5);
//! assert!(outcome.substitution.is_some());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod error;
pub mod images;
pub mod ledger;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ConstraintError, CoreError, CoreResult, ValidationError};
pub use money::{margin, Margin, Money};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum images a variant may hold (persisted-not-deleted + pending adds).
pub const MAX_VARIANT_IMAGES: usize = 5;

/// Maximum SKU length accepted by the edit form.
pub const MAX_SKU_LENGTH: usize = 50;

/// Batch number of the first lot of any product/option combination.
pub const FIRST_BATCH_NUMBER: i64 = 1;
