//! # Stock Ledger
//!
//! Reason-coded stock adjustments and the append-only stock log.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        apply_adjustment                                 │
//! │                                                                         │
//! │  AdjustmentRequest { reason, amount, description, scarcity_stock? }    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. amount ≠ 0, description non-empty         → ValidationError        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. sign_policy(reason) → signed delta                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. stock == 0 ∧ delta < 0 ?                                           │
//! │       ├── yes → reason := ReturnRestock, delta := +|amount|            │
//! │       │         (reported as a ReasonSubstitution)                     │
//! │       ▼                                                                 │
//! │  4. stock + delta ≥ 0                         → else NegativeStock     │
//! │  5. scarcity ≤ stock + delta                  → else ScarcityExceeds   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  6. StockLogEntry appended, AdjustmentOutcome returned                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is clamped. An adjustment either lands exactly as signed or fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ConstraintError, CoreResult, ValidationError};
use crate::types::{StockLogEntry, StockReason, Variant};
use crate::validation::{
    parse_amount, parse_count, validate_description, validate_scarcity, ValidationResult,
};

// =============================================================================
// Sign Policy
// =============================================================================

/// How a reason turns the typed amount into a signed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignPolicy {
    /// `delta = -|amount|`
    ForceNegative,
    /// `delta = +|amount|`
    ForcePositive,
    /// `delta = amount`
    KeepSign,
}

impl SignPolicy {
    /// `None` when `|amount|` does not fit in an `i64` (only `i64::MIN`).
    pub fn apply(self, amount: i64) -> Option<i64> {
        match self {
            SignPolicy::ForceNegative => amount.checked_abs().map(|a| -a),
            SignPolicy::ForcePositive => amount.checked_abs(),
            SignPolicy::KeepSign => Some(amount),
        }
    }
}

/// The sign policy of each reason.
pub const fn sign_policy(reason: StockReason) -> SignPolicy {
    match reason {
        StockReason::Damaged | StockReason::TheftLost => SignPolicy::ForceNegative,
        StockReason::ReturnRestock => SignPolicy::ForcePositive,
        StockReason::Correction => SignPolicy::KeepSign,
    }
}

/// Signed delta for `amount` under `reason`.
///
/// ## Example
/// ```rust
/// use stockroom_core::ledger::signed_delta;
/// use stockroom_core::types::StockReason;
///
/// assert_eq!(signed_delta(StockReason::Damaged, 3), Some(-3));
/// assert_eq!(signed_delta(StockReason::ReturnRestock, -3), Some(3));
/// assert_eq!(signed_delta(StockReason::Correction, -3), Some(-3));
/// assert_eq!(signed_delta(StockReason::Damaged, i64::MIN), None);
/// ```
pub fn signed_delta(reason: StockReason, amount: i64) -> Option<i64> {
    sign_policy(reason).apply(amount)
}

fn amount_out_of_range(stock: i64) -> ValidationError {
    ValidationError::OutOfRange {
        field: "amount".to_string(),
        min: 0i64.saturating_sub(stock),
        max: i64::MAX.saturating_sub(stock),
    }
}

// =============================================================================
// Requests and Outcomes
// =============================================================================

/// One stock adjustment as submitted from the adjustment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    pub reason: StockReason,
    /// Raw amount as typed; its sign is only honoured for `Correction`.
    pub amount: i64,
    pub description: String,
    /// New scarcity threshold to store alongside the adjustment.
    pub scarcity_stock: Option<i64>,
}

impl AdjustmentRequest {
    pub fn new(reason: StockReason, amount: i64, description: impl Into<String>) -> Self {
        AdjustmentRequest {
            reason,
            amount,
            description: description.into(),
            scarcity_stock: None,
        }
    }

    /// Builds a request from raw form text.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::ledger::AdjustmentRequest;
    /// use stockroom_core::types::StockReason;
    ///
    /// let request = AdjustmentRequest::from_input("theft_lost", "2", "shelf empty", "").unwrap();
    /// assert_eq!(request.reason, StockReason::TheftLost);
    /// assert_eq!(request.scarcity_stock, None);
    ///
    /// assert!(AdjustmentRequest::from_input("", "2", "x", "").is_err());
    /// assert!(AdjustmentRequest::from_input("damaged", "two", "x", "").is_err());
    /// ```
    pub fn from_input(
        reason: &str,
        amount: &str,
        description: &str,
        scarcity_stock: &str,
    ) -> ValidationResult<Self> {
        Ok(AdjustmentRequest {
            reason: reason.parse()?,
            amount: parse_amount(amount)?,
            description: validate_description(description)?,
            scarcity_stock: parse_count("scarcity_stock", scarcity_stock)?,
        })
    }

    /// Sets the scarcity threshold to store with the adjustment.
    pub fn with_scarcity(mut self, scarcity_stock: i64) -> Self {
        self.scarcity_stock = Some(scarcity_stock);
        self
    }
}

/// Reports that zero-stock auto-correction rewrote the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonSubstitution {
    pub requested: StockReason,
    pub applied: StockReason,
}

/// A validated adjustment that has not been recorded yet.
///
/// Produced by [`StockLedger::plan`] so a caller can check everything locally
/// before handing the delta to a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAdjustment {
    pub reason: StockReason,
    pub delta: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub description: String,
    pub scarcity_stock: Option<i64>,
    pub substitution: Option<ReasonSubstitution>,
}

/// Result of a recorded adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentOutcome {
    pub new_stock: i64,
    pub entry: StockLogEntry,
    pub substitution: Option<ReasonSubstitution>,
}

// =============================================================================
// Stock Log
// =============================================================================

/// Append-only log of stock changes, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StockLog {
    entries: Vec<StockLogEntry>,
}

impl StockLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Returns `false` if an entry with the same id is
    /// already present, in which case nothing changes.
    pub fn append(&mut self, entry: StockLogEntry) -> bool {
        if self.entries.iter().any(|e| e.id() == entry.id()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Entries for a variant, oldest first.
    pub fn entries_for<'a>(&'a self, variant_id: &'a str) -> impl Iterator<Item = &'a StockLogEntry> {
        self.entries.iter().filter(move |e| e.variant_id() == variant_id)
    }

    /// Most recent entry for a variant.
    pub fn latest_for(&self, variant_id: &str) -> Option<&StockLogEntry> {
        self.entries.iter().rev().find(|e| e.variant_id() == variant_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Applies reason-coded adjustments and keeps the resulting log.
#[derive(Debug, Default)]
pub struct StockLedger {
    log: StockLog,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates an adjustment against the variant without recording it.
    pub fn plan(variant: &Variant, request: &AdjustmentRequest) -> CoreResult<PlannedAdjustment> {
        if request.amount == 0 {
            return Err(ValidationError::MustBeNonZero {
                field: "amount".to_string(),
            }
            .into());
        }
        let description = validate_description(&request.description)?;

        let mut reason = request.reason;
        let mut delta = signed_delta(reason, request.amount)
            .ok_or_else(|| amount_out_of_range(variant.stock))?;
        let mut substitution = None;

        if variant.stock == 0 && delta < 0 {
            let applied = StockReason::ReturnRestock;
            debug!(
                variant_id = %variant.id,
                requested = %reason,
                applied = %applied,
                amount = request.amount,
                "Zero stock: recording adjustment as a restock"
            );
            substitution = Some(ReasonSubstitution {
                requested: reason,
                applied,
            });
            reason = applied;
            delta = signed_delta(applied, request.amount)
                .ok_or_else(|| amount_out_of_range(variant.stock))?;
        }

        let stock_after = variant
            .stock
            .checked_add(delta)
            .ok_or_else(|| amount_out_of_range(variant.stock))?;
        if stock_after < 0 {
            return Err(ConstraintError::NegativeStock {
                sku: variant.sku.clone(),
                stock_before: variant.stock,
                delta,
            }
            .into());
        }

        let scarcity = request.scarcity_stock.unwrap_or(variant.scarcity_stock);
        if scarcity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "scarcity_stock".to_string(),
                min: 0,
                max: stock_after,
            }
            .into());
        }
        validate_scarcity(scarcity, stock_after)?;

        Ok(PlannedAdjustment {
            reason,
            delta,
            stock_before: variant.stock,
            stock_after,
            description,
            scarcity_stock: request.scarcity_stock,
            substitution,
        })
    }

    /// Builds a log entry for an already-validated change.
    pub fn record(
        variant: &Variant,
        reason: StockReason,
        delta: i64,
        description: impl Into<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> StockLogEntry {
        StockLogEntry::new(
            Uuid::new_v4().to_string(),
            variant.id.clone(),
            reason,
            delta,
            variant.stock,
            description.into(),
            actor.to_string(),
            now,
        )
    }

    /// Validates, signs and records one adjustment.
    pub fn apply_adjustment(
        &mut self,
        variant: &Variant,
        request: &AdjustmentRequest,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<AdjustmentOutcome> {
        let plan = Self::plan(variant, request)?;
        let entry = Self::record(variant, plan.reason, plan.delta, plan.description, actor, now);

        info!(
            variant_id = %variant.id,
            reason = %entry.reason(),
            delta = entry.delta(),
            stock_after = entry.stock_after(),
            "Stock adjusted"
        );

        self.log.append(entry.clone());
        Ok(AdjustmentOutcome {
            new_stock: plan.stock_after,
            entry,
            substitution: plan.substitution,
        })
    }

    /// Adds an entry produced elsewhere, e.g. returned by a collaborator.
    pub fn record_entry(&mut self, entry: StockLogEntry) -> bool {
        self.log.append(entry)
    }

    pub fn log(&self) -> &StockLog {
        &self.log
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
