//! # Batch Manager
//!
//! Batch numbering and new restock rows.
//!
//! ```text
//! product "tee", option combination color=red|size=m
//!
//!   batch 1 ── batch 2 ── batch 4        next_batch_number = max + 1 = 5
//!
//! A different combination (color=blue|size=m) numbers independently.
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{ConstraintError, CoreResult, ValidationError};
use crate::ledger::StockLedger;
use crate::money::Money;
use crate::types::{StockLogEntry, StockReason, Variant};
use crate::FIRST_BATCH_NUMBER;

/// Next batch number for a set of variants sharing one batch identity.
///
/// ## Example
/// ```rust
/// use stockroom_core::batch::next_batch_number;
///
/// assert_eq!(next_batch_number(std::iter::empty()), 1);
/// assert_eq!(next_batch_number([1, 2, 4]), 5);
/// ```
pub fn next_batch_number(existing: impl IntoIterator<Item = i64>) -> i64 {
    existing
        .into_iter()
        .max()
        .map_or(FIRST_BATCH_NUMBER, |max| max.max(0) + 1)
}

/// Payload of the "new batch" form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub amount: i64,
    pub price: Money,
    pub cost_per_item: Money,
    pub scarcity_stock: i64,
}

impl BatchRequest {
    /// ## Rules
    /// - `amount > 0`
    /// - `price > 0`, `cost_per_item > 0`
    /// - `0 ≤ scarcity_stock ≤ amount`
    pub fn validate(&self) -> CoreResult<()> {
        if self.amount <= 0 {
            return Err(ValidationError::must_be_positive("amount").into());
        }
        if !self.price.is_positive() {
            return Err(ValidationError::must_be_positive("price").into());
        }
        if !self.cost_per_item.is_positive() {
            return Err(ValidationError::must_be_positive("cost_per_item").into());
        }
        if self.scarcity_stock < 0 {
            return Err(ValidationError::OutOfRange {
                field: "scarcity_stock".to_string(),
                min: 0,
                max: self.amount,
            }
            .into());
        }
        if self.scarcity_stock > self.amount {
            return Err(ConstraintError::ScarcityExceedsStock {
                scarcity: self.scarcity_stock,
                stock: self.amount,
            }
            .into());
        }
        Ok(())
    }
}

/// A batch row ready to persist, with its seed log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBatch {
    pub variant: Variant,
    pub seed_entry: StockLogEntry,
}

pub struct BatchManager;

impl BatchManager {
    /// Creates the next batch of `source`'s product/option combination.
    ///
    /// `siblings` may contain any variants; only those sharing `source`'s
    /// batch identity count towards numbering. `source` itself is always
    /// counted.
    pub fn create_batch<'a>(
        source: &Variant,
        siblings: impl IntoIterator<Item = &'a Variant>,
        request: &BatchRequest,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<NewBatch> {
        request.validate()?;

        let identity = source.batch_identity();
        let existing = siblings
            .into_iter()
            .filter(|v| v.batch_identity() == identity)
            .map(|v| v.batch_number)
            .chain(std::iter::once(source.batch_number));
        let batch_number = next_batch_number(existing);

        let empty = Variant {
            id: Uuid::new_v4().to_string(),
            product_id: source.product_id.clone(),
            sku: source.sku.clone(),
            price_cents: request.price.cents(),
            compare_at_price_cents: source.compare_at_price_cents,
            cost_per_item_cents: request.cost_per_item.cents(),
            stock: 0,
            scarcity_stock: 0,
            batch_number,
            is_active: false,
            option_values: source.option_values.clone(),
            images: Vec::new(),
            supplier_id: source.supplier_id.clone(),
            shipment_id: source.shipment_id.clone(),
            created_at: now,
        };

        let seed_entry = StockLedger::record(
            &empty,
            StockReason::ReturnRestock,
            request.amount,
            format!("Batch {} received", batch_number),
            actor,
            now,
        );

        let variant = Variant {
            stock: request.amount,
            scarcity_stock: request.scarcity_stock,
            ..empty
        };
        variant.check_invariants()?;

        info!(
            identity = %identity,
            batch_number,
            amount = request.amount,
            "Created batch"
        );

        Ok(NewBatch {
            variant,
            seed_entry,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
