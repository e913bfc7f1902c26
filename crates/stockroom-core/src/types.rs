//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │    Variant       │   │  StockLogEntry   │   │  PersistedImage  │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  id (UUID)       │◄──│  variant_id      │   │  id              │    │
//! │  │  product_id      │   │  reason, delta   │   │  url, is_main    │    │
//! │  │  sku             │   │  before / after  │   └──────────────────┘    │
//! │  │  price, cost     │   │  performed_by    │                            │
//! │  │  stock, scarcity │   └──────────────────┘   ┌──────────────────┐    │
//! │  │  batch_number    │                          │  BatchIdentity   │    │
//! │  │  option_values   │─────────────────────────►│  product_id +    │    │
//! │  └──────────────────┘                          │  option signature│    │
//! │                                                └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A variant is created by the product-creation flow and is never deleted,
//! only deactivated. Log entries are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{ConstraintError, ValidationError};
use crate::money::Money;
use crate::MAX_VARIANT_IMAGES;

// =============================================================================
// Option Values
// =============================================================================

/// One selected option of a variant, e.g. `size = M`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OptionValue {
    pub name: String,
    pub value: String,
}

impl OptionValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        OptionValue {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Canonical signature of an option combination.
///
/// Pairs are trimmed, lower-cased and sorted so `Color=Red, Size=M` and
/// `size=m, color=red` describe the same combination.
///
/// ## Example
/// ```rust
/// use stockroom_core::types::{option_signature, OptionValue};
///
/// let a = option_signature(&[OptionValue::new("Color", "Red"), OptionValue::new("Size", "M")]);
/// let b = option_signature(&[OptionValue::new("size", "m "), OptionValue::new("color", "red")]);
/// assert_eq!(a, b);
/// ```
pub fn option_signature(values: &[OptionValue]) -> String {
    let mut pairs: Vec<String> = values
        .iter()
        .map(|v| {
            format!(
                "{}={}",
                v.name.trim().to_lowercase(),
                v.value.trim().to_lowercase()
            )
        })
        .collect();
    pairs.sort();
    pairs.join("|")
}

// =============================================================================
// Batch Identity
// =============================================================================

/// Identity under which batch numbers increase: one product, one option
/// combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchIdentity {
    pub product_id: String,
    pub option_signature: String,
}

impl BatchIdentity {
    /// The identity a variant belongs to.
    pub fn of(variant: &Variant) -> Self {
        BatchIdentity {
            product_id: variant.product_id.clone(),
            option_signature: option_signature(&variant.option_values),
        }
    }
}

impl fmt::Display for BatchIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.product_id, self.option_signature)
    }
}

// =============================================================================
// Images
// =============================================================================

/// An image already stored for a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PersistedImage {
    pub id: String,
    pub url: String,
    pub is_main: bool,
}

/// Where an image in the working set comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ImageSource {
    /// Already stored; `key` is the image id.
    Persisted,
    /// Added in this edit session; `key` is a pending token.
    Pending,
}

/// One entry of a variant's effective image list, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImageRef {
    /// Image id for persisted images, pending token otherwise.
    pub key: String,
    pub source: ImageSource,
    pub is_main: bool,
    pub order: u32,
}

// =============================================================================
// Variant
// =============================================================================

/// A sellable variant of a product: one option combination, one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Variant {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Product this variant belongs to.
    pub product_id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Selling price in cents.
    pub price_cents: i64,

    /// "Was" price in cents, shown as a discount reference.
    pub compare_at_price_cents: Option<i64>,

    /// Purchase cost per item in cents. Zero means not yet set.
    pub cost_per_item_cents: i64,

    /// Units on hand. Never negative.
    pub stock: i64,

    /// Low-stock threshold. Never above `stock`.
    pub scarcity_stock: i64,

    /// Lot number within the batch identity, starting at 1.
    pub batch_number: i64,

    /// Whether the variant is offered for sale.
    pub is_active: bool,

    /// Ordered option values identifying the combination.
    pub option_values: Vec<OptionValue>,

    /// Stored images in display order.
    pub images: Vec<PersistedImage>,

    pub supplier_id: Option<String>,

    pub shipment_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Variant {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the cost per item as Money.
    #[inline]
    pub fn cost_per_item(&self) -> Money {
        Money::from_cents(self.cost_per_item_cents)
    }

    /// Returns the compare-at price as Money, if set.
    #[inline]
    pub fn compare_at_price(&self) -> Option<Money> {
        self.compare_at_price_cents.map(Money::from_cents)
    }

    /// The batch identity of this variant.
    pub fn batch_identity(&self) -> BatchIdentity {
        BatchIdentity::of(self)
    }

    /// Whether the activation gate (`price > 0 ∧ cost > 0`) is open.
    pub fn can_activate(&self) -> bool {
        self.price_cents > 0 && self.cost_per_item_cents > 0
    }

    /// Whether stock has reached the scarcity threshold.
    pub fn is_scarce(&self) -> bool {
        self.scarcity_stock > 0 && self.stock <= self.scarcity_stock
    }

    /// Checks every invariant that must hold after a mutation.
    pub fn check_invariants(&self) -> Result<(), ConstraintError> {
        if self.stock < 0 {
            return Err(ConstraintError::NegativeStock {
                sku: self.sku.clone(),
                stock_before: self.stock,
                delta: 0,
            });
        }

        if self.scarcity_stock > self.stock {
            return Err(ConstraintError::ScarcityExceedsStock {
                scarcity: self.scarcity_stock,
                stock: self.stock,
            });
        }

        if self.is_active {
            if self.price_cents <= 0 {
                return Err(ConstraintError::ActivationRequiresPricing {
                    sku: self.sku.clone(),
                    field: VariantField::Price.to_string(),
                });
            }
            if self.cost_per_item_cents <= 0 {
                return Err(ConstraintError::ActivationRequiresPricing {
                    sku: self.sku.clone(),
                    field: VariantField::CostPerItem.to_string(),
                });
            }
        }

        if self.images.len() > MAX_VARIANT_IMAGES {
            return Err(ConstraintError::ImageCapExceeded {
                max: MAX_VARIANT_IMAGES,
                requested: self.images.len(),
            });
        }

        let mains = self.images.iter().filter(|i| i.is_main).count();
        if !self.images.is_empty() && mains != 1 {
            return Err(ConstraintError::MainImageMismatch {
                sku: self.sku.clone(),
                found: mains,
            });
        }

        Ok(())
    }
}

// =============================================================================
// Editable Fields
// =============================================================================

/// Fields that the edit form can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum VariantField {
    Sku,
    Price,
    CompareAtPrice,
    CostPerItem,
    ScarcityStock,
    SupplierId,
    ShipmentId,
}

impl VariantField {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantField::Sku => "sku",
            VariantField::Price => "price",
            VariantField::CompareAtPrice => "compare_at_price",
            VariantField::CostPerItem => "cost_per_item",
            VariantField::ScarcityStock => "scarcity_stock",
            VariantField::SupplierId => "supplier_id",
            VariantField::ShipmentId => "shipment_id",
        }
    }
}

impl fmt::Display for VariantField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw form input for an edit. `None` means the field was not touched;
/// `Some("")` means it was cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProposedFields {
    pub sku: Option<String>,
    pub price: Option<String>,
    pub compare_at_price: Option<String>,
    pub cost_per_item: Option<String>,
    pub scarcity_stock: Option<String>,
    pub supplier_id: Option<String>,
    pub shipment_id: Option<String>,
}

impl ProposedFields {
    /// Whether no field was touched at all.
    pub fn is_untouched(&self) -> bool {
        *self == ProposedFields::default()
    }
}

// =============================================================================
// Stock Reasons
// =============================================================================

/// Why a stock count changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StockReason {
    /// Manual recount; the caller's sign is kept.
    Correction,
    /// Units broken or unsellable.
    Damaged,
    /// Units stolen or missing.
    TheftLost,
    /// Units coming back into stock (returns, restocks, new batches).
    ReturnRestock,
}

impl StockReason {
    /// Every reason, in the order the adjustment form lists them.
    pub const ALL: [StockReason; 4] = [
        StockReason::Correction,
        StockReason::Damaged,
        StockReason::TheftLost,
        StockReason::ReturnRestock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockReason::Correction => "correction",
            StockReason::Damaged => "damaged",
            StockReason::TheftLost => "theft_lost",
            StockReason::ReturnRestock => "return_restock",
        }
    }
}

impl fmt::Display for StockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::required("reason"));
        }
        StockReason::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "reason".to_string(),
                allowed: StockReason::ALL.iter().map(|r| r.to_string()).collect(),
            })
    }
}

// =============================================================================
// Stock Log Entry
// =============================================================================

/// An immutable record of one stock change.
///
/// Fields are private and only readable: entries are built by the ledger
/// (or decoded from the persistence collaborator) and never changed after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StockLogEntry {
    id: String,
    variant_id: String,
    reason: StockReason,
    delta: i64,
    stock_before: i64,
    stock_after: i64,
    description: String,
    performed_by: String,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
}

impl StockLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        variant_id: String,
        reason: StockReason,
        delta: i64,
        stock_before: i64,
        description: String,
        performed_by: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        StockLogEntry {
            id,
            variant_id,
            reason,
            delta,
            stock_before,
            stock_after: stock_before.saturating_add(delta),
            description,
            performed_by,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    pub fn reason(&self) -> StockReason {
        self.reason
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn stock_before(&self) -> i64 {
        self.stock_before
    }

    pub fn stock_after(&self) -> i64 {
        self.stock_after
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn performed_by(&self) -> &str {
        &self.performed_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// =============================================================================
// Activation
// =============================================================================

/// Two-phase state of an activation flip.
///
/// ```text
///             setActive ok
/// Pending ─────────────────► Confirmed { is_active }
///    │
///    │  conflict / transport failure
///    └─────────────────────► RolledBack { restored }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "phase", rename_all = "snake_case")]
#[ts(export)]
pub enum ActivationPhase {
    Pending { optimistic: bool },
    Confirmed { is_active: bool },
    RolledBack { restored: bool },
}

impl ActivationPhase {
    /// Whether the phase is final.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ActivationPhase::Pending { .. })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
