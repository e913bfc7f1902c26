//! # Validation Module
//!
//! Input parsing, field diffing and pricing rules for variant edits.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Edit Validation Pipeline                           │
//! │                                                                         │
//! │  ProposedFields (raw form text)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  diff_changed_fields ── parse each touched field, keep only the ones   │
//! │       │                 whose VALUE differs ("" ≡ absent, "5" ≡ "5.00")│
//! │       ▼                                                                 │
//! │  validate_field_change ── signs, compare-at, activation gate           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_scarcity ── scarcity ≤ stock                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  FieldChanges ready for the persistence collaborator                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{ConstraintError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{ProposedFields, Variant, VariantField};
use crate::MAX_SKU_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, digits, hyphens, underscores
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_sku;
///
/// assert!(validate_sku("TEE-RED-M").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.chars().count() > MAX_SKU_LENGTH {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LENGTH,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a ledger description and returns it trimmed.
pub fn validate_description(description: &str) -> ValidationResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(ValidationError::required("description"));
    }
    Ok(description.to_string())
}

// =============================================================================
// Numeric Parsers
// =============================================================================

/// Parses a stock amount typed into the adjustment form.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::parse_amount;
///
/// assert_eq!(parse_amount(" -4 ").unwrap(), -4);
/// assert!(parse_amount("2.5").is_err());
/// assert!(parse_amount("").is_err());
/// ```
pub fn parse_amount(text: &str) -> ValidationResult<i64> {
    parse_count("amount", text)?.ok_or_else(|| ValidationError::required("amount"))
}

/// Parses an integer field; empty text is `None`.
pub fn parse_count(field: &str, text: &str) -> ValidationResult<Option<i64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<i64>()
        .map(Some)
        .map_err(|_| ValidationError::NotAnInteger {
            field: field.to_string(),
            value: text.to_string(),
        })
}

fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Field Changes
// =============================================================================

/// One field whose value differs from the persisted variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    Sku(String),
    Price(Money),
    CompareAtPrice(Option<Money>),
    CostPerItem(Money),
    ScarcityStock(i64),
    SupplierId(Option<String>),
    ShipmentId(Option<String>),
}

impl FieldChange {
    pub fn field(&self) -> VariantField {
        match self {
            FieldChange::Sku(_) => VariantField::Sku,
            FieldChange::Price(_) => VariantField::Price,
            FieldChange::CompareAtPrice(_) => VariantField::CompareAtPrice,
            FieldChange::CostPerItem(_) => VariantField::CostPerItem,
            FieldChange::ScarcityStock(_) => VariantField::ScarcityStock,
            FieldChange::SupplierId(_) => VariantField::SupplierId,
            FieldChange::ShipmentId(_) => VariantField::ShipmentId,
        }
    }

    fn apply(&self, variant: &mut Variant) {
        match self {
            FieldChange::Sku(sku) => variant.sku = sku.clone(),
            FieldChange::Price(price) => variant.price_cents = price.cents(),
            FieldChange::CompareAtPrice(price) => {
                variant.compare_at_price_cents = price.map(|p| p.cents())
            }
            FieldChange::CostPerItem(cost) => variant.cost_per_item_cents = cost.cents(),
            FieldChange::ScarcityStock(scarcity) => variant.scarcity_stock = *scarcity,
            FieldChange::SupplierId(id) => variant.supplier_id = id.clone(),
            FieldChange::ShipmentId(id) => variant.shipment_id = id.clone(),
        }
    }
}

/// The set of changed fields with their parsed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    changes: Vec<FieldChange>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// Names of the changed fields.
    pub fn fields(&self) -> BTreeSet<VariantField> {
        self.changes.iter().map(FieldChange::field).collect()
    }

    pub fn contains(&self, field: VariantField) -> bool {
        self.changes.iter().any(|c| c.field() == field)
    }

    /// The variant as it would read once these changes are persisted.
    pub fn applied_to(&self, variant: &Variant) -> Variant {
        let mut next = variant.clone();
        for change in &self.changes {
            change.apply(&mut next);
        }
        next
    }
}

/// Computes which fields actually change.
///
/// Comparison is by parsed value: `"25"` and `"25.00"` are the same price,
/// and an empty string equals an absent value. Cleared price, cost and
/// scarcity read as zero, as numeric form fields do.
///
/// ## Example
/// ```rust
/// use stockroom_core::types::{ProposedFields, VariantField};
/// use stockroom_core::validation::diff_changed_fields;
/// # use stockroom_core::types::{OptionValue, Variant};
/// # let variant = Variant {
/// #     id: "v1".into(), product_id: "p1".into(), sku: "TEE-M".into(),
/// #     price_cents: 2500, compare_at_price_cents: None, cost_per_item_cents: 900,
/// #     stock: 4, scarcity_stock: 0, batch_number: 1, is_active: false,
/// #     option_values: vec![OptionValue::new("Size", "M")], images: vec![],
/// #     supplier_id: None, shipment_id: None, created_at: chrono::Utc::now(),
/// # };
///
/// let proposed = ProposedFields {
///     price: Some("25.00".into()),        // same value
///     compare_at_price: Some("".into()),  // "" ≡ None
///     cost_per_item: Some("9.50".into()), // changed
///     ..Default::default()
/// };
/// let changes = diff_changed_fields(&variant, &proposed).unwrap();
/// assert_eq!(changes.fields().into_iter().collect::<Vec<_>>(), vec![VariantField::CostPerItem]);
/// ```
pub fn diff_changed_fields(
    current: &Variant,
    proposed: &ProposedFields,
) -> ValidationResult<FieldChanges> {
    let mut changes = Vec::new();

    if let Some(sku) = proposed.sku.as_deref() {
        let sku = sku.trim();
        if sku != current.sku {
            validate_sku(sku)?;
            changes.push(FieldChange::Sku(sku.to_string()));
        }
    }

    if let Some(text) = proposed.price.as_deref() {
        let price = Money::parse_field("price", text)?.unwrap_or_default();
        if price != current.price() {
            changes.push(FieldChange::Price(price));
        }
    }

    if let Some(text) = proposed.compare_at_price.as_deref() {
        let compare_at = Money::parse_field("compare_at_price", text)?;
        if compare_at != current.compare_at_price() {
            changes.push(FieldChange::CompareAtPrice(compare_at));
        }
    }

    if let Some(text) = proposed.cost_per_item.as_deref() {
        let cost = Money::parse_field("cost_per_item", text)?.unwrap_or_default();
        if cost != current.cost_per_item() {
            changes.push(FieldChange::CostPerItem(cost));
        }
    }

    if let Some(text) = proposed.scarcity_stock.as_deref() {
        let scarcity = parse_count("scarcity_stock", text)?.unwrap_or(0);
        if scarcity != current.scarcity_stock {
            changes.push(FieldChange::ScarcityStock(scarcity));
        }
    }

    if let Some(text) = proposed.supplier_id.as_deref() {
        let supplier = normalize_text(Some(text));
        if supplier != normalize_text(current.supplier_id.as_deref()) {
            changes.push(FieldChange::SupplierId(supplier));
        }
    }

    if let Some(text) = proposed.shipment_id.as_deref() {
        let shipment = normalize_text(Some(text));
        if shipment != normalize_text(current.shipment_id.as_deref()) {
            changes.push(FieldChange::ShipmentId(shipment));
        }
    }

    debug!(variant_id = %current.id, changed = changes.len(), "Diffed variant fields");
    Ok(FieldChanges { changes })
}

// =============================================================================
// Pricing Rules
// =============================================================================

/// Validates a set of field changes against the variant they apply to.
///
/// ## Rules
/// - price, cost per item and scarcity must not be negative
/// - a compare-at price, when set, must be positive
/// - an active variant cannot have its price or cost set to zero or below
pub fn validate_field_change(variant: &Variant, changes: &FieldChanges) -> CoreResult<()> {
    for change in changes.iter() {
        match change {
            FieldChange::Price(price) | FieldChange::CostPerItem(price) => {
                let field = change.field();
                if price.cents() < 0 {
                    return Err(ValidationError::OutOfRange {
                        field: field.to_string(),
                        min: 0,
                        max: i64::MAX,
                    }
                    .into());
                }
                if variant.is_active && !price.is_positive() {
                    return Err(ConstraintError::ActivationRequiresPricing {
                        sku: variant.sku.clone(),
                        field: field.to_string(),
                    }
                    .into());
                }
            }
            FieldChange::CompareAtPrice(Some(price)) if !price.is_positive() => {
                return Err(ValidationError::must_be_positive("compare_at_price").into());
            }
            FieldChange::ScarcityStock(scarcity) if *scarcity < 0 => {
                return Err(ValidationError::OutOfRange {
                    field: "scarcity_stock".to_string(),
                    min: 0,
                    max: i64::MAX,
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(())
}

/// Validates a scarcity threshold against the stock it refers to.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_scarcity;
///
/// assert!(validate_scarcity(5, 5).is_ok());
/// assert!(validate_scarcity(10, 5).is_err());
/// ```
pub fn validate_scarcity(proposed_scarcity: i64, reference_stock: i64) -> Result<(), ConstraintError> {
    if proposed_scarcity > reference_stock {
        return Err(ConstraintError::ScarcityExceedsStock {
            scarcity: proposed_scarcity,
            stock: reference_stock,
        });
    }
    Ok(())
}

/// Validates the `Inactive → Active` transition.
pub fn validate_activation(variant: &Variant) -> Result<(), ConstraintError> {
    if variant.price_cents <= 0 {
        return Err(ConstraintError::ActivationRequiresPricing {
            sku: variant.sku.clone(),
            field: VariantField::Price.to_string(),
        });
    }
    if variant.cost_per_item_cents <= 0 {
        return Err(ConstraintError::ActivationRequiresPricing {
            sku: variant.sku.clone(),
            field: VariantField::CostPerItem.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::tests::test_variant;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TEE-RED-M").is_ok());
        assert!(validate_sku("tee_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("5").unwrap(), 5);
        assert_eq!(parse_amount("-3").unwrap(), -3);
        assert!(matches!(
            parse_amount("2.5"),
            Err(ValidationError::NotAnInteger { .. })
        ));
        assert!(matches!(parse_amount(" "), Err(ValidationError::Required { .. })));
    }

    #[test]
    fn test_validate_description_trims() {
        assert_eq!(validate_description("  recount  ").unwrap(), "recount");
        assert!(validate_description(" \n ").is_err());
    }

    #[test]
    fn test_diff_ignores_equivalent_values() {
        let variant = test_variant("1", 10);
        let proposed = ProposedFields {
            sku: Some(" TEE-1 ".into()),
            price: Some("25".into()),
            compare_at_price: Some("".into()),
            cost_per_item: Some("10.0".into()),
            scarcity_stock: Some("0".into()),
            supplier_id: Some("  ".into()),
            shipment_id: None,
        };
        let changes = diff_changed_fields(&variant, &proposed).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diff_reports_changed_fields() {
        let variant = test_variant("1", 10);
        let proposed = ProposedFields {
            price: Some("29.99".into()),
            scarcity_stock: Some("3".into()),
            supplier_id: Some("sup-7".into()),
            ..Default::default()
        };
        let changes = diff_changed_fields(&variant, &proposed).unwrap();

        assert_eq!(
            changes.fields(),
            BTreeSet::from([
                VariantField::Price,
                VariantField::ScarcityStock,
                VariantField::SupplierId
            ])
        );

        let next = changes.applied_to(&variant);
        assert_eq!(next.price_cents, 2999);
        assert_eq!(next.scarcity_stock, 3);
        assert_eq!(next.supplier_id.as_deref(), Some("sup-7"));
    }

    #[test]
    fn test_diff_rejects_unparseable_input() {
        let variant = test_variant("1", 10);
        let proposed = ProposedFields {
            scarcity_stock: Some("many".into()),
            ..Default::default()
        };
        assert!(diff_changed_fields(&variant, &proposed).is_err());
    }

    #[test]
    fn test_active_variant_cannot_zero_price() {
        let mut variant = test_variant("1", 10);
        variant.is_active = true;

        let proposed = ProposedFields {
            price: Some("0".into()),
            ..Default::default()
        };
        let changes = diff_changed_fields(&variant, &proposed).unwrap();
        let err = validate_field_change(&variant, &changes).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Constraint(ConstraintError::ActivationRequiresPricing { .. })
        ));

        // Same edit on an inactive variant is fine.
        variant.is_active = false;
        assert!(validate_field_change(&variant, &changes).is_ok());
    }

    #[test]
    fn test_negative_cost_is_a_validation_error() {
        let variant = test_variant("1", 10);
        let proposed = ProposedFields {
            cost_per_item: Some("-1".into()),
            ..Default::default()
        };
        let changes = diff_changed_fields(&variant, &proposed).unwrap();
        assert!(matches!(
            validate_field_change(&variant, &changes),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_validate_scarcity() {
        assert!(validate_scarcity(5, 5).is_ok());
        assert!(validate_scarcity(0, 0).is_ok());
        assert!(matches!(
            validate_scarcity(10, 5),
            Err(ConstraintError::ScarcityExceedsStock { scarcity: 10, stock: 5 })
        ));
    }

    #[test]
    fn test_validate_activation() {
        let mut variant = test_variant("1", 10);
        variant.price_cents = 0;
        assert!(validate_activation(&variant).is_err());

        variant.price_cents = 10000;
        variant.cost_per_item_cents = 5000;
        assert!(validate_activation(&variant).is_ok());
    }
}
