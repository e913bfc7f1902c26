//! # Money Module
//!
//! Provides the `Money` type and the margin calculator.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Admin form: price "19.90", cost "7.35"                                 │
//! │                                                                         │
//! │  As floats:  19.90 - 7.35 = 12.549999999999999  ❌                      │
//! │  As cents:   1990 - 735   = 1255                ✅                      │
//! │                                                                         │
//! │  Form text is parsed ONCE into cents (Money::parse_input) and every    │
//! │  comparison, diff and margin works on integers from then on.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::{margin, Money};
//!
//! let price = Money::parse_input("19.90").unwrap().unwrap();
//! let cost = Money::from_cents(735);
//!
//! let m = margin(price, cost).unwrap();
//! assert_eq!(m.profit.cents(), 1255);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so that a loss-making margin can be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Parses a price typed into an admin form.
    ///
    /// ## Rules
    /// ```text
    /// ""  / "   "        → Ok(None)       empty ≡ absent
    /// "12" "12.5" "12.50"→ Ok(Some(..))   at most two decimals
    /// "-3.10"            → Ok(Some(-310)) sign checks belong to the caller
    /// "abc" "NaN" "inf"  → Err(InvalidFormat)
    /// "1.999"            → Err(InvalidFormat)
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::parse_input("12.5").unwrap(), Some(Money::from_cents(1250)));
    /// assert_eq!(Money::parse_input("").unwrap(), None);
    /// assert!(Money::parse_input("NaN").is_err());
    /// ```
    pub fn parse_input(text: &str) -> Result<Option<Money>, ValidationError> {
        Self::parse_field("price", text)
    }

    /// Same as [`Money::parse_input`] but names `field` in the error.
    pub fn parse_field(field: &str, text: &str) -> Result<Option<Money>, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        // Decimal also accepts digit separators, which a price field does not.
        if text.contains('_') {
            return Err(invalid("expected a finite decimal number"));
        }
        let value =
            Decimal::from_str(text).map_err(|_| invalid("expected a finite decimal number"))?;
        if value.scale() > 2 {
            return Err(invalid("at most two decimal places"));
        }

        value
            .checked_mul(Decimal::from(100))
            .and_then(|cents| cents.to_i64())
            .map(|cents| Some(Money(cents)))
            .ok_or_else(|| invalid("value is too large"))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

// =============================================================================
// Margin Calculator
// =============================================================================

/// Profit and margin derived from a price and a cost per item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Margin {
    /// `price - cost`. Negative when selling below cost.
    pub profit: Money,

    /// `profit / price * 100`.
    pub margin_pct: f64,
}

/// Calculates profit and margin percentage.
///
/// Returns `None` when the price is zero or negative, since a margin on a
/// non-positive price is undefined.
///
/// ## Example
/// ```rust
/// use stockroom_core::money::{margin, Money};
///
/// let m = margin(Money::from_cents(10000), Money::from_cents(5000)).unwrap();
/// assert_eq!(m.profit.cents(), 5000);
/// assert_eq!(m.margin_pct, 50.0);
///
/// assert!(margin(Money::zero(), Money::from_cents(5000)).is_none());
/// ```
pub fn margin(price: Money, cost: Money) -> Option<Margin> {
    if !price.is_positive() {
        return None;
    }

    let profit = price - cost;
    let margin_pct = profit.cents() as f64 / price.cents() as f64 * 100.0;

    if !margin_pct.is_finite() {
        return None;
    }

    Some(Margin { profit, margin_pct })
}

/// Margin straight from form text, as the pricing panel shows it live.
///
/// Unparseable or non-finite input yields `None` rather than an error, since
/// the panel simply hides the margin until both inputs are usable. An empty
/// cost counts as zero.
pub fn margin_from_input(price_text: &str, cost_text: &str) -> Option<Margin> {
    let price = Money::parse_input(price_text).ok()??;
    let cost = Money::parse_field("cost per item", cost_text)
        .ok()?
        .unwrap_or_default();
    margin(price, cost)
}

// =============================================================================
// Unit Tests
// =============================================================================
