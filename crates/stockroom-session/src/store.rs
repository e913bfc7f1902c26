//! # Variant Store
//!
//! In-memory authoritative collection of variants, as last confirmed by the
//! persistence collaborator.
//!
//! ## Thread Safety
//! The map sits behind an `RwLock`:
//! 1. Reads (lookups, sibling scans) are frequent and may run concurrently
//! 2. Writes happen once per confirmed round trip
//! 3. No lock is ever held across an `.await`
//!
//! Lookups return clones, so a caller can validate against a snapshot while
//! other operations proceed.

use std::collections::BTreeMap;
use std::sync::RwLock;
use stockroom_core::Variant;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Default)]
pub struct VariantStore {
    variants: RwLock<BTreeMap<String, Variant>>,
}

impl VariantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole collection.
    pub fn load(&self, variants: Vec<Variant>) {
        let mut map = self.variants.write().expect("variant store lock poisoned");
        *map = variants.into_iter().map(|v| (v.id.clone(), v)).collect();
    }

    pub fn get(&self, id: &str) -> Option<Variant> {
        self.variants
            .read()
            .expect("variant store lock poisoned")
            .get(id)
            .cloned()
    }

    /// Looks up a variant or fails with `NotFound`.
    pub fn require(&self, id: &str) -> LedgerResult<Variant> {
        self.get(id).ok_or_else(|| LedgerError::variant_not_found(id))
    }

    /// Other variants of the same product and option combination.
    pub fn siblings_of(&self, variant: &Variant) -> Vec<Variant> {
        let identity = variant.batch_identity();
        self.variants
            .read()
            .expect("variant store lock poisoned")
            .values()
            .filter(|v| v.id != variant.id && v.batch_identity() == identity)
            .cloned()
            .collect()
    }

    /// Replaces an existing variant with its confirmed state.
    pub fn replace(&self, variant: Variant) -> LedgerResult<Variant> {
        let mut map = self.variants.write().expect("variant store lock poisoned");
        match map.get_mut(&variant.id) {
            Some(slot) => Ok(std::mem::replace(slot, variant)),
            None => Err(LedgerError::variant_not_found(&variant.id)),
        }
    }

    /// Adds a newly created variant (a new batch row).
    pub fn insert(&self, variant: Variant) {
        self.variants
            .write()
            .expect("variant store lock poisoned")
            .insert(variant.id.clone(), variant);
    }

    /// Mutates one variant in place and returns the result.
    pub fn update<F>(&self, id: &str, f: F) -> LedgerResult<Variant>
    where
        F: FnOnce(&mut Variant),
    {
        let mut map = self.variants.write().expect("variant store lock poisoned");
        let variant = map
            .get_mut(id)
            .ok_or_else(|| LedgerError::variant_not_found(id))?;
        f(variant);
        Ok(variant.clone())
    }

    pub fn all(&self) -> Vec<Variant> {
        self.variants
            .read()
            .expect("variant store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variants.read().expect("variant store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::OptionValue;

    pub(crate) fn variant(id: &str, size: &str, batch: i64, stock: i64) -> Variant {
        Variant {
            id: id.to_string(),
            product_id: "prod-hoodie".to_string(),
            sku: format!("HOOD-{}", size),
            price_cents: 4500,
            compare_at_price_cents: Some(5500),
            cost_per_item_cents: 2000,
            stock,
            scarcity_stock: 0,
            batch_number: batch,
            is_active: false,
            option_values: vec![OptionValue::new("Size", size)],
            images: Vec::new(),
            supplier_id: Some("sup-1".to_string()),
            shipment_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_load_and_get() {
        let store = VariantStore::new();
        store.load(vec![variant("a", "M", 1, 3), variant("b", "L", 1, 0)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().stock, 3);
        assert!(store.get("zzz").is_none());
        assert!(matches!(store.require("zzz"), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_siblings_share_identity() {
        let store = VariantStore::new();
        let m1 = variant("a", "M", 1, 3);
        store.load(vec![m1.clone(), variant("b", "M", 2, 1), variant("c", "L", 1, 0)]);

        let siblings = store.siblings_of(&m1);
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].id, "b");
    }

    #[test]
    fn test_replace_requires_existing() {
        let store = VariantStore::new();
        store.load(vec![variant("a", "M", 1, 3)]);

        let mut next = variant("a", "M", 1, 9);
        next.sku = "HOOD-M-2".to_string();
        let previous = store.replace(next).unwrap();
        assert_eq!(previous.stock, 3);
        assert_eq!(store.get("a").unwrap().stock, 9);

        assert!(store.replace(variant("new", "M", 2, 1)).is_err());
        store.insert(variant("new", "M", 2, 1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_in_place() {
        let store = VariantStore::new();
        store.load(vec![variant("a", "M", 1, 3)]);
        let updated = store.update("a", |v| v.is_active = true).unwrap();
        assert!(updated.is_active);
        assert!(store.get("a").unwrap().is_active);
    }
}
