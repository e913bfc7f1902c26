//! # Edit Sessions
//!
//! One [`VariantEditSession`] per variant being edited, owned by a
//! [`SessionArena`].
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open(variant) ──► VariantEditSession { fields, images }               │
//! │                        │                                                │
//! │                        │  set_field / add_files / promote_to_main ...   │
//! │                        ▼                                                │
//! │                    pending_changes ──► (FieldChanges, ImageDiff)       │
//! │                        │                                                │
//! │                        │  collaborator confirmed                        │
//! │                        ▼                                                │
//! │                    acknowledge ──► buffers cleared, previews released  │
//! │                                                                         │
//! │  dispose(id) ──► session dropped, every preview it held released       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A session is the single writer of its variant's working state; sessions
//! of different variants share nothing but the preview counter.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use stockroom_core::images::{ImageDiff, ImagePolicy, ImageSet, PreviewTracker};
use stockroom_core::money::{margin, Margin, Money};
use stockroom_core::validation::{diff_changed_fields, FieldChanges};
use stockroom_core::{CoreError, CoreResult, ProposedFields, Variant, VariantField};

use crate::error::{LedgerError, LedgerResult};

/// Field and image changes waiting to be persisted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChanges {
    pub fields: FieldChanges,
    pub images: ImageDiff,
}

// =============================================================================
// Edit Session
// =============================================================================

#[derive(Debug)]
pub struct VariantEditSession {
    variant_id: String,
    fields: ProposedFields,
    images: ImageSet,
    opened_at: DateTime<Utc>,
}

impl VariantEditSession {
    pub fn new(
        variant: &Variant,
        policy: ImagePolicy,
        previews: PreviewTracker,
        now: DateTime<Utc>,
    ) -> Self {
        VariantEditSession {
            variant_id: variant.id.clone(),
            fields: ProposedFields::default(),
            images: ImageSet::new(variant, policy, previews),
            opened_at: now,
        }
    }

    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn fields(&self) -> &ProposedFields {
        &self.fields
    }

    /// Records raw form text for a field.
    pub fn set_field(&mut self, field: VariantField, text: impl Into<String>) {
        *self.slot(field) = Some(text.into());
    }

    /// Forgets any edit of a field.
    pub fn reset_field(&mut self, field: VariantField) {
        *self.slot(field) = None;
    }

    fn slot(&mut self, field: VariantField) -> &mut Option<String> {
        match field {
            VariantField::Sku => &mut self.fields.sku,
            VariantField::Price => &mut self.fields.price,
            VariantField::CompareAtPrice => &mut self.fields.compare_at_price,
            VariantField::CostPerItem => &mut self.fields.cost_per_item,
            VariantField::ScarcityStock => &mut self.fields.scarcity_stock,
            VariantField::SupplierId => &mut self.fields.supplier_id,
            VariantField::ShipmentId => &mut self.fields.shipment_id,
        }
    }

    pub fn images(&self) -> &ImageSet {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageSet {
        &mut self.images
    }

    /// Live margin of the edited price and cost, falling back to `current`
    /// for fields not touched.
    pub fn margin(&self, current: &Variant) -> Option<Margin> {
        let price = match self.fields.price.as_deref() {
            Some(text) => Money::parse_field("price", text).ok()?.unwrap_or_default(),
            None => current.price(),
        };
        let cost = match self.fields.cost_per_item.as_deref() {
            Some(text) => Money::parse_field("cost_per_item", text)
                .ok()?
                .unwrap_or_default(),
            None => current.cost_per_item(),
        };
        margin(price, cost)
    }

    /// The changes to persist against `current`.
    ///
    /// Fails with `NoChanges` when neither fields nor images differ.
    pub fn pending_changes(&self, current: &Variant) -> CoreResult<PendingChanges> {
        let fields = diff_changed_fields(current, &self.fields)?;
        let images = self.images.commit_diff();
        if fields.is_empty() && images.is_empty() {
            return Err(CoreError::NoChanges {
                variant_id: self.variant_id.clone(),
            });
        }
        Ok(PendingChanges { fields, images })
    }

    /// Adopts the confirmed variant and clears every buffer.
    pub fn acknowledge(&mut self, confirmed: &Variant) {
        self.fields = ProposedFields::default();
        self.images.acknowledge_commit(&confirmed.images);
    }

    pub fn discard(&mut self) {
        self.fields = ProposedFields::default();
        self.images.discard();
    }
}

// =============================================================================
// Session Arena
// =============================================================================

/// Owns every open edit session, keyed by variant id.
#[derive(Debug, Default)]
pub struct SessionArena {
    sessions: Mutex<HashMap<String, VariantEditSession>>,
    policy: ImagePolicy,
    previews: PreviewTracker,
}

impl SessionArena {
    pub fn new(policy: ImagePolicy) -> Self {
        SessionArena {
            sessions: Mutex::new(HashMap::new()),
            policy,
            previews: PreviewTracker::new(),
        }
    }

    /// Opens a session for `variant`. An already open session is kept as is.
    ///
    /// Returns `true` if a new session was created.
    pub fn open(&self, variant: &Variant, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.lock().expect("session arena mutex poisoned");
        if sessions.contains_key(&variant.id) {
            return false;
        }
        sessions.insert(
            variant.id.clone(),
            VariantEditSession::new(variant, self.policy.clone(), self.previews.clone(), now),
        );
        true
    }

    /// Runs `f` against the open session of `variant_id`.
    pub fn with_session<R>(
        &self,
        variant_id: &str,
        f: impl FnOnce(&mut VariantEditSession) -> R,
    ) -> LedgerResult<R> {
        let mut sessions = self.sessions.lock().expect("session arena mutex poisoned");
        let session = sessions
            .get_mut(variant_id)
            .ok_or_else(|| LedgerError::session_not_found(variant_id))?;
        Ok(f(session))
    }

    /// Closes a session, releasing its previews.
    pub fn dispose(&self, variant_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session arena mutex poisoned")
            .remove(variant_id)
            .is_some()
    }

    pub fn is_open(&self, variant_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session arena mutex poisoned")
            .contains_key(variant_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session arena mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Previews held across all sessions.
    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }
}
