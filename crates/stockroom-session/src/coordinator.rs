//! # Variant Mutation Coordinator
//!
//! Orchestrates every variant mutation: local validation, one round trip to
//! the persistence collaborator, then reconciliation or rollback.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Mutation Flow in Stockroom                           │
//! │                                                                         │
//! │  intent (update / adjust / batch / toggle)                             │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BusyFlags::acquire(variant, kind) ── held? ──► Busy                   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  local checks (core) ─────────── fail? ──► Validation / Constraint /   │
//! │     │                                      NoOp   (zero round trips)   │
//! │     ▼                                                                   │
//! │  [toggle only] optimistic flip, phase = Pending                        │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  VariantBackend round trip ───── fail? ──► Conflict / Transport        │
//! │     │                                      (optimistic flip reverted,  │
//! │     │                                       buffers kept for retry)    │
//! │     ▼                                                                   │
//! │  VariantStore ← confirmed variant, session buffers cleared, event      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No std lock is held across a round trip. The busy guard is, and it
//! releases on every exit path.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use stockroom_core::batch::{BatchManager, BatchRequest};
use stockroom_core::ledger::{AdjustmentOutcome, AdjustmentRequest, StockLedger};
use stockroom_core::money::Margin;
use stockroom_core::validation::{validate_activation, validate_field_change, validate_scarcity};
use stockroom_core::{ActivationPhase, StockLogEntry, Variant};
use tracing::{debug, info, warn};

use crate::backend::{BatchPayload, StockAdjustment, VariantBackend};
use crate::busy::{BusyFlags, OperationKind};
use crate::config::LedgerConfig;
use crate::error::{BackendError, LedgerError, LedgerResult};
use crate::events::{EventEmitter, LedgerEvent, NoOpEmitter};
use crate::identity::IdentityProvider;
use crate::session::{SessionArena, VariantEditSession};
use crate::store::VariantStore;

/// Result of a confirmed activation flip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub variant: Variant,
    pub phase: ActivationPhase,
}

pub struct VariantMutationCoordinator<B, I> {
    backend: B,
    identity: I,
    store: Arc<VariantStore>,
    sessions: SessionArena,
    busy: BusyFlags,
    ledger: Mutex<StockLedger>,
    emitter: Arc<dyn EventEmitter>,
    config: LedgerConfig,
}

impl<B, I> VariantMutationCoordinator<B, I>
where
    B: VariantBackend,
    I: IdentityProvider,
{
    pub fn new(backend: B, identity: I, config: LedgerConfig) -> Self {
        Self::with_emitter(backend, identity, config, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        backend: B,
        identity: I,
        config: LedgerConfig,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        VariantMutationCoordinator {
            backend,
            identity,
            store: Arc::new(VariantStore::new()),
            sessions: SessionArena::new(config.image_policy()),
            busy: BusyFlags::new(),
            ledger: Mutex::new(StockLedger::new()),
            emitter,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &Arc<VariantStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionArena {
        &self.sessions
    }

    pub fn is_busy(&self, variant_id: &str, operation: OperationKind) -> bool {
        self.busy.is_busy(variant_id, operation)
    }

    fn emit(&self, event: LedgerEvent) {
        self.emitter.emit(&event);
    }

    fn remote_error(
        &self,
        variant_id: &str,
        operation: OperationKind,
        err: BackendError,
    ) -> LedgerError {
        warn!(variant_id, %operation, error = %err, "Collaborator rejected operation");
        LedgerError::from_backend(variant_id, err)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Reloads every variant from the collaborator.
    pub async fn refresh(&self) -> LedgerResult<usize> {
        let variants = self.backend.fetch_variants().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch variants");
            LedgerError::from_backend("*", e)
        })?;
        let count = variants.len();
        self.store.load(variants);
        info!(count, "Variants loaded");
        Ok(count)
    }

    // =========================================================================
    // Edit Sessions
    // =========================================================================

    /// Opens an edit session. Returns `false` if one was already open.
    pub fn open_session(&self, variant_id: &str) -> LedgerResult<bool> {
        let variant = self.store.require(variant_id)?;
        let opened = self.sessions.open(&variant, Utc::now());
        if opened {
            debug!(variant_id, "Edit session opened");
        }
        Ok(opened)
    }

    /// Runs `f` against the open session of `variant_id`.
    pub fn edit<R>(
        &self,
        variant_id: &str,
        f: impl FnOnce(&mut VariantEditSession) -> R,
    ) -> LedgerResult<R> {
        self.sessions.with_session(variant_id, f)
    }

    /// Live margin of the session's price and cost.
    pub fn margin(&self, variant_id: &str) -> LedgerResult<Option<Margin>> {
        let current = self.store.require(variant_id)?;
        self.sessions.with_session(variant_id, |s| s.margin(&current))
    }

    /// Closes a session and releases its previews. Unsaved edits are lost.
    pub fn close_session(&self, variant_id: &str) -> bool {
        let closed = self.sessions.dispose(variant_id);
        if closed {
            debug!(variant_id, "Edit session closed");
        }
        closed
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Persists the session's field and image changes as one request.
    pub async fn update_variant(&self, variant_id: &str) -> LedgerResult<Variant> {
        let _guard = self.busy.acquire(variant_id, OperationKind::UpdateVariant)?;
        let current = self.store.require(variant_id)?;

        let pending = self
            .sessions
            .with_session(variant_id, |s| s.pending_changes(&current))??;

        validate_field_change(&current, &pending.fields)?;
        let proposed = pending.fields.applied_to(&current);
        validate_scarcity(proposed.scarcity_stock, proposed.stock)?;

        debug!(
            variant_id,
            fields = pending.fields.len(),
            deletes = pending.images.delete_ids.len(),
            adds = pending.images.new_files.len(),
            "Committing variant changes"
        );

        let updated = self
            .backend
            .commit_field_and_image_diff(variant_id, &pending.fields, &pending.images)
            .await
            .map_err(|e| self.remote_error(variant_id, OperationKind::UpdateVariant, e))?;

        self.store.replace(updated.clone())?;
        if self
            .sessions
            .with_session(variant_id, |s| s.acknowledge(&updated))
            .is_err()
        {
            debug!(variant_id, "Session closed before the commit was acknowledged");
        }

        info!(variant_id, sku = %updated.sku, "Variant updated");
        self.emit(LedgerEvent::VariantUpdated {
            variant_id: variant_id.to_string(),
            fields: pending.fields.fields().into_iter().collect(),
            images_changed: !pending.images.is_empty(),
        });
        Ok(updated)
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Applies a reason-coded stock adjustment.
    pub async fn adjust_stock(
        &self,
        variant_id: &str,
        request: &AdjustmentRequest,
    ) -> LedgerResult<AdjustmentOutcome> {
        let _guard = self.busy.acquire(variant_id, OperationKind::AdjustStock)?;
        let current = self.store.require(variant_id)?;

        let plan = StockLedger::plan(&current, request)?;
        let adjustment = StockAdjustment {
            delta: plan.delta,
            reason: plan.reason,
            description: plan.description.clone(),
            actor: self.identity.current_actor(),
            scarcity_stock: plan.scarcity_stock,
        };

        let adjusted = self
            .backend
            .adjust_stock(variant_id, &adjustment)
            .await
            .map_err(|e| self.remote_error(variant_id, OperationKind::AdjustStock, e))?;

        self.store.replace(adjusted.variant.clone())?;
        self.ledger
            .lock()
            .expect("stock ledger mutex poisoned")
            .record_entry(adjusted.entry.clone());

        if let Some(substitution) = plan.substitution {
            info!(
                variant_id,
                requested = %substitution.requested,
                applied = %substitution.applied,
                "Zero stock: reason substituted"
            );
            self.emit(LedgerEvent::ReasonSubstituted {
                variant_id: variant_id.to_string(),
                requested: substitution.requested,
                applied: substitution.applied,
            });
        }

        info!(
            variant_id,
            reason = %adjusted.entry.reason(),
            delta = adjusted.entry.delta(),
            stock = adjusted.variant.stock,
            "Stock adjusted"
        );
        self.emit(LedgerEvent::StockAdjusted {
            variant_id: variant_id.to_string(),
            reason: adjusted.entry.reason(),
            delta: adjusted.entry.delta(),
            stock_after: adjusted.entry.stock_after(),
        });

        Ok(AdjustmentOutcome {
            new_stock: adjusted.variant.stock,
            entry: adjusted.entry,
            substitution: plan.substitution,
        })
    }

    /// Fetches the stock log of a variant, newest `fetch_limit` entries.
    pub async fn stock_logs(&self, variant_id: &str) -> LedgerResult<Vec<StockLogEntry>> {
        let entries = self
            .backend
            .fetch_stock_logs(variant_id)
            .await
            .map_err(|e| LedgerError::from_backend(variant_id, e))?;

        {
            let mut ledger = self.ledger.lock().expect("stock ledger mutex poisoned");
            for entry in &entries {
                ledger.record_entry(entry.clone());
            }
        }

        let skip = entries.len().saturating_sub(self.config.logs.fetch_limit);
        Ok(entries.into_iter().skip(skip).collect())
    }

    /// Entries seen so far for a variant, without a round trip.
    pub fn cached_logs(&self, variant_id: &str) -> Vec<StockLogEntry> {
        self.ledger
            .lock()
            .expect("stock ledger mutex poisoned")
            .log()
            .entries_for(variant_id)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Creates the next batch of `variant_id`'s product/option combination.
    pub async fn create_batch(
        &self,
        variant_id: &str,
        request: &BatchRequest,
    ) -> LedgerResult<Variant> {
        let _guard = self.busy.acquire(variant_id, OperationKind::CreateBatch)?;
        let source = self.store.require(variant_id)?;
        let actor = self.identity.current_actor();

        let siblings = self.store.siblings_of(&source);
        let expected = BatchManager::create_batch(&source, &siblings, request, &actor, Utc::now())?;

        let payload = BatchPayload {
            request: request.clone(),
            actor,
        };
        let created = self
            .backend
            .create_batch(variant_id, &payload)
            .await
            .map_err(|e| self.remote_error(variant_id, OperationKind::CreateBatch, e))?;

        if created.batch_number != expected.variant.batch_number {
            warn!(
                variant_id,
                expected = expected.variant.batch_number,
                assigned = created.batch_number,
                "Collaborator assigned a different batch number"
            );
        }

        self.store.insert(created.clone());
        info!(
            variant_id,
            batch_id = %created.id,
            batch_number = created.batch_number,
            "Batch created"
        );
        self.emit(LedgerEvent::BatchCreated {
            source_variant_id: variant_id.to_string(),
            variant_id: created.id.clone(),
            batch_number: created.batch_number,
            stock: created.stock,
        });
        Ok(created)
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Flips `is_active`, optimistically, rolling back on failure.
    ///
    /// ```text
    /// Inactive ──[price > 0 ∧ cost > 0]──► Active
    /// Active   ──────────[always]────────► Inactive
    /// ```
    pub async fn toggle_active(&self, variant_id: &str) -> LedgerResult<ActivationOutcome> {
        let _guard = self.busy.acquire(variant_id, OperationKind::ToggleActive)?;
        let current = self.store.require(variant_id)?;
        let target = !current.is_active;

        if target {
            validate_activation(&current)?;
        }

        self.store.update(variant_id, |v| v.is_active = target)?;
        self.emit(LedgerEvent::ActivationChanged {
            variant_id: variant_id.to_string(),
            phase: ActivationPhase::Pending { optimistic: target },
        });

        match self.backend.set_active(variant_id, target).await {
            Ok(confirmed) => {
                let phase = ActivationPhase::Confirmed {
                    is_active: confirmed.is_active,
                };
                self.store.replace(confirmed.clone())?;
                info!(variant_id, is_active = confirmed.is_active, "Activation confirmed");
                self.emit(LedgerEvent::ActivationChanged {
                    variant_id: variant_id.to_string(),
                    phase,
                });
                Ok(ActivationOutcome {
                    variant: confirmed,
                    phase,
                })
            }
            Err(err) => {
                let restored = current.is_active;
                self.store.update(variant_id, |v| v.is_active = restored)?;
                let error = self.remote_error(variant_id, OperationKind::ToggleActive, err);
                self.emit(LedgerEvent::ActivationChanged {
                    variant_id: variant_id.to_string(),
                    phase: ActivationPhase::RolledBack { restored },
                });
                self.emit(LedgerEvent::ActivationRolledBack {
                    variant_id: variant_id.to_string(),
                    restored,
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEmitter;
    use crate::identity::StaticIdentity;
    use crate::memory::{BackendCall, InMemoryBackend};
    use crate::store::tests::variant;
    use std::time::Duration;
    use stockroom_core::images::IncomingFile;
    use stockroom_core::{ConstraintError, Money, StockReason, VariantField};

    type Coordinator = VariantMutationCoordinator<InMemoryBackend, StaticIdentity>;

    fn seed() -> Vec<Variant> {
        let mut unpriced = variant("u1", "XL", 1, 2);
        unpriced.cost_per_item_cents = 0;
        vec![variant("m1", "M", 1, 4), variant("l1", "L", 1, 0), unpriced]
    }

    async fn setup_with(
        backend: InMemoryBackend,
        config: LedgerConfig,
    ) -> (Coordinator, Arc<RecordingEmitter>) {
        let emitter = Arc::new(RecordingEmitter::new());
        let coordinator = VariantMutationCoordinator::with_emitter(
            backend,
            StaticIdentity::new("alice"),
            config,
            emitter.clone(),
        );
        coordinator.refresh().await.unwrap();
        (coordinator, emitter)
    }

    async fn setup() -> (Coordinator, Arc<RecordingEmitter>) {
        setup_with(InMemoryBackend::with_variants(seed()), LedgerConfig::default()).await
    }

    fn png(name: &str) -> IncomingFile {
        IncomingFile::new(name, "image/png", 4096)
    }

    #[tokio::test]
    async fn test_unchanged_update_is_no_op_without_round_trip() {
        let (c, _) = setup().await;
        c.open_session("m1").unwrap();
        c.edit("m1", |s| {
            s.set_field(VariantField::Price, "45");
            s.set_field(VariantField::SupplierId, " sup-1 ");
        })
        .unwrap();

        let before = c.backend().total_calls();
        let err = c.update_variant("m1").await.unwrap_err();
        assert!(matches!(err, LedgerError::NoOp { .. }));
        assert_eq!(c.backend().total_calls(), before);
    }

    #[tokio::test]
    async fn test_update_requires_open_session() {
        let (c, _) = setup().await;
        assert!(matches!(
            c.update_variant("m1").await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_commits_fields_and_images_together() {
        let (c, events) = setup().await;
        c.open_session("m1").unwrap();
        c.edit("m1", |s| {
            s.set_field(VariantField::Price, "49.90");
            s.images_mut().add_files(vec![png("front"), png("back")]);
            s.images_mut().promote_to_main(1).unwrap();
        })
        .unwrap();
        assert_eq!(c.sessions().live_previews(), 2);

        let updated = c.update_variant("m1").await.unwrap();

        assert_eq!(updated.price_cents, 4990);
        assert_eq!(updated.images.len(), 2);
        assert!(updated.images[0].is_main);
        assert!(updated.images[0].url.ends_with("back"));
        assert_eq!(c.backend().calls(BackendCall::CommitDiff), 1);
        assert_eq!(c.store().get("m1").unwrap().price_cents, 4990);
        assert_eq!(c.sessions().live_previews(), 0);

        // Buffers are clear, so saving again is a no-op.
        assert!(matches!(
            c.update_variant("m1").await,
            Err(LedgerError::NoOp { .. })
        ));
        assert!(events.events().iter().any(|e| matches!(
            e,
            LedgerEvent::VariantUpdated { images_changed: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_active_variant_cannot_lose_pricing() {
        let (c, _) = setup().await;
        c.toggle_active("m1").await.unwrap();
        c.open_session("m1").unwrap();
        c.edit("m1", |s| s.set_field(VariantField::CostPerItem, "0"))
            .unwrap();

        let before = c.backend().total_calls();
        let err = c.update_variant("m1").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Constraint(ConstraintError::ActivationRequiresPricing { .. })
        ));
        assert_eq!(c.backend().total_calls(), before);
    }

    #[tokio::test]
    async fn test_scarcity_edit_above_stock_fails_locally() {
        let (c, _) = setup().await;
        c.open_session("m1").unwrap();
        c.edit("m1", |s| s.set_field(VariantField::ScarcityStock, "10"))
            .unwrap();
        assert!(matches!(
            c.update_variant("m1").await,
            Err(LedgerError::Constraint(ConstraintError::ScarcityExceedsStock { .. }))
        ));
        assert_eq!(c.backend().calls(BackendCall::CommitDiff), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_buffers_for_retry() {
        let (c, _) = setup().await;
        c.open_session("m1").unwrap();
        c.edit("m1", |s| {
            s.set_field(VariantField::Sku, "HOOD-M-2024");
            s.images_mut().add_files(vec![png("front")]);
        })
        .unwrap();

        c.backend()
            .fail_next(BackendCall::CommitDiff, BackendError::Transport("timeout".into()));
        let err = c.update_variant("m1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
        assert!(err.is_recoverable());

        assert_eq!(c.store().get("m1").unwrap().sku, "HOOD-M");
        assert!(c.backend().variant("m1").unwrap().images.is_empty());
        assert_eq!(c.sessions().live_previews(), 1);

        let updated = c.update_variant("m1").await.unwrap();
        assert_eq!(updated.sku, "HOOD-M-2024");
        assert_eq!(updated.images.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_stock_write_off_is_recorded_as_restock() {
        let (c, events) = setup().await;
        let request = AdjustmentRequest::new(StockReason::Damaged, 5, "crushed in transit");

        let outcome = c.adjust_stock("l1", &request).await.unwrap();

        assert_eq!(outcome.new_stock, 5);
        assert_eq!(outcome.entry.reason(), StockReason::ReturnRestock);
        assert_eq!(outcome.entry.performed_by(), "alice");
        assert!(outcome.substitution.is_some());
        assert_eq!(c.store().get("l1").unwrap().stock, 5);
        assert_eq!(c.cached_logs("l1").len(), 1);
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, LedgerEvent::ReasonSubstituted { .. })));
    }

    #[tokio::test]
    async fn test_negative_result_fails_before_round_trip() {
        let (c, _) = setup().await;
        let request = AdjustmentRequest::new(StockReason::TheftLost, 6, "missing");

        let err = c.adjust_stock("m1", &request).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Constraint(ConstraintError::NegativeStock { .. })
        ));
        assert_eq!(c.backend().calls(BackendCall::AdjustStock), 0);
        assert_eq!(c.store().get("m1").unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_create_batch_and_read_seed_log() {
        let (c, events) = setup().await;
        let request = BatchRequest {
            amount: 20,
            price: Money::from_cents(4800),
            cost_per_item: Money::from_cents(2100),
            scarcity_stock: 5,
        };

        let batch = c.create_batch("m1", &request).await.unwrap();
        assert_eq!(batch.batch_number, 2);
        assert_eq!(batch.stock, 20);
        assert!(!batch.is_active);
        assert_eq!(c.store().len(), 4);

        let logs = c.stock_logs(&batch.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].stock_after(), 20);
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, LedgerEvent::BatchCreated { batch_number: 2, .. })));

        let invalid = BatchRequest {
            scarcity_stock: 21,
            ..request
        };
        assert!(c.create_batch("m1", &invalid).await.is_err());
        assert_eq!(c.backend().calls(BackendCall::CreateBatch), 1);
    }

    #[tokio::test]
    async fn test_activation_gate_checked_locally() {
        let (c, _) = setup().await;
        let err = c.toggle_active("u1").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Constraint(ConstraintError::ActivationRequiresPricing { .. })
        ));
        assert_eq!(c.backend().calls(BackendCall::SetActive), 0);
        assert!(!c.store().get("u1").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_toggle_confirms_both_directions() {
        let (c, _) = setup().await;

        let on = c.toggle_active("m1").await.unwrap();
        assert_eq!(on.phase, ActivationPhase::Confirmed { is_active: true });
        assert!(c.store().get("m1").unwrap().is_active);

        let off = c.toggle_active("m1").await.unwrap();
        assert_eq!(off.phase, ActivationPhase::Confirmed { is_active: false });
        assert!(!c.store().get("m1").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_conflict_rolls_back_optimistic_flip() {
        let (c, events) = setup().await;
        let request = BatchRequest {
            amount: 3,
            price: Money::from_cents(4500),
            cost_per_item: Money::from_cents(2000),
            scarcity_stock: 0,
        };
        let batch = c.create_batch("m1", &request).await.unwrap();
        c.toggle_active("m1").await.unwrap();
        events.clear();

        let err = c.toggle_active(&batch.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::Conflict { .. }));
        assert!(err.is_recoverable());
        assert!(!c.store().get(&batch.id).unwrap().is_active);

        let recorded = events.events();
        assert!(matches!(
            recorded[0],
            LedgerEvent::ActivationChanged {
                phase: ActivationPhase::Pending { optimistic: true },
                ..
            }
        ));
        assert!(matches!(
            recorded[1],
            LedgerEvent::ActivationChanged {
                phase: ActivationPhase::RolledBack { restored: false },
                ..
            }
        ));
        assert!(matches!(
            recorded[2],
            LedgerEvent::ActivationRolledBack { restored: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_rolls_back_optimistic_flip() {
        let (c, events) = setup().await;
        c.backend()
            .fail_next(BackendCall::SetActive, BackendError::Transport("connection reset".into()));

        let err = c.toggle_active("m1").await.unwrap_err();

        assert!(matches!(err, LedgerError::Transport(_)));
        assert!(!c.store().get("m1").unwrap().is_active);
        assert!(!c.backend().variant("m1").unwrap().is_active);
        assert!(!c.is_busy("m1", OperationKind::ToggleActive));

        let recorded = events.events();
        assert!(recorded.iter().any(|e| matches!(
            e,
            LedgerEvent::ActivationChanged {
                phase: ActivationPhase::RolledBack { restored: false },
                ..
            }
        )));
        assert!(!recorded.iter().any(|e| matches!(
            e,
            LedgerEvent::ActivationChanged {
                phase: ActivationPhase::Confirmed { .. },
                ..
            }
        )));

        // The next attempt goes through.
        assert!(c.toggle_active("m1").await.unwrap().variant.is_active);
    }

    #[tokio::test]
    async fn test_failed_adjustment_leaves_store_and_log_untouched() {
        let (c, events) = setup().await;
        let request = AdjustmentRequest::new(StockReason::ReturnRestock, 6, "returned");

        c.backend()
            .fail_next(BackendCall::AdjustStock, BackendError::Transport("timeout".into()));
        let err = c.adjust_stock("m1", &request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
        assert_eq!(c.store().get("m1").unwrap().stock, 4);
        assert!(c.cached_logs("m1").is_empty());

        c.backend().fail_next(
            BackendCall::AdjustStock,
            BackendError::conflict("variant was edited elsewhere"),
        );
        assert!(matches!(
            c.adjust_stock("m1", &request).await,
            Err(LedgerError::Conflict { .. })
        ));
        assert_eq!(c.store().get("m1").unwrap().stock, 4);
        assert!(c.cached_logs("m1").is_empty());
        assert!(events.events().is_empty());

        assert_eq!(c.adjust_stock("m1", &request).await.unwrap().new_stock, 10);
        assert_eq!(c.cached_logs("m1").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_creation_adds_nothing() {
        let (c, events) = setup().await;
        let request = BatchRequest {
            amount: 12,
            price: Money::from_cents(4500),
            cost_per_item: Money::from_cents(2000),
            scarcity_stock: 0,
        };

        c.backend()
            .fail_next(BackendCall::CreateBatch, BackendError::Transport("timeout".into()));
        let err = c.create_batch("m1", &request).await.unwrap_err();

        assert!(matches!(err, LedgerError::Transport(_)));
        assert_eq!(c.store().len(), 3);
        assert_eq!(c.backend().variant("m1").unwrap().stock, 4);
        assert!(events.events().is_empty());

        let batch = c.create_batch("m1", &request).await.unwrap();
        assert_eq!(batch.batch_number, 2);
        assert_eq!(c.store().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_toggle_on_same_variant_is_busy() {
        let backend = InMemoryBackend::with_variants(seed()).with_latency(Duration::from_millis(50));
        let (c, _) = setup_with(backend, LedgerConfig::default()).await;

        let (first, second) = tokio::join!(c.toggle_active("m1"), c.toggle_active("m1"));

        assert!(first.is_ok());
        assert!(matches!(second, Err(LedgerError::Busy { .. })));
        assert_eq!(c.backend().calls(BackendCall::SetActive), 1);
        assert!(!c.is_busy("m1", OperationKind::ToggleActive));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_variants_proceed_concurrently() {
        let backend = InMemoryBackend::with_variants(seed()).with_latency(Duration::from_millis(50));
        let (c, _) = setup_with(backend, LedgerConfig::default()).await;

        let request = AdjustmentRequest::new(StockReason::ReturnRestock, 1, "found one");
        let (toggle, adjust, other) = tokio::join!(
            c.toggle_active("m1"),
            c.adjust_stock("m1", &request),
            c.toggle_active("l1"),
        );

        assert!(toggle.is_ok());
        assert!(adjust.is_ok());
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_stock_logs_respect_fetch_limit() {
        let mut config = LedgerConfig::default();
        config.logs.fetch_limit = 2;
        let (c, _) = setup_with(InMemoryBackend::with_variants(seed()), config).await;

        for amount in [1, 2, 3] {
            let request = AdjustmentRequest::new(StockReason::ReturnRestock, amount, "restock");
            c.adjust_stock("m1", &request).await.unwrap();
        }

        let logs = c.stock_logs("m1").await.unwrap();
        let deltas: Vec<i64> = logs.iter().map(|e| e.delta()).collect();
        assert_eq!(deltas, vec![2, 3]);
        assert_eq!(c.cached_logs("m1").len(), 3);
    }

    #[tokio::test]
    async fn test_close_session_releases_previews() {
        let (c, _) = setup().await;
        c.open_session("m1").unwrap();
        c.edit("m1", |s| s.images_mut().add_files(vec![png("a"), png("b")]))
            .unwrap();
        assert_eq!(c.sessions().live_previews(), 2);

        assert!(c.close_session("m1"));
        assert_eq!(c.sessions().live_previews(), 0);
        assert!(!c.sessions().is_open("m1"));
    }

    #[tokio::test]
    async fn test_live_margin() {
        let (c, _) = setup().await;
        c.open_session("m1").unwrap();
        c.edit("m1", |s| s.set_field(VariantField::Price, "50"))
            .unwrap();
        let margin = c.margin("m1").unwrap().unwrap();
        assert_eq!(margin.profit.cents(), 3000);
        assert!((margin.margin_pct - 60.0).abs() < 1e-9);
    }
}
