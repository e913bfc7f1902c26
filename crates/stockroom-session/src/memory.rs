//! # In-Memory Backend
//!
//! A [`VariantBackend`] that keeps everything in process. Used by the demo
//! binary and by tests, which can count calls, inject failures and add
//! latency to exercise overlapping operations.
//!
//! It enforces the same rules a real server would, including the one the
//! coordinator cannot check locally:
//!
//! ```text
//! only one active batch per product/option combination
//!
//!   HOOD-M batch 1 (active) ── set_active(batch 2, true) ──► Conflict
//! ```

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use stockroom_core::batch::BatchManager;
use stockroom_core::images::ImageDiff;
use stockroom_core::ledger::{StockLedger, StockLog};
use stockroom_core::validation::FieldChanges;
use stockroom_core::{PersistedImage, StockLogEntry, Variant};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{AdjustedStock, BatchPayload, StockAdjustment, VariantBackend};
use crate::error::{BackendError, BackendResult};

/// The collaborator calls, for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCall {
    FetchVariants,
    CommitDiff,
    AdjustStock,
    CreateBatch,
    SetActive,
    FetchStockLogs,
}

#[derive(Debug, Default)]
struct State {
    variants: BTreeMap<String, Variant>,
    log: StockLog,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
    calls: Mutex<HashMap<BackendCall, usize>>,
    injected: Mutex<HashMap<BackendCall, BackendError>>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variants(variants: Vec<Variant>) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.write().expect("in-memory backend lock poisoned");
            state.variants = variants.into_iter().map(|v| (v.id.clone(), v)).collect();
        }
        backend
    }

    /// Delays every call, so overlapping operations can be observed.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next `call` fail with `err`.
    pub fn fail_next(&self, call: BackendCall, err: BackendError) {
        self.injected
            .lock()
            .expect("in-memory backend mutex poisoned")
            .insert(call, err);
    }

    pub fn calls(&self, call: BackendCall) -> usize {
        self.calls
            .lock()
            .expect("in-memory backend mutex poisoned")
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .expect("in-memory backend mutex poisoned")
            .values()
            .sum()
    }

    /// Server-side view of a variant.
    pub fn variant(&self, id: &str) -> Option<Variant> {
        self.read(|state| state.variants.get(id).cloned())
    }

    fn begin(&self, call: BackendCall) -> BackendResult<()> {
        *self
            .calls
            .lock()
            .expect("in-memory backend mutex poisoned")
            .entry(call)
            .or_insert(0) += 1;

        match self
            .injected
            .lock()
            .expect("in-memory backend mutex poisoned")
            .remove(&call)
        {
            Some(err) => {
                debug!(?call, %err, "Injected backend failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.state.read().expect("in-memory backend lock poisoned"))
    }

    fn write<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.write().expect("in-memory backend lock poisoned"))
    }
}

fn existing(state: &State, id: &str) -> BackendResult<Variant> {
    state
        .variants
        .get(id)
        .cloned()
        .ok_or_else(|| BackendError::variant_not_found(id))
}

fn rejected(err: impl std::fmt::Display) -> BackendError {
    BackendError::conflict(err.to_string())
}

/// Applies an image diff to the stored images, main image first.
fn apply_image_diff(
    variant_id: &str,
    current: &[PersistedImage],
    diff: &ImageDiff,
) -> BackendResult<Vec<PersistedImage>> {
    let mut kept: Vec<PersistedImage> = current
        .iter()
        .filter(|img| !diff.delete_ids.contains(&img.id))
        .cloned()
        .collect();

    let mut added: Vec<PersistedImage> = diff
        .new_files
        .iter()
        .map(|file| PersistedImage {
            id: Uuid::new_v4().to_string(),
            url: format!("memory://{}/{}", variant_id, file.name),
            is_main: false,
        })
        .collect();

    if !added.is_empty() {
        let main = diff.main_new_index.unwrap_or(0);
        if main >= added.len() {
            return Err(BackendError::conflict(format!(
                "main image index {} out of range",
                main
            )));
        }
        let main_image = added.remove(main);
        added.insert(0, main_image);
        kept.iter_mut().for_each(|img| img.is_main = false);
    } else if let Some(id) = &diff.main_persisted_id {
        if !kept.iter().any(|img| &img.id == id) {
            return Err(BackendError::conflict(format!("no image {} to make main", id)));
        }
        for img in kept.iter_mut() {
            img.is_main = &img.id == id;
        }
    }

    let mut images = added;
    images.extend(kept);

    match images.iter().position(|img| img.is_main) {
        Some(pos) if pos > 0 => {
            let main = images.remove(pos);
            images.insert(0, main);
        }
        Some(_) => {}
        None => {
            if let Some(first) = images.first_mut() {
                first.is_main = true;
            }
        }
    }

    Ok(images)
}

impl VariantBackend for InMemoryBackend {
    fn fetch_variants(&self) -> impl Future<Output = BackendResult<Vec<Variant>>> + Send + '_ {
        async move {
            self.begin(BackendCall::FetchVariants)?;
            self.pause().await;
            Ok(self.read(|state| state.variants.values().cloned().collect::<Vec<_>>()))
        }
    }

    fn commit_field_and_image_diff<'a>(
        &'a self,
        variant_id: &'a str,
        fields: &'a FieldChanges,
        images: &'a ImageDiff,
    ) -> impl Future<Output = BackendResult<Variant>> + Send + 'a {
        async move {
            self.begin(BackendCall::CommitDiff)?;
            self.pause().await;

            self.write(|state| -> BackendResult<Variant> {
                let current = existing(state, variant_id)?;
                let mut next = fields.applied_to(&current);
                next.images = apply_image_diff(variant_id, &current.images, images)?;
                next.check_invariants().map_err(rejected)?;

                state.variants.insert(next.id.clone(), next.clone());
                Ok(next)
            })
        }
    }

    fn adjust_stock<'a>(
        &'a self,
        variant_id: &'a str,
        adjustment: &'a StockAdjustment,
    ) -> impl Future<Output = BackendResult<AdjustedStock>> + Send + 'a {
        async move {
            self.begin(BackendCall::AdjustStock)?;
            self.pause().await;

            self.write(|state| -> BackendResult<AdjustedStock> {
                let current = existing(state, variant_id)?;
                let mut next = current.clone();
                next.stock = next.stock.checked_add(adjustment.delta).ok_or_else(|| {
                    BackendError::conflict(format!(
                        "stock {} {:+} is out of range",
                        current.stock, adjustment.delta
                    ))
                })?;
                if let Some(scarcity) = adjustment.scarcity_stock {
                    next.scarcity_stock = scarcity;
                }
                next.check_invariants().map_err(rejected)?;

                let entry = StockLedger::record(
                    &current,
                    adjustment.reason,
                    adjustment.delta,
                    adjustment.description.clone(),
                    &adjustment.actor,
                    Utc::now(),
                );
                state.variants.insert(next.id.clone(), next.clone());
                state.log.append(entry.clone());

                Ok(AdjustedStock {
                    variant: next,
                    entry,
                })
            })
        }
    }

    fn create_batch<'a>(
        &'a self,
        variant_id: &'a str,
        payload: &'a BatchPayload,
    ) -> impl Future<Output = BackendResult<Variant>> + Send + 'a {
        async move {
            self.begin(BackendCall::CreateBatch)?;
            self.pause().await;

            self.write(|state| -> BackendResult<Variant> {
                let source = existing(state, variant_id)?;
                let batch = BatchManager::create_batch(
                    &source,
                    state.variants.values(),
                    &payload.request,
                    &payload.actor,
                    Utc::now(),
                )
                .map_err(rejected)?;

                state
                    .variants
                    .insert(batch.variant.id.clone(), batch.variant.clone());
                state.log.append(batch.seed_entry);
                Ok(batch.variant)
            })
        }
    }

    fn set_active<'a>(
        &'a self,
        variant_id: &'a str,
        active: bool,
    ) -> impl Future<Output = BackendResult<Variant>> + Send + 'a {
        async move {
            self.begin(BackendCall::SetActive)?;
            self.pause().await;

            self.write(|state| -> BackendResult<Variant> {
                let mut next = existing(state, variant_id)?;

                if active {
                    let identity = next.batch_identity();
                    let clash = state
                        .variants
                        .values()
                        .any(|v| v.id != next.id && v.is_active && v.batch_identity() == identity);
                    if clash {
                        return Err(BackendError::conflict(
                            "only one active batch per option combination is allowed",
                        ));
                    }
                }

                next.is_active = active;
                next.check_invariants().map_err(rejected)?;
                state.variants.insert(next.id.clone(), next.clone());
                Ok(next)
            })
        }
    }

    fn fetch_stock_logs<'a>(
        &'a self,
        variant_id: &'a str,
    ) -> impl Future<Output = BackendResult<Vec<StockLogEntry>>> + Send + 'a {
        async move {
            self.begin(BackendCall::FetchStockLogs)?;
            self.pause().await;

            self.read(|state| -> BackendResult<Vec<StockLogEntry>> {
                existing(state, variant_id)?;
                Ok(state.log.entries_for(variant_id).cloned().collect())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::variant;
    use stockroom_core::batch::BatchRequest;
    use stockroom_core::images::IncomingFile;
    use stockroom_core::{Money, StockReason};

    fn seeded() -> InMemoryBackend {
        InMemoryBackend::with_variants(vec![variant("m1", "M", 1, 4), variant("l1", "L", 1, 0)])
    }

    #[tokio::test]
    async fn test_counts_calls_and_injects_failures() {
        let backend = seeded();
        assert_eq!(backend.fetch_variants().await.unwrap().len(), 2);

        backend.fail_next(BackendCall::FetchVariants, BackendError::Transport("down".into()));
        assert!(backend.fetch_variants().await.is_err());
        assert!(backend.fetch_variants().await.is_ok());

        assert_eq!(backend.calls(BackendCall::FetchVariants), 3);
        assert_eq!(backend.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_one_active_batch_per_combination() {
        let backend = seeded();
        let payload = BatchPayload {
            request: BatchRequest {
                amount: 10,
                price: Money::from_cents(4500),
                cost_per_item: Money::from_cents(2000),
                scarcity_stock: 2,
            },
            actor: "alice".to_string(),
        };
        let batch = backend.create_batch("m1", &payload).await.unwrap();
        assert_eq!(batch.batch_number, 2);

        backend.set_active("m1", true).await.unwrap();
        let err = backend.set_active(&batch.id, true).await.unwrap_err();
        assert!(matches!(err, BackendError::Conflict { .. }));

        // Other combinations are unaffected.
        assert!(backend.set_active("l1", true).await.is_ok());

        let seed = backend.fetch_stock_logs(&batch.id).await.unwrap();
        assert_eq!(seed.len(), 1);
        assert_eq!(seed[0].reason(), StockReason::ReturnRestock);
    }

    #[tokio::test]
    async fn test_adjust_stock_records_entry() {
        let backend = seeded();
        let adjustment = StockAdjustment {
            delta: -3,
            reason: StockReason::Damaged,
            description: "water damage".to_string(),
            actor: "bob".to_string(),
            scarcity_stock: Some(1),
        };
        let adjusted = backend.adjust_stock("m1", &adjustment).await.unwrap();
        assert_eq!(adjusted.variant.stock, 1);
        assert_eq!(adjusted.variant.scarcity_stock, 1);
        assert_eq!(adjusted.entry.stock_before(), 4);
        assert_eq!(adjusted.entry.stock_after(), 1);

        let too_many = StockAdjustment {
            delta: -5,
            scarcity_stock: None,
            ..adjustment
        };
        assert!(backend.adjust_stock("m1", &too_many).await.is_err());
        assert_eq!(backend.variant("m1").unwrap().stock, 1);

        let overflow = StockAdjustment {
            delta: i64::MAX,
            reason: StockReason::ReturnRestock,
            ..too_many
        };
        assert!(matches!(
            backend.adjust_stock("m1", &overflow).await,
            Err(BackendError::Conflict { .. })
        ));
        assert_eq!(backend.variant("m1").unwrap().stock, 1);
    }

    #[test]
    fn test_image_diff_puts_main_first() {
        let current = vec![
            PersistedImage {
                id: "a".into(),
                url: "/a".into(),
                is_main: true,
            },
            PersistedImage {
                id: "b".into(),
                url: "/b".into(),
                is_main: false,
            },
        ];

        let diff = ImageDiff {
            delete_ids: vec!["a".into()],
            new_files: vec![
                IncomingFile::new("front.png", "image/png", 1),
                IncomingFile::new("back.png", "image/png", 1),
            ],
            main_new_index: Some(1),
            main_persisted_id: None,
        };
        let images = apply_image_diff("v", &current, &diff).unwrap();
        assert_eq!(images.len(), 3);
        assert!(images[0].is_main);
        assert!(images[0].url.ends_with("back.png"));
        assert_eq!(images.iter().filter(|i| i.is_main).count(), 1);

        let diff = ImageDiff {
            main_persisted_id: Some("b".into()),
            ..ImageDiff::default()
        };
        let images = apply_image_diff("v", &current, &diff).unwrap();
        assert_eq!(images[0].id, "b");
        assert!(images[0].is_main);
        assert!(!images[1].is_main);
    }
}
