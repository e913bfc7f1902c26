//! # Persistence Collaborator Contract
//!
//! The round trips the coordinator makes. Implementations own transport,
//! storage, timeouts and retries; the coordinator only sees the outcome.
//!
//! ```text
//! ┌──────────────────────────────┐         ┌──────────────────────────────┐
//! │ VariantMutationCoordinator   │         │ VariantBackend impl          │
//! │                              │         │ (HTTP client, database,      │
//! │  validated FieldChanges      │ ──────► │  InMemoryBackend, ...)       │
//! │  + ImageDiff, one request    │         │                              │
//! │                              │ ◄────── │  canonical Variant           │
//! │                              │         │  or BackendError             │
//! └──────────────────────────────┘         └──────────────────────────────┘
//! ```
//!
//! Every call either takes full effect or none: a `Transport` error means the
//! collaborator did not apply anything.

use serde::{Deserialize, Serialize};
use std::future::Future;
use stockroom_core::batch::BatchRequest;
use stockroom_core::images::ImageDiff;
use stockroom_core::validation::FieldChanges;
use stockroom_core::{StockLogEntry, StockReason, Variant};

use crate::error::BackendResult;

/// A signed, validated stock change ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub delta: i64,
    pub reason: StockReason,
    pub description: String,
    pub actor: String,
    pub scarcity_stock: Option<i64>,
}

/// The variant after an adjustment, with the entry that recorded it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedStock {
    pub variant: Variant,
    pub entry: StockLogEntry,
}

/// Payload of a batch creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    #[serde(flatten)]
    pub request: BatchRequest,
    pub actor: String,
}

/// Persistence and transport for variants.
pub trait VariantBackend: Send + Sync {
    /// Every variant the current user may manage.
    fn fetch_variants(&self) -> impl Future<Output = BackendResult<Vec<Variant>>> + Send + '_;

    /// Persists field and image changes in one atomic request.
    fn commit_field_and_image_diff<'a>(
        &'a self,
        variant_id: &'a str,
        fields: &'a FieldChanges,
        images: &'a ImageDiff,
    ) -> impl Future<Output = BackendResult<Variant>> + Send + 'a;

    /// Applies a signed delta and appends its log entry.
    fn adjust_stock<'a>(
        &'a self,
        variant_id: &'a str,
        adjustment: &'a StockAdjustment,
    ) -> impl Future<Output = BackendResult<AdjustedStock>> + Send + 'a;

    /// Creates the next batch of `variant_id`'s option combination.
    fn create_batch<'a>(
        &'a self,
        variant_id: &'a str,
        payload: &'a BatchPayload,
    ) -> impl Future<Output = BackendResult<Variant>> + Send + 'a;

    /// Flips the active flag. May be rejected with a conflict.
    fn set_active<'a>(
        &'a self,
        variant_id: &'a str,
        active: bool,
    ) -> impl Future<Output = BackendResult<Variant>> + Send + 'a;

    /// Stock log of one variant, oldest first.
    fn fetch_stock_logs<'a>(
        &'a self,
        variant_id: &'a str,
    ) -> impl Future<Output = BackendResult<Vec<StockLogEntry>>> + Send + 'a;
}
