//! # Notification Collaborator
//!
//! Typed events raised by the coordinator. Formatting and display belong to
//! the presentation layer.

use serde::Serialize;
use std::sync::Mutex;
use stockroom_core::{ActivationPhase, StockReason, VariantField};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    StockAdjusted {
        variant_id: String,
        reason: StockReason,
        delta: i64,
        stock_after: i64,
    },
    /// Zero-stock auto-correction rewrote the requested reason.
    ReasonSubstituted {
        variant_id: String,
        requested: StockReason,
        applied: StockReason,
    },
    BatchCreated {
        source_variant_id: String,
        variant_id: String,
        batch_number: i64,
        stock: i64,
    },
    VariantUpdated {
        variant_id: String,
        fields: Vec<VariantField>,
        images_changed: bool,
    },
    ActivationChanged {
        variant_id: String,
        phase: ActivationPhase,
    },
    ActivationRolledBack {
        variant_id: String,
        restored: bool,
        message: String,
    },
}

/// Receives ledger events.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &LedgerEvent);
}

/// No-op event emitter for headless use.
pub struct NoOpEmitter;

impl EventEmitter for NoOpEmitter {
    fn emit(&self, _event: &LedgerEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .expect("recording emitter mutex poisoned")
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .expect("recording emitter mutex poisoned")
            .clear();
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: &LedgerEvent) {
        self.events
            .lock()
            .expect("recording emitter mutex poisoned")
            .push(event.clone());
    }
}
