//! # Busy Flags
//!
//! Per-variant, per-operation guards against re-entrant submission.
//!
//! ```text
//! (variant "v1", ToggleActive)  held   → second toggle on v1 fails Busy
//! (variant "v1", AdjustStock)   free   → adjust on v1 proceeds
//! (variant "v2", ToggleActive)  free   → toggle on v2 proceeds
//! ```
//!
//! A flag is released when its [`BusyGuard`] drops, including when the
//! operation returns early with an error.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{LedgerError, LedgerResult};

/// The kinds of operation that may not overlap on one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    UpdateVariant,
    AdjustStock,
    CreateBatch,
    ToggleActive,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::UpdateVariant => write!(f, "variant update"),
            OperationKind::AdjustStock => write!(f, "stock adjustment"),
            OperationKind::CreateBatch => write!(f, "batch creation"),
            OperationKind::ToggleActive => write!(f, "activation toggle"),
        }
    }
}

type Key = (String, OperationKind);

#[derive(Debug, Clone, Default)]
pub struct BusyFlags {
    held: Arc<Mutex<HashSet<Key>>>,
}

impl BusyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `(variant_id, operation)` busy until the guard drops.
    pub fn acquire(&self, variant_id: &str, operation: OperationKind) -> LedgerResult<BusyGuard> {
        let key = (variant_id.to_string(), operation);
        let mut held = self.held.lock().expect("busy flags mutex poisoned");
        if !held.insert(key.clone()) {
            return Err(LedgerError::Busy {
                variant_id: variant_id.to_string(),
                operation,
            });
        }
        Ok(BusyGuard {
            held: Arc::clone(&self.held),
            key,
        })
    }

    pub fn is_busy(&self, variant_id: &str, operation: OperationKind) -> bool {
        self.held
            .lock()
            .expect("busy flags mutex poisoned")
            .contains(&(variant_id.to_string(), operation))
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    held: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        // Never panic in drop: a poisoned set still gets the flag cleared.
        let mut held = match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.key);
    }
}
