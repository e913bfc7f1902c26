//! # stockroom-session: Edit Sessions and Mutation Coordination
//!
//! Drives every variant mutation through local validation, a single round
//! trip to the persistence collaborator, and reconciliation or rollback.
//!
//! ## Module Organization
//! ```text
//! stockroom_session/
//! ├── lib.rs          ◄─── You are here (exports, tracing setup)
//! ├── coordinator.rs  ◄─── VariantMutationCoordinator
//! ├── session.rs      ◄─── Per-variant edit buffers (fields + images)
//! ├── store.rs        ◄─── VariantStore, last confirmed state
//! ├── busy.rs         ◄─── Per (variant, operation) busy flags
//! ├── backend.rs      ◄─── VariantBackend collaborator trait
//! ├── memory.rs       ◄─── In-memory backend for demos and tests
//! ├── identity.rs     ◄─── IdentityProvider collaborator trait
//! ├── events.rs       ◄─── LedgerEvent + emitters
//! ├── config.rs       ◄─── ledger.toml + STOCKROOM_* overrides
//! └── error.rs        ◄─── LedgerError, BackendError, ErrorReport
//! ```

pub mod backend;
pub mod busy;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod identity;
pub mod memory;
pub mod session;
pub mod store;

pub use backend::{AdjustedStock, BatchPayload, StockAdjustment, VariantBackend};
pub use busy::{BusyFlags, BusyGuard, OperationKind};
pub use config::LedgerConfig;
pub use coordinator::{ActivationOutcome, VariantMutationCoordinator};
pub use error::{BackendError, BackendResult, ErrorCode, ErrorReport, LedgerError, LedgerResult};
pub use events::{EventEmitter, LedgerEvent, NoOpEmitter, RecordingEmitter};
pub use identity::{IdentityProvider, StaticIdentity};
pub use memory::{BackendCall, InMemoryBackend};
pub use session::{PendingChanges, SessionArena, VariantEditSession};
pub use store::VariantStore;

use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=stockroom_session=trace` - Trace this crate only
/// - Default: `default_level` (usually `logging.level` from ledger.toml)
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
