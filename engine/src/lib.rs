//! Crop–interest consistency engine.
//!
//! Every interest lives twice: as a canonical record in the [`InterestStore`]
//! and as a summary embedded in its crop listing in the [`CropStore`]. The
//! [`Engine`] is the only writer of both and keeps them in step. Canonical
//! writes always land first; the embedded summaries are a cache that
//! [`Engine::reconcile_crop`] can rebuild at any time.

pub mod audit;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
mod locks;
mod reconcile;
pub mod store;

pub use audit::{audit, Violation};
pub use config::EngineConfig;
pub use database::{Database, DatabaseConfig, DatabaseError, Snapshot};
pub use engine::{CropUpdate, DeletedCrop, Engine};
pub use error::{EngineError, RecordKind};
pub use reconcile::ReconcileReport;
pub use store::memory::{MemoryCropStore, MemoryInterestStore};
pub use store::{CropStore, InterestStore, QuantityUpdate, StatusUpdate, StoreError};
