//! Client Module
//!
//! The offline-first core of the wardrobe app: local cache, service layer,
//! sync engine, shopping capture and batch ingestion.
//!
//! # Architecture
//!
//! - **`config`** - Runtime configuration (server URL, token)
//! - **`local_db`** - Key-value persistence (SQLite or in-memory)
//! - **`api`** - Remote CRUD over HTTP
//! - **`store`** - Hydrated in-memory collections
//! - **`offline`** - Offline-first service layer
//! - **`sync`** - Background sync engine
//! - **`capture`** - Shopping capture pipeline
//! - **`batch`** - Batch ingestion queue
//! - **`state`** - `AppState` wiring everything together
//!
//! # Data Flow
//!
//! ```text
//! page -> capture -> (cart | batch) -> offline service -> store -> sync -> backend
//! ```

pub mod api;
pub mod batch;
pub mod capture;
pub mod config;
pub mod local_db;
pub mod offline;
pub mod state;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use api::{HttpBackend, RemoteCollection, RemoteError};
pub use config::Config;
pub use local_db::{KeyValueStore, LocalDatabase, MemoryStore, StorageError};
pub use offline::{OfflineService, ServiceError};
pub use state::AppState;
pub use store::{ItemStore, OutfitStore, Selection};
pub use sync::{NetworkMonitor, SyncEngine, SyncStatus, SyncTrigger};
