//! Wardrobe Core - Main Library
//!
//! Offline-first core of a wardrobe management app: a cached collection of
//! clothing items and outfits that stays usable without connectivity and
//! syncs with a REST backend when it can, plus the pipeline that captures
//! product photos from shopping pages and feeds them into the wardrobe.
//!
//! # Module Structure
//!
//! - **`shared`** - Plain data shared by every layer
//!   - Wardrobe items, outfits, filters and sorting
//!   - Capture boundary messages
//!   - Configuration and error types
//!
//! - **`client`** - The offline-first runtime
//!   - Local cache hydrated from SQLite
//!   - Offline-first service layer with optimistic writes
//!   - Sync engine with backoff and reconnect handling
//!   - Shopping capture, cart and batch ingestion
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wardrobe_core::client::{AppState, Config, HttpBackend, LocalDatabase};
//! use wardrobe_core::shared::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let database = LocalDatabase::open(config.database_path()).await?;
//! let backend = Arc::new(HttpBackend::new(Config::from_app(config.clone()))?);
//! let state = AppState::initialize(config, Arc::new(database), backend).await?;
//!
//! state.sign_in("user-1").await;
//! let cached = state.service.get_user_items("user-1");
//! println!("{} items cached", cached.entities.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The library logs through `tracing` and never installs a subscriber; the
//! `wardrobe-sync` binary sets one up from `RUST_LOG`.

pub mod client;
pub mod shared;
