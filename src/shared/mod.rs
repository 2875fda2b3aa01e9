//! Shared Module
//!
//! Types shared by every layer of the crate: the wardrobe domain model,
//! the capture-boundary message schema, configuration and the common error
//! type. Everything here is plain data and serializable; nothing performs I/O
//! except configuration file loading.

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Wardrobe items, outfits, filters and sorting
pub mod wardrobe;

/// Messages crossing the embedded-page boundary
pub mod capture;

/// Re-export commonly used types for convenience
pub use capture::{DetectedImage, DetectionStats, ImageCandidate, PageMessage};
pub use config::{AppConfig, AppConfigBuilder, ConfigError, RetrySettings};
pub use error::SharedError;
pub use wardrobe::{Entity, EntityKind, ImageRef, Outfit, WardrobeItem};
