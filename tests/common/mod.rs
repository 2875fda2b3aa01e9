//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - An in-process backend with failure injection and call gating
//! - Fixtures and a fully wired `AppState` harness
//! - Custom assertion macros

pub mod assertions;

// Re-export commonly used utilities
pub use fixtures::*;
pub use mock_backend::*;
