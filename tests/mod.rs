//! Test suite for wardrobe-core
//!
//! This module organizes all tests

pub mod common;
