//! Shared test utilities for vupload integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated jobs backed by temp files, an in-memory
//!   transport and an in-memory job store
//! - Builders for server responses and video settings

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
