//! mtgdb Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities used across the mtgdb workspace:
//!
//! - **Error handling**: the workspace error type and result alias
//! - **Logging**: centralized `tracing` setup
//! - **UUID derivation**: deterministic identifiers that must stay stable
//!   across rebuilds and across implementations
//! - **Card math**: mana-cost parsing, color ordering, finish ordering,
//!   ASCII name folding

pub mod ascii;
pub mod error;
pub mod finishes;
pub mod logging;
pub mod mana;
pub mod types;
pub mod uuid5;

// Re-export commonly used types
pub use error::{MtgdbError, Result};
