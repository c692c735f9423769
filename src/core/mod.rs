//! Core domain models
//!
//! This module defines the configuration, result and context types that
//! every pipe reads and writes.

pub mod config;
pub mod result;
pub mod condition;
pub mod context;
pub mod state;

pub use config::*;
pub use result::*;
pub use context::*;
pub use state::*;
