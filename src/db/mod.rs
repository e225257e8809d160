//! Database module for NanoStatus.
//!
//! Provides SQLite storage for monitor definitions and the probe history,
//! with embedded migrations.

mod history;
mod models;
mod store;

pub use history::*;
pub use models::*;
pub use store::*;
