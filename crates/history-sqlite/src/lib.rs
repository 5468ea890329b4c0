//! Content-addressed version history for tracked scripts.
//!
//! Metadata (targets, scans, scripts, versions) lives in SQLite; version
//! bodies are written once as individual files addressed by version id, so
//! the metadata stays small and a torn blob write can never corrupt it.

mod content;
mod insert;
mod models;
mod open;
mod query;
mod schema;

pub use content::hash_content;
pub use models::*;
pub use open::HistoryDb;
