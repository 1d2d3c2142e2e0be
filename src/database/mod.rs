//! Database module exports.

mod models;
mod mongo;
mod repository;

pub use models::*;
pub use mongo::Database;
pub use repository::{FloodSettingsRepository, MongoFloodSettings};

#[cfg(test)]
pub(crate) use repository::MemoryFloodSettings;
