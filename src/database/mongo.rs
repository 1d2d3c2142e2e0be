//! MongoDB database wrapper.

use anyhow::Context;
use mongodb::{options::ClientOptions, Client, Collection};
use tracing::info;

/// Database wrapper for MongoDB operations.
#[derive(Debug, Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB and verify the connection with a ping.
    ///
    /// # Errors
    /// Returns error if the URI is invalid or the server is unreachable.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .context("invalid MONGODB_URI")?;
        let client = Client::with_options(options)?;

        client
            .database("admin")
            .run_command(mongodb::bson::doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;

        info!("Successfully connected to MongoDB database {}", db_name);

        Ok(Self {
            db: client.database(db_name),
        })
    }

    /// Get a typed collection from the database.
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}
