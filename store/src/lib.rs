//! # Clinisync Store
//!
//! SQLite persistence for the clinisync sync engine.
//!
//! [`SqliteStore`] implements [`clinisync_engine::RecordStore`] on top of an
//! `sqlx` pool. The schema is embedded and migrated on
//! [`SqliteStore::connect`].
//!
//! ```no_run
//! use clinisync_engine::Synchronizer;
//! use clinisync_store::{SqliteStore, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn open() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::from_dotenv()?;
//! let store = Arc::new(SqliteStore::connect(&config).await?);
//! let sync = Synchronizer::new(store);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
mod store;

pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use store::SqliteStore;
