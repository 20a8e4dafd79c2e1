//! Async MTProto server shell.
//!
//! Wraps the sans-IO core from `mtgate-mtproto` with:
//! * A tokio accept loop and a per-connection driver
//! * Auth key and session stores (in-memory, file, optional SQLite)
//! * A [`Dispatcher`] boundary for RPC handlers
//! * Per-user update sequences shared across connections
//!
//! # Quick start
//!
//! ```rust,no_run
//! use mtgate_mtproto::ServerKey;
//! use mtgate_server::{Config, Server, UnimplementedDispatcher, open_stores};
//!
//! # async fn f() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let key = ServerKey::from_pem(&std::fs::read_to_string(&config.rsa_key_path)?)?;
//! let server = Server::bind(&config, key, open_stores(&config)?, UnimplementedDispatcher).await?;
//! server.run().await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod errors;
pub mod server;
pub mod store;
pub mod updates;

pub use config::Config;
pub use connection::{Connection, ServerState};
pub use dispatch::{Dispatcher, Reply, RequestContext, UnimplementedDispatcher};
pub use errors::ServerError;
pub use server::Server;
pub use store::{AuthKeyStore, FileStore, InMemoryStore, SessionRecord, SessionStore, StoredAuthKey, Stores};
#[cfg(feature = "sqlite-store")]
pub use store::SqliteStore;
pub use updates::UpdateTracker;

/// Pick the store backend named by `config`: SQLite, then the file store,
/// then memory.
pub fn open_stores(config: &Config) -> Result<Stores, ServerError> {
    if let Some(path) = &config.sqlite_path {
        #[cfg(feature = "sqlite-store")]
        return Ok(Stores::shared(store::SqliteStore::new(path)?, config.store_timeout));
        #[cfg(not(feature = "sqlite-store"))]
        {
            log::error!("[mtgate] {} requested but built without sqlite-store", path.display());
            return Err(ServerError::Unsupported("sqlite"));
        }
    }
    if let Some(dir) = &config.data_dir {
        return Ok(Stores::shared(FileStore::new(dir)?, config.store_timeout));
    }
    log::warn!("[mtgate] no data directory configured, keys will not survive a restart");
    Ok(Stores::in_memory(config.store_timeout))
}
