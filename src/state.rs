use std::sync::Arc;
use tokio::sync::RwLock;

use sqlx::MySqlPool;

use crate::config::InstallerConfig;
use crate::session::SessionStore;

/// Shared handle to the pool opened by the Database Negotiator in step 2.
/// `None` until a connection test has succeeded.
pub type SharedDbPool = Arc<RwLock<Option<MySqlPool>>>;

/// Application state containing all shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InstallerConfig>,
    pub sessions: SessionStore,
    pub db: SharedDbPool,
}

impl AppState {
    pub fn new(config: InstallerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sessions: SessionStore::new(),
            db: Arc::new(RwLock::new(None)),
        }
    }
}
