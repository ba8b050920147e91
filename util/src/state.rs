//! Application context shared by the command handlers and services.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::settings::{Settings, SettingsStore};

/// Central application state.
///
/// Cheap to clone: the connection is a pool handle and the rest sits behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: AppConfig, settings: Settings) -> Self {
        Self {
            db,
            config: Arc::new(config),
            settings: Arc::new(SettingsStore::new(settings)),
        }
    }

    /// Returns a shared reference to the internal `DatabaseConnection`.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The settings snapshot currently in effect.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.snapshot()
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    /// Shared handle to the store, for components that outlive a borrow of the state.
    pub fn settings_handle(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.settings)
    }
}
