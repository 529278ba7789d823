//! Durable bot lifecycle: install, configure, enable, update, and bulk
//! reload against the installation store, wiring loaded plugins into the
//! executor.

mod config;
mod manager;
mod sqlite;
mod store;
mod uploads;

pub use config::{
    read_default_config, resolve_config, ConfigInput, ResolvedConfig, DEFAULT_CONFIG_FILE,
};
pub use manager::{BotManager, UPLOAD_DIR_ENV};
pub use sqlite::SqliteStore;
pub use store::{InstallationStore, StoredBotDefinition};
pub use uploads::DiskUploader;
