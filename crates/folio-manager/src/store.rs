//! Generic data-access interface for durable installation state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_schema::{BotInstallation, ServiceIdentity};
use serde::{Deserialize, Serialize};

/// Persisted bot metadata, upserted on every install so re-installing
/// refreshes it rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBotDefinition {
    pub bot_id: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait InstallationStore: Send + Sync {
    async fn upsert_definition(&self, definition: &StoredBotDefinition) -> Result<()>;
    async fn get_definition(&self, bot_id: &str) -> Result<Option<StoredBotDefinition>>;
    async fn delete_definition(&self, bot_id: &str) -> Result<()>;

    async fn insert_installation(&self, record: &BotInstallation) -> Result<()>;
    async fn get_installation(&self, bot_id: &str) -> Result<Option<BotInstallation>>;
    async fn list_installations(&self) -> Result<Vec<BotInstallation>>;
    async fn update_installation(&self, record: &BotInstallation) -> Result<()>;
    async fn delete_installation(&self, bot_id: &str) -> Result<()>;
    /// Installations still referencing the definition; the definition is
    /// only deleted when this reaches zero.
    async fn installation_count_for(&self, bot_id: &str) -> Result<u64>;

    /// Get or create the service-account identity a bot posts under.
    async fn ensure_service_identity(
        &self,
        bot_id: &str,
        address: &str,
    ) -> Result<ServiceIdentity>;
    async fn get_service_identity(&self, bot_id: &str) -> Result<Option<ServiceIdentity>>;
}
