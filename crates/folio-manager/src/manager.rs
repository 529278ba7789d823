use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use folio_engine::{BotExecutor, InstallHookContext};
use folio_plugin::{PluginError, PluginErrorCode, PluginLoader};
use folio_schema::{BotInstallation, InstallSource};

use crate::config::{read_default_config, resolve_config, ConfigInput};
use crate::store::{InstallationStore, StoredBotDefinition};
use crate::uploads::DiskUploader;

/// Directory install-hook uploads land in.
pub const UPLOAD_DIR_ENV: &str = "FOLIO_UPLOAD_DIR";

const SERVICE_ADDRESS_DOMAIN: &str = "bots.folio.local";

/// Orchestrates durable bot lifecycle atop the plugin loader and the
/// executor. The executor's in-memory maps are a cache over this store;
/// call [`BotManager::reload_all_bots`] after a process restart to rebuild
/// them.
pub struct BotManager {
    store: Arc<dyn InstallationStore>,
    loader: PluginLoader,
    executor: Arc<BotExecutor>,
    upload_dir: PathBuf,
}

impl BotManager {
    pub fn new(
        store: Arc<dyn InstallationStore>,
        loader: PluginLoader,
        executor: Arc<BotExecutor>,
    ) -> Self {
        let upload_dir = std::env::var(UPLOAD_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("folio-uploads"));
        Self {
            store,
            loader,
            executor,
            upload_dir,
        }
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn executor(&self) -> &Arc<BotExecutor> {
        &self.executor
    }

    /// Load a plugin and persist it as an enabled installation.
    ///
    /// Fails with `ALREADY_INSTALLED` when the bot id is already present.
    /// The bot's `on_install` hook is best effort: its failure is logged,
    /// never propagated.
    pub async fn install(
        &self,
        source: &InstallSource,
        config: Option<ConfigInput>,
    ) -> Result<BotInstallation, PluginError> {
        let plugin = self.loader.load(source).await?;
        let bot_id = plugin.bot_id().to_string();

        let existing = self
            .store
            .get_installation(&bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;
        if existing.is_some() {
            return Err(PluginError::new(
                PluginErrorCode::AlreadyInstalled,
                format!("bot '{bot_id}' is already installed"),
            ));
        }

        let identity = self
            .store
            .ensure_service_identity(&bot_id, &format!("{bot_id}@{SERVICE_ADDRESS_DOMAIN}"))
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;

        let defaults = self
            .loader
            .plugin_path(&bot_id)
            .and_then(|dir| match read_default_config(&dir) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(bot_id = %bot_id, error = %err, "ignoring unreadable default config");
                    None
                }
            });
        let resolved = resolve_config(defaults.as_ref(), config.as_ref()).map_err(|err| {
            PluginError::new(
                PluginErrorCode::InstallFailed,
                format!("invalid configuration for bot '{bot_id}'"),
            )
            .with_cause(err)
        })?;

        let definition = &plugin.bot.definition;
        self.store
            .upsert_definition(&StoredBotDefinition {
                bot_id: bot_id.clone(),
                display_name: definition.name.clone(),
                description: definition.description.clone(),
                version: plugin.manifest.version.clone(),
                updated_at: Utc::now(),
            })
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;

        let mut record = BotInstallation::new(
            &bot_id,
            source.clone(),
            plugin.manifest.clone(),
            resolved.effective.clone(),
        );
        record.config_yaml = resolved.raw_yaml.clone();
        self.store
            .insert_installation(&record)
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;

        self.executor.register_command_bot(plugin.bot.clone());
        self.executor
            .install_bot(&bot_id, resolved.effective.clone())
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;
        self.executor.bind_service_identity(&bot_id, identity);

        if let Some(hook) = plugin.bot.install_hook() {
            let hook_ctx = InstallHookContext {
                config: resolved.effective.clone(),
                uploads: Arc::new(DiskUploader::new(self.upload_dir.clone())),
            };
            if let Err(err) = hook.run(&hook_ctx).await {
                tracing::warn!(bot_id = %bot_id, error = %err, "install hook failed");
            }
        }

        tracing::info!(bot_id = %bot_id, source = %source.describe(), "bot installed");
        Ok(record)
    }

    /// Remove the installation, unloading the plugin (tolerating an
    /// already-unloaded state) and deleting the stored definition once no
    /// installation references it.
    pub async fn uninstall(&self, bot_id: &str) -> Result<(), PluginError> {
        let existing = self
            .store
            .get_installation(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::UninstallFailed, err))?;
        if existing.is_none() {
            return Err(PluginError::new(
                PluginErrorCode::NotInstalled,
                format!("bot '{bot_id}' is not installed"),
            ));
        }

        match self.loader.unload(bot_id).await {
            Ok(()) => {}
            Err(err) if err.code == PluginErrorCode::NotLoaded => {}
            Err(err) => return Err(err),
        }

        self.executor.uninstall_bot(bot_id);
        self.executor.unregister_bot(bot_id);

        self.store
            .delete_installation(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::UninstallFailed, err))?;
        let remaining = self
            .store
            .installation_count_for(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::UninstallFailed, err))?;
        if remaining == 0 {
            self.store
                .delete_definition(bot_id)
                .await
                .map_err(|err| storage_error(PluginErrorCode::UninstallFailed, err))?;
        }

        tracing::info!(bot_id, "bot uninstalled");
        Ok(())
    }

    /// Uninstall then reinstall at the requested version, preserving the
    /// current configuration. Two-phase: no recovery beyond what the
    /// underlying operations guarantee.
    pub async fn update(
        &self,
        bot_id: &str,
        version: &str,
    ) -> Result<BotInstallation, PluginError> {
        let existing = self
            .store
            .get_installation(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::UpdateFailed, err))?
            .ok_or_else(|| {
                PluginError::new(
                    PluginErrorCode::NotInstalled,
                    format!("bot '{bot_id}' is not installed"),
                )
            })?;

        let preserved = match existing.config_yaml.clone() {
            Some(text) => ConfigInput::Yaml(text),
            None => ConfigInput::Object(existing.config.clone()),
        };
        let source = existing.source.at_version(version);

        self.uninstall(bot_id).await.map_err(|err| {
            PluginError::new(
                PluginErrorCode::UpdateFailed,
                format!("update of bot '{bot_id}' failed during uninstall"),
            )
            .with_cause(err.into())
        })?;
        self.install(&source, Some(preserved)).await.map_err(|err| {
            PluginError::new(
                PluginErrorCode::UpdateFailed,
                format!("update of bot '{bot_id}' failed during reinstall at {version}"),
            )
            .with_cause(err.into())
        })
    }

    pub async fn enable(&self, bot_id: &str) -> Result<(), PluginError> {
        self.set_enabled(bot_id, true).await
    }

    pub async fn disable(&self, bot_id: &str) -> Result<(), PluginError> {
        self.set_enabled(bot_id, false).await
    }

    async fn set_enabled(&self, bot_id: &str, enabled: bool) -> Result<(), PluginError> {
        let mut record = self
            .store
            .get_installation(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?
            .ok_or_else(|| {
                PluginError::new(
                    PluginErrorCode::NotInstalled,
                    format!("bot '{bot_id}' is not installed"),
                )
            })?;

        if record.enabled == enabled {
            return Ok(());
        }

        record.enabled = enabled;
        record.updated_at = Utc::now();
        self.store
            .update_installation(&record)
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;
        self.executor.set_bot_enabled(bot_id, enabled);
        tracing::info!(bot_id, enabled, "bot toggled");
        Ok(())
    }

    /// Persist new configuration and, when the bot is enabled, hot-swap
    /// the executor's copy so the next invocation sees it.
    ///
    /// The swap is not transactional with in-flight invocations: a command
    /// already running with the old merged config finishes with it.
    pub async fn configure(
        &self,
        bot_id: &str,
        config: ConfigInput,
    ) -> Result<BotInstallation, PluginError> {
        let mut record = self
            .store
            .get_installation(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?
            .ok_or_else(|| {
                PluginError::new(
                    PluginErrorCode::NotInstalled,
                    format!("bot '{bot_id}' is not installed"),
                )
            })?;

        let defaults = self
            .loader
            .plugin_path(bot_id)
            .and_then(|dir| read_default_config(&dir).ok().flatten());
        let resolved = resolve_config(defaults.as_ref(), Some(&config)).map_err(|err| {
            PluginError::new(
                PluginErrorCode::InstallFailed,
                format!("invalid configuration for bot '{bot_id}'"),
            )
            .with_cause(err)
        })?;

        record.config = resolved.effective.clone();
        record.config_yaml = resolved.raw_yaml.clone();
        record.updated_at = Utc::now();
        self.store
            .update_installation(&record)
            .await
            .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;

        if record.enabled && self.executor.is_registered(bot_id) {
            self.executor.uninstall_bot(bot_id);
            self.executor
                .install_bot(bot_id, resolved.effective.clone())
                .map_err(|err| storage_error(PluginErrorCode::InstallFailed, err))?;
        }

        tracing::info!(bot_id, "bot reconfigured");
        Ok(record)
    }

    /// Install every bundled default bot that is not already present.
    /// Individual failures (including `ALREADY_INSTALLED`) are logged and
    /// never abort the batch. Returns the ids newly installed.
    pub async fn install_defaults(&self) -> Vec<String> {
        let mut installed = Vec::new();
        for bot_id in self.loader.default_bot_ids() {
            match self.install(&InstallSource::package(&bot_id), None).await {
                Ok(_) => {
                    tracing::info!(bot_id = %bot_id, "default bot installed");
                    installed.push(bot_id);
                }
                Err(err) if err.code == PluginErrorCode::AlreadyInstalled => {
                    tracing::info!(bot_id = %bot_id, "default bot already installed");
                }
                Err(err) => {
                    tracing::warn!(bot_id = %bot_id, error = %err, "default bot install failed");
                }
            }
        }
        installed
    }

    /// Rebuild the executor's in-memory state from the durable store after
    /// a restart. Per-bot failures are logged and skipped. Returns the
    /// number of bots brought back.
    pub async fn reload_all_bots(&self) -> Result<usize, PluginError> {
        let records = self
            .store
            .list_installations()
            .await
            .map_err(|err| storage_error(PluginErrorCode::LoadFailed, err))?;

        let mut count = 0;
        for record in records.into_iter().filter(|r| r.enabled) {
            let plugin = match self.loader.load(&record.source).await {
                Ok(plugin) => plugin,
                Err(err) => {
                    tracing::warn!(bot_id = %record.bot_id, error = %err, "reload failed");
                    continue;
                }
            };
            self.executor.register_command_bot(plugin.bot.clone());
            if let Err(err) = self
                .executor
                .install_bot(&record.bot_id, record.config.clone())
            {
                tracing::warn!(bot_id = %record.bot_id, error = %err, "reload wiring failed");
                continue;
            }
            match self.store.get_service_identity(&record.bot_id).await {
                Ok(Some(identity)) => {
                    self.executor.bind_service_identity(&record.bot_id, identity);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(bot_id = %record.bot_id, error = %err, "identity lookup failed");
                }
            }
            count += 1;
        }
        tracing::info!(count, "bots reloaded");
        Ok(count)
    }

    /// Help text for a bot, preferring the executor's loaded state and
    /// falling back to a transient load that leaves durable state alone.
    pub async fn get_bot_help(&self, bot_id: &str) -> Result<Option<String>, PluginError> {
        if let Some(text) = self.executor.get_bot_help(bot_id) {
            return Ok(Some(text));
        }

        let Some(record) = self
            .store
            .get_installation(bot_id)
            .await
            .map_err(|err| storage_error(PluginErrorCode::LoadFailed, err))?
        else {
            return Ok(None);
        };

        let was_loaded = self.loader.is_loaded(bot_id);
        let plugin = self.loader.load(&record.source).await?;
        let mut definition = plugin.bot.definition.clone();
        folio_parser::ensure_help_command(&mut definition);
        let text = folio_parser::general_help(&definition);
        if !was_loaded {
            if let Err(err) = self.loader.unload(bot_id).await {
                tracing::warn!(bot_id, error = %err, "transient help unload failed");
            }
        }
        Ok(Some(text))
    }

    pub async fn list_installed(&self) -> Result<Vec<BotInstallation>, PluginError> {
        self.store
            .list_installations()
            .await
            .map_err(|err| storage_error(PluginErrorCode::LoadFailed, err))
    }
}

fn storage_error(code: PluginErrorCode, err: anyhow::Error) -> PluginError {
    PluginError::new(code, "installation storage failure").with_cause(err)
}
