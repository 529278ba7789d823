use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use folio_engine::Bot;
use folio_schema::{is_valid_bot_id, BotManifest, InstallSource};
use uuid::Uuid;

use crate::error::{PluginError, PluginErrorCode};

/// Manifest file expected at the root of a plugin source directory.
pub const MANIFEST_FILE: &str = "manifest.yaml";

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// A loaded plugin: the manifest that shipped with it plus the bot it
/// exposes.
#[derive(Clone)]
pub struct BotPlugin {
    pub manifest: BotManifest,
    pub bot: Bot,
    activate: Option<Arc<dyn LifecycleHook>>,
    deactivate: Option<Arc<dyn LifecycleHook>>,
}

impl std::fmt::Debug for BotPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotPlugin")
            .field("manifest", &self.manifest)
            .field("bot", &self.bot.id())
            .field("activate", &self.activate.is_some())
            .field("deactivate", &self.deactivate.is_some())
            .finish()
    }
}

impl BotPlugin {
    pub fn new(manifest: BotManifest, bot: Bot) -> Self {
        Self {
            manifest,
            bot,
            activate: None,
            deactivate: None,
        }
    }

    pub fn on_activate(mut self, hook: impl LifecycleHook + 'static) -> Self {
        self.activate = Some(Arc::new(hook));
        self
    }

    pub fn on_deactivate(mut self, hook: impl LifecycleHook + 'static) -> Self {
        self.deactivate = Some(Arc::new(hook));
        self
    }

    pub fn bot_id(&self) -> &str {
        self.bot.id()
    }
}

/// Compiled-in bot module. `build` returns a fresh plugin instance on
/// every call, so repeated loads never share handler state.
pub trait BotFactory: Send + Sync {
    fn manifest(&self) -> BotManifest;
    fn build(&self) -> BotPlugin;
}

/// Materializes a URL source into a local directory. Transport is an
/// external collaborator; the default implementation refuses.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PathBuf>;
}

pub struct UnsupportedFetcher;

#[async_trait]
impl SourceFetcher for UnsupportedFetcher {
    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        anyhow::bail!("no source fetcher configured for {url}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

enum ResolvedSource {
    Dir(PathBuf),
    /// Package with no on-disk presence, served by a compiled-in factory.
    Builtin(String),
}

#[derive(Default)]
struct LoaderState {
    loaded: HashMap<String, BotPlugin>,
    paths: HashMap<String, PathBuf>,
}

pub struct PluginLoader {
    factories: HashMap<String, Arc<dyn BotFactory>>,
    fetcher: Arc<dyn SourceFetcher>,
    packages_dir: PathBuf,
    work_dir: PathBuf,
    state: RwLock<LoaderState>,
}

impl PluginLoader {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            factories: HashMap::new(),
            fetcher: Arc::new(UnsupportedFetcher),
            packages_dir: packages_dir.into(),
            work_dir: std::env::temp_dir().join("folio-plugins"),
            state: RwLock::new(LoaderState::default()),
        }
    }

    pub fn with_factory(mut self, factory: impl BotFactory + 'static) -> Self {
        let id = factory.manifest().platform.bot_id;
        self.factories.insert(id, Arc::new(factory));
        self
    }

    pub fn with_factories(
        mut self,
        factories: impl IntoIterator<Item = Arc<dyn BotFactory>>,
    ) -> Self {
        for factory in factories {
            let id = factory.manifest().platform.bot_id;
            self.factories.insert(id, factory);
        }
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl SourceFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn has_factory(&self, bot_id: &str) -> bool {
        self.factories.contains_key(bot_id)
    }

    /// Bot ids of compiled-in modules flagged as default installs.
    pub fn default_bot_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .factories
            .values()
            .filter(|f| f.manifest().platform.is_default)
            .map(|f| f.manifest().platform.bot_id)
            .collect();
        ids.sort();
        ids
    }

    pub fn is_loaded(&self, bot_id: &str) -> bool {
        self.lock_read().loaded.contains_key(bot_id)
    }

    pub fn loaded_plugin(&self, bot_id: &str) -> Option<BotPlugin> {
        self.lock_read().loaded.get(bot_id).cloned()
    }

    /// Resolved filesystem path of a loaded plugin, when it has one.
    pub fn plugin_path(&self, bot_id: &str) -> Option<PathBuf> {
        self.lock_read().paths.get(bot_id).cloned()
    }

    /// Resolve a source, build the plugin from its compiled-in module,
    /// validate it, cache it by bot id, and run its activate hook.
    ///
    /// The manifest is re-read from disk on every call, so repeated loads
    /// see on-disk changes.
    pub async fn load(&self, source: &InstallSource) -> Result<BotPlugin, PluginError> {
        let resolved = self.resolve_source(source).await?;

        let (manifest, dir) = match resolved {
            ResolvedSource::Dir(dir) => (read_manifest(&dir)?, Some(dir)),
            ResolvedSource::Builtin(name) => {
                let factory = self.factories.get(&name).ok_or_else(|| {
                    PluginError::new(
                        PluginErrorCode::ModuleLoadFailed,
                        format!("no compiled-in module for package '{name}'"),
                    )
                })?;
                (factory.manifest(), None)
            }
        };

        let bot_id = manifest.platform.bot_id.clone();
        let factory = self.factories.get(&bot_id).ok_or_else(|| {
            PluginError::new(
                PluginErrorCode::ModuleLoadFailed,
                format!("no compiled-in module registered for bot '{bot_id}'"),
            )
        })?;

        let mut plugin = factory.build();
        // The on-disk manifest is authoritative over the factory's copy.
        plugin.manifest = manifest;

        let outcome = validate(&plugin);
        if !outcome.is_valid {
            return Err(PluginError::new(
                PluginErrorCode::ValidationFailed,
                format!("plugin validation failed: {}", outcome.errors.join("; ")),
            ));
        }

        {
            let mut state = self.lock_write();
            state.loaded.insert(bot_id.clone(), plugin.clone());
            match &dir {
                Some(dir) => {
                    state.paths.insert(bot_id.clone(), dir.clone());
                }
                None => {
                    state.paths.remove(&bot_id);
                }
            }
        }

        if let Some(hook) = plugin.activate.clone() {
            if let Err(err) = hook.run().await {
                self.lock_write().loaded.remove(&bot_id);
                return Err(PluginError::new(
                    PluginErrorCode::LoadFailed,
                    format!("activate hook failed for bot '{bot_id}'"),
                )
                .with_cause(err));
            }
        }

        tracing::info!(bot_id = %bot_id, source = %source.describe(), "plugin loaded");
        Ok(plugin)
    }

    /// Run the deactivate hook and evict the plugin from the cache.
    pub async fn unload(&self, bot_id: &str) -> Result<(), PluginError> {
        let plugin = self.lock_read().loaded.get(bot_id).cloned().ok_or_else(|| {
            PluginError::new(
                PluginErrorCode::NotLoaded,
                format!("bot '{bot_id}' is not loaded"),
            )
        })?;

        if let Some(hook) = plugin.deactivate.clone() {
            if let Err(err) = hook.run().await {
                tracing::warn!(bot_id, error = %err, "deactivate hook failed");
            }
        }

        let mut state = self.lock_write();
        state.loaded.remove(bot_id);
        state.paths.remove(bot_id);
        tracing::info!(bot_id, "plugin unloaded");
        Ok(())
    }

    async fn resolve_source(&self, source: &InstallSource) -> Result<ResolvedSource, PluginError> {
        match source {
            InstallSource::Local { path } => {
                if path.is_dir() {
                    Ok(ResolvedSource::Dir(path.clone()))
                } else {
                    Err(PluginError::new(
                        PluginErrorCode::LoadFailed,
                        format!("local plugin path does not exist: {}", path.display()),
                    ))
                }
            }
            InstallSource::Package { name, version } => {
                let mut candidates = Vec::new();
                if let Some(version) = version {
                    candidates.push(self.packages_dir.join(format!("{name}-{version}")));
                }
                candidates.push(self.packages_dir.join(name));
                if let Some(dir) = candidates.into_iter().find(|c| c.is_dir()) {
                    return Ok(ResolvedSource::Dir(dir));
                }
                if self.factories.contains_key(name) {
                    return Ok(ResolvedSource::Builtin(name.clone()));
                }
                Err(PluginError::new(
                    PluginErrorCode::NpmInstallFailed,
                    format!(
                        "package '{name}' not found under {}",
                        self.packages_dir.display()
                    ),
                ))
            }
            InstallSource::Git { url, reference } => self
                .clone_git(url, reference.as_deref())
                .await
                .map(ResolvedSource::Dir),
            InstallSource::Url { url } => self
                .fetcher
                .fetch(url)
                .await
                .map(ResolvedSource::Dir)
                .map_err(|err| {
                    PluginError::new(
                        PluginErrorCode::UrlDownloadFailed,
                        format!("download failed for {url}"),
                    )
                    .with_cause(err)
                }),
        }
    }

    async fn clone_git(&self, url: &str, reference: Option<&str>) -> Result<PathBuf, PluginError> {
        let clone_failed = |message: String| {
            PluginError::new(PluginErrorCode::GitCloneFailed, message)
        };

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|err| {
                clone_failed(format!(
                    "cannot create work dir {}",
                    self.work_dir.display()
                ))
                .with_cause(err.into())
            })?;

        let dest = self.work_dir.join(format!("git-{}", Uuid::new_v4()));
        let mut cmd = tokio::process::Command::new("git");
        cmd.arg("clone").arg("--depth").arg("1");
        if let Some(reference) = reference {
            cmd.arg("--branch").arg(reference);
        }
        cmd.arg(url).arg(&dest);

        let output = cmd
            .output()
            .await
            .map_err(|err| clone_failed(format!("failed to run git: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(clone_failed(format!(
                "git clone failed for {url}: {}",
                stderr.trim()
            )));
        }
        Ok(dest)
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, LoaderState> {
        self.state.read().expect("loader lock poisoned")
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, LoaderState> {
        self.state.write().expect("loader lock poisoned")
    }
}

fn read_manifest(dir: &Path) -> Result<BotManifest, PluginError> {
    let path = dir.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&path).map_err(|err| {
        PluginError::new(
            PluginErrorCode::ModuleLoadFailed,
            format!("cannot read {}", path.display()),
        )
        .with_cause(err.into())
    })?;
    serde_yaml::from_str(&raw).map_err(|err| {
        PluginError::new(
            PluginErrorCode::ModuleLoadFailed,
            format!("invalid manifest at {}", path.display()),
        )
        .with_cause(err.into())
    })
}

/// Structural validation of a plugin: manifest conformance plus bot-shape
/// invariants. Returns a result object without throwing.
pub fn validate(plugin: &BotPlugin) -> ValidationOutcome {
    let mut errors = Vec::new();
    let manifest = &plugin.manifest;
    let definition = &plugin.bot.definition;

    if manifest.name.trim().is_empty() {
        errors.push("manifest name is empty".to_string());
    }
    if manifest.description.trim().is_empty() {
        errors.push("manifest description is empty".to_string());
    }
    if manifest.author.name.trim().is_empty() {
        errors.push("manifest author name is empty".to_string());
    }
    if let Err(err) = manifest.semver() {
        errors.push(format!("manifest version '{}' is not semver: {err}", manifest.version));
    }

    if !is_valid_bot_id(&definition.id) {
        errors.push(format!(
            "bot id '{}' must be lowercase alphanumeric plus hyphens",
            definition.id
        ));
    }
    if manifest.platform.bot_id != definition.id {
        errors.push(format!(
            "manifest declares bot id '{}' but the bot exposes '{}'",
            manifest.platform.bot_id, definition.id
        ));
    }

    if definition.commands.is_empty() {
        errors.push("bot declares no commands".to_string());
    }
    let mut seen = std::collections::HashSet::new();
    for command in &definition.commands {
        if command.name.trim().is_empty() {
            errors.push("command with empty name".to_string());
            continue;
        }
        if !seen.insert(command.name.clone()) {
            errors.push(format!("duplicate command name '{}'", command.name));
        }
        if command.description.trim().is_empty() {
            errors.push(format!("command '{}' has no description", command.name));
        }
        if plugin.bot.handler(&command.name).is_none() && command.name != "help" {
            errors.push(format!(
                "command '{}' has no executable body",
                command.name
            ));
        }
        let mut param_names = std::collections::HashSet::new();
        for param in &command.parameters {
            if !param_names.insert(param.name.clone()) {
                errors.push(format!(
                    "command '{}' repeats parameter '{}'",
                    command.name, param.name
                ));
            }
            if param.kind == folio_schema::ParameterKind::Enum && param.enum_values.is_empty() {
                errors.push(format!(
                    "enum parameter '{}' on command '{}' has no values",
                    param.name, command.name
                ));
            }
        }
    }

    ValidationOutcome {
        is_valid: errors.is_empty(),
        errors,
    }
}
