//! End-to-end lifecycle tests: install, configure, enable, update, reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use folio_bots::builtin_factories;
use folio_engine::{Bot, BotExecutor, CommandHandler};
use folio_manager::{BotManager, ConfigInput, SqliteStore, DEFAULT_CONFIG_FILE};
use folio_plugin::{BotFactory, BotPlugin, PluginErrorCode, PluginLoader, MANIFEST_FILE};
use folio_schema::{
    Actor, BotDefinition, BotManifest, BotResponse, CommandSpec, ExecutionContext, InstallSource,
    JournalIdentity, ManifestAuthor, ParamMap, PlatformManifest,
};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Greet;

#[async_trait]
impl CommandHandler for Greet {
    async fn run(&self, _params: &ParamMap, ctx: &ExecutionContext) -> Result<BotResponse> {
        Ok(BotResponse::message(
            ctx.config["greeting"].as_str().unwrap_or("unset"),
        ))
    }
}

fn echo_manifest() -> BotManifest {
    BotManifest {
        name: "echo-bot".into(),
        version: "1.0.0".into(),
        description: "Echoes its configuration".into(),
        author: ManifestAuthor {
            name: "Folio".into(),
            email: None,
            url: None,
        },
        license: None,
        keywords: vec![],
        homepage: None,
        repository: None,
        platform: PlatformManifest {
            bot_id: "echo-bot".into(),
            api_version: "1".into(),
            bot_api_version: "1".into(),
            permissions: vec![],
            is_default: false,
            category: None,
            min_platform_version: None,
            supports_file_uploads: false,
        },
    }
}

struct EchoFactory;

impl BotFactory for EchoFactory {
    fn manifest(&self) -> BotManifest {
        echo_manifest()
    }

    fn build(&self) -> BotPlugin {
        let definition = BotDefinition::new("echo-bot", "Echo Bot", "Echoes config", "1.0.0")
            .with_command(CommandSpec::new("greet", "Greet with the configured greeting"));
        BotPlugin::new(self.manifest(), Bot::new(definition).command("greet", Greet))
    }
}

struct Harness {
    store: Arc<SqliteStore>,
    executor: Arc<BotExecutor>,
    manager: BotManager,
    uploads: PathBuf,
}

fn harness_at(dir: &Path) -> Harness {
    let store = Arc::new(SqliteStore::open(&dir.join("folio.db")).unwrap());
    let executor = Arc::new(BotExecutor::new());
    let loader = PluginLoader::new(dir.join("packages"))
        .with_factories(builtin_factories())
        .with_factory(EchoFactory);
    let uploads = dir.join("uploads");
    let manager =
        BotManager::new(store.clone(), loader, executor.clone()).with_upload_dir(&uploads);
    Harness {
        store,
        executor,
        manager,
        uploads,
    }
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new(
        "conv-1",
        Actor::user("user-1", "editor"),
        JournalIdentity {
            journal_id: "journal-1".into(),
            settings: Value::Null,
        },
    )
    .with_manuscript_id("ms-42")
}

#[tokio::test]
async fn install_wires_bot_into_executor() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    let record = h
        .manager
        .install(&InstallSource::package("editorial-bot"), None)
        .await
        .unwrap();
    assert!(record.enabled);
    assert_eq!(record.bot_id, "editorial-bot");

    let responses = h
        .executor
        .process_message(r#"@editorial-bot accept reason="High quality""#, &ctx())
        .await;
    assert_eq!(responses.len(), 1);
    assert!(responses[0].messages[0].content.contains("ACCEPTED"));
    assert!(h.executor.service_identity("editorial-bot").is_some());
}

#[tokio::test]
async fn second_install_is_already_installed() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    let first = h
        .manager
        .install(&InstallSource::package("editorial-bot"), None)
        .await
        .unwrap();
    let err = h
        .manager
        .install(&InstallSource::package("editorial-bot"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, PluginErrorCode::AlreadyInstalled);

    // The first installation record is untouched.
    let current = h
        .manager
        .list_installed()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.bot_id == "editorial-bot")
        .unwrap();
    assert_eq!(current.id, first.id);
    assert_eq!(current.installed_at, first.installed_at);
}

#[tokio::test]
async fn uninstall_removes_everything() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    h.manager
        .install(&InstallSource::package("editorial-bot"), None)
        .await
        .unwrap();
    h.manager.uninstall("editorial-bot").await.unwrap();

    assert!(!h.executor.is_registered("editorial-bot"));
    use folio_manager::InstallationStore;
    assert!(h
        .store
        .get_definition("editorial-bot")
        .await
        .unwrap()
        .is_none());

    let err = h.manager.uninstall("editorial-bot").await.unwrap_err();
    assert_eq!(err.code, PluginErrorCode::NotInstalled);
}

#[tokio::test]
async fn disable_is_idempotent_and_gates_execution() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    h.manager
        .install(&InstallSource::package("editorial-bot"), None)
        .await
        .unwrap();

    h.manager.disable("editorial-bot").await.unwrap();
    // Second disable is a no-op, not an error.
    h.manager.disable("editorial-bot").await.unwrap();
    let record = &h.manager.list_installed().await.unwrap()[0];
    assert!(!record.enabled);

    let responses = h
        .executor
        .process_message("@editorial-bot accept", &ctx())
        .await;
    assert!(responses[0].errors[0].contains("disabled"));

    h.manager.enable("editorial-bot").await.unwrap();
    let responses = h
        .executor
        .process_message("@editorial-bot accept", &ctx())
        .await;
    assert!(responses[0].messages[0].content.contains("ACCEPTED"));
}

#[tokio::test]
async fn configure_hot_swaps_running_bot() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    h.manager
        .install(
            &InstallSource::package("echo-bot"),
            Some(ConfigInput::Object(json!({"greeting": "hello"}))),
        )
        .await
        .unwrap();

    let responses = h.executor.process_message("@echo-bot greet", &ctx()).await;
    assert_eq!(responses[0].messages[0].content, "hello");

    h.manager
        .configure("echo-bot", ConfigInput::Yaml("greeting: bonjour\n".into()))
        .await
        .unwrap();

    // The next invocation sees the new configuration.
    let responses = h.executor.process_message("@echo-bot greet", &ctx()).await;
    assert_eq!(responses[0].messages[0].content, "bonjour");

    let record = &h.manager.list_installed().await.unwrap()[0];
    assert_eq!(record.config_yaml.as_deref(), Some("greeting: bonjour\n"));
}

#[tokio::test]
async fn update_preserves_configuration() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    h.manager
        .install(
            &InstallSource::package("echo-bot"),
            Some(ConfigInput::Object(json!({"greeting": "keep-me"}))),
        )
        .await
        .unwrap();

    let updated = h.manager.update("echo-bot", "2.0.0").await.unwrap();
    assert_eq!(updated.config["greeting"], "keep-me");
    match updated.source {
        InstallSource::Package { version, .. } => {
            assert_eq!(version.as_deref(), Some("2.0.0"));
        }
        other => panic!("unexpected source {other:?}"),
    }

    let responses = h.executor.process_message("@echo-bot greet", &ctx()).await;
    assert_eq!(responses[0].messages[0].content, "keep-me");
}

#[tokio::test]
async fn update_of_missing_bot_is_not_installed() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());
    let err = h.manager.update("ghost-bot", "2.0.0").await.unwrap_err();
    assert_eq!(err.code, PluginErrorCode::NotInstalled);
}

#[tokio::test]
async fn install_defaults_is_tolerant() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    let installed = h.manager.install_defaults().await;
    assert_eq!(installed, vec!["editorial-bot", "reviewer-bot"]);

    // Running again skips without failing the batch.
    let again = h.manager.install_defaults().await;
    assert!(again.is_empty());
    assert_eq!(h.manager.list_installed().await.unwrap().len(), 2);
}

#[tokio::test]
async fn install_hook_writes_upload() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    h.manager
        .install(&InstallSource::package("reviewer-bot"), None)
        .await
        .unwrap();

    let entries: Vec<_> = std::fs::read_dir(&h.uploads)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].ends_with("-reminder-template.md"));
}

#[tokio::test]
async fn reload_rebuilds_executor_state_after_restart() {
    let tmp = TempDir::new().unwrap();

    {
        let h = harness_at(tmp.path());
        h.manager.install_defaults().await;
        h.manager.disable("reviewer-bot").await.unwrap();
    }

    // Fresh process: same store, empty executor.
    let h = harness_at(tmp.path());
    assert!(h
        .executor
        .process_message("@editorial-bot status", &ctx())
        .await
        .is_empty());

    let count = h.manager.reload_all_bots().await.unwrap();
    assert_eq!(count, 1); // the disabled reviewer-bot stays out

    let responses = h
        .executor
        .process_message("@editorial-bot status", &ctx())
        .await;
    assert_eq!(responses.len(), 1);
    assert!(responses[0].messages[0].content.contains("ms-42"));
    assert!(!h.executor.is_registered("reviewer-bot"));
    assert!(h.executor.service_identity("editorial-bot").is_some());
}

#[tokio::test]
async fn help_falls_back_to_transient_load() {
    let tmp = TempDir::new().unwrap();

    {
        let h = harness_at(tmp.path());
        h.manager
            .install(&InstallSource::package("editorial-bot"), None)
            .await
            .unwrap();
    }

    // Fresh process without a reload: the executor knows nothing, so help
    // comes from a transient plugin load.
    let h = harness_at(tmp.path());
    let help = h.manager.get_bot_help("editorial-bot").await.unwrap().unwrap();
    assert!(help.contains("**Commands**"));
    assert!(help.contains("accept"));
    // The transient load left the executor untouched.
    assert!(!h.executor.is_registered("editorial-bot"));

    assert!(h.manager.get_bot_help("ghost-bot").await.unwrap().is_none());
}

#[tokio::test]
async fn local_source_merges_shipped_default_config() {
    let tmp = TempDir::new().unwrap();
    let h = harness_at(tmp.path());

    let plugin_dir = tmp.path().join("echo-bot-src");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(
        plugin_dir.join(MANIFEST_FILE),
        serde_yaml::to_string(&echo_manifest()).unwrap(),
    )
    .unwrap();
    std::fs::write(
        plugin_dir.join(DEFAULT_CONFIG_FILE),
        "greeting: default-hi\nretries: 2\n",
    )
    .unwrap();

    let supplied = "# operator override\ngreeting: override-hi\n";
    let record = h
        .manager
        .install(
            &InstallSource::local(&plugin_dir),
            Some(ConfigInput::Yaml(supplied.to_string())),
        )
        .await
        .unwrap();

    // Supplied config wins, shipped defaults fill the gaps, raw text
    // survives verbatim.
    assert_eq!(record.config["greeting"], "override-hi");
    assert_eq!(record.config["retries"], 2);
    assert_eq!(record.config_yaml.as_deref(), Some(supplied));

    let responses = h.executor.process_message("@echo-bot greet", &ctx()).await;
    assert_eq!(responses[0].messages[0].content, "override-hi");
}
