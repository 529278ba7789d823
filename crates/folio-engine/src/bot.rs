//! A bot couples its declarative definition with the executable bodies
//! bound to command and action names.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use folio_schema::{
    ActionContext, BotDefinition, BotResponse, ExecutionContext, ParamMap, UploadedFile,
};
use serde_json::Value;

/// Executable body of one command. The engine treats it as opaque: it
/// receives coerced parameters and a per-invocation context and may fail.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, params: &ParamMap, ctx: &ExecutionContext) -> Result<BotResponse>;
}

/// Named handler decoupled from chat commands, used for button/callback
/// style follow-up actions.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, params: &Value, ctx: &ActionContext) -> Result<()>;
}

/// Writes install-time artifacts to durable storage and reports their
/// metadata.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, file_name: &str, data: &[u8]) -> Result<UploadedFile>;
}

/// Context handed to a bot's `on_install` hook.
pub struct InstallHookContext {
    /// Effective configuration resolved at install time.
    pub config: Value,
    pub uploads: Arc<dyn FileUploader>,
}

#[async_trait]
pub trait InstallHook: Send + Sync {
    async fn run(&self, ctx: &InstallHookContext) -> Result<()>;
}

/// Per-event lifecycle handler for declared trigger events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn run(&self, event: &str, ctx: &ExecutionContext) -> Result<BotResponse>;
}

#[derive(Clone)]
pub struct Bot {
    pub definition: BotDefinition,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    actions: HashMap<String, Arc<dyn ActionHandler>>,
    on_install: Option<Arc<dyn InstallHook>>,
    on_event: Option<Arc<dyn EventHandler>>,
}

impl Bot {
    pub fn new(definition: BotDefinition) -> Self {
        Self {
            definition,
            handlers: HashMap::new(),
            actions: HashMap::new(),
            on_install: None,
            on_event: None,
        }
    }

    pub fn command(mut self, name: &str, handler: impl CommandHandler + 'static) -> Self {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn action(mut self, name: &str, handler: impl ActionHandler + 'static) -> Self {
        self.actions.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn on_install(mut self, hook: impl InstallHook + 'static) -> Self {
        self.on_install = Some(Arc::new(hook));
        self
    }

    pub fn on_event(mut self, handler: impl EventHandler + 'static) -> Self {
        self.on_event = Some(Arc::new(handler));
        self
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(name).cloned()
    }

    pub fn install_hook(&self) -> Option<Arc<dyn InstallHook>> {
        self.on_install.clone()
    }

    pub fn event_handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.on_event.clone()
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.definition.id)
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}
