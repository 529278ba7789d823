use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use folio_parser::{
    unrecognized_command_text, validate_parameters, validation_error_text, CommandParser,
    HELP_COMMAND,
};
use folio_schema::{
    ActionContext, BotDefinition, BotResponse, ExecutionContext, ParsedCommand, ServiceIdentity,
};
use serde_json::Value;

use crate::bot::Bot;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Overrides the default per-invocation timeout, in milliseconds.
pub const EXECUTION_TIMEOUT_ENV: &str = "FOLIO_EXECUTION_TIMEOUT_MS";

/// Per-bot config key consulted for a per-invocation timeout override.
const EXECUTION_TIMEOUT_KEY: &str = "execution_timeout";

#[derive(Debug, Clone)]
pub struct InstalledConfig {
    pub config: Value,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ActionOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

#[derive(Default)]
struct ExecutorState {
    bots: HashMap<String, Bot>,
    installed: HashMap<String, InstalledConfig>,
    identities: HashMap<String, ServiceIdentity>,
    parser: CommandParser,
}

/// Process-wide registry of bots and their installed configurations.
///
/// Registration maps are a cache over the durable installation store;
/// after a restart they are rebuilt by the manager's reload pass. Mutation
/// is a synchronous map update under the lock, so registrations never
/// interleave mid-step; handler futures run outside the lock.
pub struct BotExecutor {
    state: RwLock<ExecutorState>,
    default_timeout: Duration,
}

impl BotExecutor {
    pub fn new() -> Self {
        let ms = std::env::var(EXECUTION_TIMEOUT_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self::with_default_timeout(Duration::from_millis(ms))
    }

    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(ExecutorState::default()),
            default_timeout,
        }
    }

    /// Register a bot, injecting the default help command. Overwrites any
    /// prior registration with the same id.
    pub fn register_command_bot(&self, mut bot: Bot) {
        folio_parser::ensure_help_command(&mut bot.definition);
        let mut state = self.lock_write();
        state.parser.register_bot(bot.definition.clone());
        state.bots.insert(bot.definition.id.clone(), bot);
    }

    pub fn unregister_bot(&self, bot_id: &str) {
        let mut state = self.lock_write();
        state.parser.remove_bot(bot_id);
        state.bots.remove(bot_id);
        state.installed.remove(bot_id);
        state.identities.remove(bot_id);
    }

    /// Mark a registered bot installed with the given effective config.
    pub fn install_bot(&self, bot_id: &str, config: Value) -> Result<()> {
        let mut state = self.lock_write();
        if !state.bots.contains_key(bot_id) {
            bail!("cannot install bot '{bot_id}': not registered");
        }
        state.installed.insert(
            bot_id.to_string(),
            InstalledConfig {
                config,
                enabled: true,
            },
        );
        Ok(())
    }

    pub fn uninstall_bot(&self, bot_id: &str) {
        self.lock_write().installed.remove(bot_id);
    }

    /// Toggle the enabled gate. Returns false when the bot is not
    /// installed here.
    pub fn set_bot_enabled(&self, bot_id: &str, enabled: bool) -> bool {
        let mut state = self.lock_write();
        match state.installed.get_mut(bot_id) {
            Some(installed) => {
                installed.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn bind_service_identity(&self, bot_id: &str, identity: ServiceIdentity) {
        self.lock_write()
            .identities
            .insert(bot_id.to_string(), identity);
    }

    pub fn service_identity(&self, bot_id: &str) -> Option<ServiceIdentity> {
        self.lock_read().identities.get(bot_id).cloned()
    }

    pub fn is_registered(&self, bot_id: &str) -> bool {
        self.lock_read().bots.contains_key(bot_id)
    }

    pub fn is_installed(&self, bot_id: &str) -> bool {
        self.lock_read().installed.contains_key(bot_id)
    }

    pub fn registered_bots(&self) -> Vec<BotDefinition> {
        self.lock_read()
            .bots
            .values()
            .map(|b| b.definition.clone())
            .collect()
    }

    pub fn get_bot_help(&self, bot_id: &str) -> Option<String> {
        self.lock_read().parser.help_text(bot_id)
    }

    pub fn parse(&self, text: &str) -> Vec<ParsedCommand> {
        self.lock_read().parser.parse_message(text)
    }

    /// Execute one parsed command. Fails only when the bot is unregistered,
    /// not installed, or disabled; every execution-path failure (bad
    /// parameters, handler error, timeout) is normalized into the returned
    /// response instead.
    pub async fn execute_command(
        &self,
        parsed: &ParsedCommand,
        ctx: &ExecutionContext,
    ) -> Result<BotResponse> {
        let (bot, installed) = {
            let state = self.lock_read();
            let bot = state
                .bots
                .get(&parsed.bot_id)
                .cloned()
                .ok_or_else(|| anyhow!("bot '{}' is not registered", parsed.bot_id))?;
            let installed = state
                .installed
                .get(&parsed.bot_id)
                .cloned()
                .ok_or_else(|| anyhow!("bot '{}' is not installed", parsed.bot_id))?;
            (bot, installed)
        };
        if !installed.enabled {
            bail!("bot '{}' is disabled", parsed.bot_id);
        }

        let definition = &bot.definition;
        let Some(command) = definition.command(&parsed.command).filter(|_| !parsed.is_unrecognized)
        else {
            return Ok(stamp(
                BotResponse::message(&unrecognized_command_text(definition, &parsed.command)),
                definition,
            ));
        };

        if !command.permissions.is_empty()
            && !command.permissions.iter().any(|p| p == &ctx.actor.user_role)
        {
            let mut response = BotResponse::message(&format!(
                "You need one of the following roles to run `{}`: {}",
                command.name,
                command.permissions.join(", ")
            ));
            response
                .errors
                .push(format!("Permission denied for command '{}'", command.name));
            return Ok(stamp(response, definition));
        }

        let report = validate_parameters(&parsed.params, command);
        if !report.is_valid {
            let mut response =
                BotResponse::message(&validation_error_text(command, &report.errors));
            response.errors = report.errors;
            return Ok(stamp(response, definition));
        }

        let enhanced = ctx.with_merged_config(&installed.config);
        let timeout = configured_timeout(&enhanced.config).unwrap_or(self.default_timeout);

        let response = match bot.handler(&parsed.command) {
            Some(handler) => {
                match tokio::time::timeout(timeout, handler.run(&parsed.params, &enhanced)).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(err)) => {
                        tracing::warn!(bot_id = %definition.id, command = %parsed.command, error = %err, "command failed");
                        BotResponse::error(&err.to_string())
                    }
                    Err(_) => {
                        tracing::warn!(bot_id = %definition.id, command = %parsed.command, timeout_ms = timeout.as_millis() as u64, "command timed out");
                        BotResponse::error("Bot execution timeout")
                    }
                }
            }
            // The auto-injected help command has no bound body; the
            // executor answers it from declared metadata.
            None if parsed.command == HELP_COMMAND => {
                let text = match parsed.params.get("command").and_then(|v| v.as_str()) {
                    Some(name) => self
                        .lock_read()
                        .parser
                        .command_help_text(&definition.id, name),
                    None => self.lock_read().parser.help_text(&definition.id),
                };
                match text {
                    Some(text) => BotResponse::message(&text),
                    None => BotResponse::error("Help is unavailable for this bot"),
                }
            }
            None => BotResponse::error(&format!(
                "No executable body bound for command '{}'",
                parsed.command
            )),
        };

        Ok(stamp(response, definition))
    }

    /// Parse a message and execute each resulting command in scan order.
    /// Failures are isolated per command: one bot erroring does not block
    /// the rest of the batch.
    pub async fn process_message(
        &self,
        text: &str,
        ctx: &ExecutionContext,
    ) -> Vec<BotResponse> {
        let parsed = self.parse(text);
        let mut responses = Vec::with_capacity(parsed.len());
        for command in parsed {
            let response = match self.execute_command(&command, ctx).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(bot_id = %command.bot_id, error = %err, "command rejected");
                    let mut response = BotResponse::error(&err.to_string());
                    response.bot_id = Some(command.bot_id.clone());
                    response
                }
            };
            responses.push(response);
        }
        responses
    }

    /// Invoke a named action handler, normalizing errors into the outcome.
    pub async fn execute_action_handler(
        &self,
        bot_id: &str,
        action: &str,
        params: &Value,
        ctx: &ActionContext,
    ) -> ActionOutcome {
        let handler = self
            .lock_read()
            .bots
            .get(bot_id)
            .and_then(|bot| bot.action_handler(action));
        match handler {
            None => ActionOutcome::failed(format!(
                "bot '{bot_id}' has no action handler '{action}'"
            )),
            Some(handler) => match handler.run(params, ctx).await {
                Ok(()) => ActionOutcome::ok(),
                Err(err) => {
                    tracing::warn!(bot_id, action, error = %err, "action handler failed");
                    ActionOutcome::failed(err.to_string())
                }
            },
        }
    }

    /// Fan a lifecycle event out to every enabled bot declaring it as a
    /// trigger. Per-bot failures are logged and isolated.
    pub async fn dispatch_event(&self, event: &str, ctx: &ExecutionContext) -> Vec<BotResponse> {
        let targets: Vec<_> = {
            let state = self.lock_read();
            state
                .bots
                .values()
                .filter(|bot| bot.definition.triggers.iter().any(|t| t == event))
                .filter_map(|bot| {
                    let installed = state.installed.get(&bot.definition.id)?;
                    if !installed.enabled {
                        return None;
                    }
                    let handler = bot.event_handler()?;
                    Some((bot.definition.id.clone(), handler, installed.config.clone()))
                })
                .collect()
        };

        let mut responses = Vec::with_capacity(targets.len());
        for (bot_id, handler, config) in targets {
            let enhanced = ctx.with_merged_config(&config);
            let mut response =
                match tokio::time::timeout(self.default_timeout, handler.run(event, &enhanced))
                    .await
                {
                    Ok(Ok(response)) => response,
                    Ok(Err(err)) => {
                        tracing::warn!(bot_id = %bot_id, event, error = %err, "event handler failed");
                        BotResponse::error(&err.to_string())
                    }
                    Err(_) => BotResponse::error("Bot execution timeout"),
                };
            response.bot_id = Some(bot_id);
            responses.push(response);
        }
        responses
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, ExecutorState> {
        self.state.read().expect("executor lock poisoned")
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, ExecutorState> {
        self.state.write().expect("executor lock poisoned")
    }
}

impl Default for BotExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn stamp(mut response: BotResponse, definition: &BotDefinition) -> BotResponse {
    response.bot_id = Some(definition.id.clone());
    response
}

fn configured_timeout(config: &Value) -> Option<Duration> {
    let raw = config.get(EXECUTION_TIMEOUT_KEY)?;
    raw.as_u64()
        .or_else(|| raw.as_f64().map(|f| f as u64))
        .map(Duration::from_millis)
}
