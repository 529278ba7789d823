//! Bot registry and executor: resolves parsed commands to executable
//! bodies, validates parameters, enforces per-invocation timeouts, and
//! normalizes every failure into the response object.

mod bot;
mod executor;

pub use bot::{
    ActionHandler, Bot, CommandHandler, EventHandler, FileUploader, InstallHook,
    InstallHookContext,
};
pub use executor::{ActionOutcome, BotExecutor, InstalledConfig, EXECUTION_TIMEOUT_ENV};
