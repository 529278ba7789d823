//! Plugin loading: resolves installation sources to directories, reads and
//! validates manifests, and binds them to compiled-in bot modules.
//!
//! Dynamic code loading is deliberately replaced by a static registry of
//! [`BotFactory`] values selected by bot id; everything data-driven (the
//! manifest, default config) is still re-read from disk on every load.

mod error;
mod loader;

pub use error::{PluginError, PluginErrorCode};
pub use loader::{
    validate, BotFactory, BotPlugin, LifecycleHook, PluginLoader, SourceFetcher,
    UnsupportedFetcher, ValidationOutcome, MANIFEST_FILE,
};
