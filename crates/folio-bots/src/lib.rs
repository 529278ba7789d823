//! Bundled default bots. These install automatically via the manager's
//! default-install pass and double as realistic fixtures for the engine.

mod editorial;
mod reviewer;

use std::sync::Arc;

use folio_plugin::BotFactory;

pub use editorial::{editorial_bot, EditorialBotFactory};
pub use reviewer::{reviewer_bot, ReviewerBotFactory};

/// Factory registry fed to the plugin loader.
pub fn builtin_factories() -> Vec<Arc<dyn BotFactory>> {
    vec![
        Arc::new(EditorialBotFactory),
        Arc::new(ReviewerBotFactory),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_factories_cover_default_bots() {
        let ids: Vec<String> = builtin_factories()
            .iter()
            .map(|f| f.manifest().platform.bot_id)
            .collect();
        assert!(ids.contains(&"editorial-bot".to_string()));
        assert!(ids.contains(&"reviewer-bot".to_string()));
    }

    #[test]
    fn bundled_manifests_validate() {
        for factory in builtin_factories() {
            let plugin = factory.build();
            let outcome = folio_plugin::validate(&plugin);
            assert!(outcome.is_valid, "{}: {:?}", plugin.bot_id(), outcome.errors);
        }
    }
}
