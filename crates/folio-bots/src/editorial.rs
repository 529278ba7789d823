//! Editorial decisions: accept, reject, status, plus a passive trigger on
//! urgent threads.

use anyhow::Result;
use async_trait::async_trait;
use folio_engine::{Bot, CommandHandler};
use folio_plugin::{BotFactory, BotPlugin};
use folio_schema::{
    BotAction, BotDefinition, BotManifest, BotResponse, CommandSpec, ExecutionContext, HelpInfo,
    ManifestAuthor, ParamMap, Parameter, PlatformManifest,
};
use serde_json::json;

pub const BOT_ID: &str = "editorial-bot";
const VERSION: &str = "1.0.0";

/// Action kind consumed by the platform's action processor.
pub const UPDATE_MANUSCRIPT_STATUS: &str = "UPDATE_MANUSCRIPT_STATUS";

struct Decision {
    status: &'static str,
}

#[async_trait]
impl CommandHandler for Decision {
    async fn run(&self, params: &ParamMap, ctx: &ExecutionContext) -> Result<BotResponse> {
        let reason = params.get("reason").and_then(|v| v.as_str());
        let mut content = format!("Manuscript {}.", self.status);
        if let Some(reason) = reason {
            content.push_str(&format!(" Reason: {reason}"));
        }
        let response = BotResponse::message(&content).with_action(BotAction::new(
            UPDATE_MANUSCRIPT_STATUS,
            json!({
                "status": self.status,
                "manuscript_id": ctx.manuscript_id,
                "reason": reason,
                "decided_by": ctx.actor.user_id,
            }),
        ));
        Ok(response)
    }
}

struct Status;

#[async_trait]
impl CommandHandler for Status {
    async fn run(&self, _params: &ParamMap, ctx: &ExecutionContext) -> Result<BotResponse> {
        let status = ctx
            .manuscript
            .as_ref()
            .and_then(|m| m.get("status"))
            .and_then(|s| s.as_str())
            .unwrap_or("UNDER_REVIEW");
        let subject = ctx.manuscript_id.as_deref().unwrap_or("this manuscript");
        Ok(BotResponse::message(&format!(
            "Current status of {subject}: {status}"
        )))
    }
}

struct UrgentTrigger;

#[async_trait]
impl CommandHandler for UrgentTrigger {
    async fn run(&self, _params: &ParamMap, _ctx: &ExecutionContext) -> Result<BotResponse> {
        Ok(BotResponse::message(
            "This thread was flagged as urgent. An editor has been notified.",
        ))
    }
}

pub fn editorial_bot() -> Bot {
    let definition = BotDefinition::new(BOT_ID, "Editorial Bot", "Editorial decision workflow", VERSION)
        .with_command(
            CommandSpec::new("accept", "Accept the manuscript")
                .with_usage("@editorial-bot accept [reason]")
                .with_parameter(Parameter::string("reason", "Note recorded with the decision"))
                .with_permissions(&["editor"])
                .with_examples(&[
                    "@editorial-bot accept",
                    "@editorial-bot accept reason=\"Sound methodology\"",
                ]),
        )
        .with_command(
            CommandSpec::new("reject", "Reject the manuscript")
                .with_usage("@editorial-bot reject [reason]")
                .with_parameter(Parameter::string("reason", "Note recorded with the decision"))
                .with_permissions(&["editor"])
                .with_examples(&["@editorial-bot reject reason=\"Out of scope\""]),
        )
        .with_command(
            CommandSpec::new("status", "Show the manuscript's current status")
                .with_usage("@editorial-bot status"),
        )
        .with_command(CommandSpec::new(
            "auto-trigger",
            "React when a conversation mentions urgent matters",
        ))
        .with_keywords(&["urgent"])
        .with_help(HelpInfo {
            overview: Some(
                "Records editorial decisions on manuscripts and keeps the conversation informed."
                    .into(),
            ),
            quick_start: Some("Mention the bot with a decision, e.g. `@editorial-bot accept`.".into()),
            examples: vec!["@editorial-bot accept reason=\"Strong results\"".into()],
        });

    Bot::new(definition)
        .command("accept", Decision { status: "ACCEPTED" })
        .command("reject", Decision { status: "REJECTED" })
        .command("status", Status)
        .command("auto-trigger", UrgentTrigger)
}

pub struct EditorialBotFactory;

impl BotFactory for EditorialBotFactory {
    fn manifest(&self) -> BotManifest {
        BotManifest {
            name: BOT_ID.into(),
            version: VERSION.into(),
            description: "Editorial decision workflow".into(),
            author: ManifestAuthor {
                name: "Folio".into(),
                email: None,
                url: None,
            },
            license: Some("MIT".into()),
            keywords: vec!["editorial".into(), "workflow".into()],
            homepage: None,
            repository: None,
            platform: PlatformManifest {
                bot_id: BOT_ID.into(),
                api_version: "1".into(),
                bot_api_version: "1".into(),
                permissions: vec!["manuscripts:write".into()],
                is_default: true,
                category: Some("workflow".into()),
                min_platform_version: None,
                supports_file_uploads: false,
            },
        }
    }

    fn build(&self) -> BotPlugin {
        BotPlugin::new(self.manifest(), editorial_bot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_engine::BotExecutor;
    use folio_schema::{Actor, JournalIdentity};
    use serde_json::Value;

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

    fn executor() -> BotExecutor {
        let executor = BotExecutor::new();
        executor.register_command_bot(editorial_bot());
        executor.install_bot(BOT_ID, serde_json::json!({})).unwrap();
        executor
    }

    #[tokio::test]
    async fn accept_emits_status_action() {
        let responses = executor()
            .process_message(r#"@editorial-bot accept reason="High quality""#, &ctx())
            .await;
        assert_eq!(responses.len(), 1);
        let response = &responses[0];
        let content = &response.messages[0].content;
        assert!(content.contains("ACCEPTED"));
        assert!(content.contains("High quality"));
        assert_eq!(response.actions.len(), 1);
        assert_eq!(response.actions[0].kind, UPDATE_MANUSCRIPT_STATUS);
        assert_eq!(response.actions[0].data["status"], "ACCEPTED");
        assert_eq!(response.actions[0].data["manuscript_id"], "ms-42");
    }

    #[tokio::test]
    async fn reject_mirrors_accept() {
        let responses = executor()
            .process_message("@editorial-bot reject reason=scope", &ctx())
            .await;
        assert!(responses[0].messages[0].content.contains("REJECTED"));
        assert_eq!(responses[0].actions[0].data["status"], "REJECTED");
    }

    #[tokio::test]
    async fn unrecognized_command_lists_available() {
        let responses = executor()
            .process_message("@editorial-bot bogus", &ctx())
            .await;
        assert_eq!(responses.len(), 1);
        let content = &responses[0].messages[0].content;
        assert!(content.contains("**accept**"));
        assert!(content.contains("**status**"));
        assert!(!content.contains("undefined"));
    }

    #[tokio::test]
    async fn urgent_keyword_triggers_passively() {
        let responses = executor()
            .process_message("this revision is urgent, can anyone look?", &ctx())
            .await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].messages[0].content.contains("urgent"));
    }

    #[tokio::test]
    async fn non_editor_cannot_decide() {
        let mut reader = ctx();
        reader.actor.user_role = "author".into();
        let responses = executor()
            .process_message("@editorial-bot accept", &reader)
            .await;
        assert!(responses[0].errors[0].contains("Permission denied"));
        assert!(responses[0].actions.is_empty());
    }
}
