//! Reviewer chores: reminders and assignment overviews.

use anyhow::Result;
use async_trait::async_trait;
use folio_engine::{
    ActionHandler, Bot, CommandHandler, EventHandler, InstallHook, InstallHookContext,
};
use folio_plugin::{BotFactory, BotPlugin};
use folio_schema::{
    ActionContext, BotAction, BotDefinition, BotManifest, BotResponse, CommandSpec,
    ExecutionContext, ManifestAuthor, ParamMap, Parameter, PlatformManifest,
};
use serde_json::{json, Value};

pub const BOT_ID: &str = "reviewer-bot";
const VERSION: &str = "1.0.0";

pub const SCHEDULE_REMINDER: &str = "SCHEDULE_REMINDER";

struct Remind;

#[async_trait]
impl CommandHandler for Remind {
    async fn run(&self, params: &ParamMap, ctx: &ExecutionContext) -> Result<BotResponse> {
        let reviewer = params
            .get("reviewer")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let days = params.get("days").and_then(|v| v.as_f64()).unwrap_or(3.0);
        let response = BotResponse::message(&format!(
            "Reminder scheduled: {reviewer} will be nudged in {days} day(s)."
        ))
        .with_action(BotAction::new(
            SCHEDULE_REMINDER,
            json!({
                "reviewer": reviewer,
                "days": days,
                "manuscript_id": ctx.manuscript_id,
            }),
        ));
        Ok(response)
    }
}

struct Assignments;

#[async_trait]
impl CommandHandler for Assignments {
    async fn run(&self, _params: &ParamMap, ctx: &ExecutionContext) -> Result<BotResponse> {
        let subject = ctx.manuscript_id.as_deref().unwrap_or("this conversation");
        Ok(BotResponse::message(&format!(
            "Review assignments for {subject} are tracked on the reviews page."
        )))
    }
}

struct SendReminderAction;

#[async_trait]
impl ActionHandler for SendReminderAction {
    async fn run(&self, params: &Value, _ctx: &ActionContext) -> Result<()> {
        let reviewer = params.get("reviewer").and_then(|v| v.as_str());
        if reviewer.is_none() {
            anyhow::bail!("reminder action needs a reviewer");
        }
        Ok(())
    }
}

/// Seeds the reminder template used by outbound nudges.
struct SeedTemplates;

#[async_trait]
impl InstallHook for SeedTemplates {
    async fn run(&self, ctx: &InstallHookContext) -> Result<()> {
        let greeting = ctx
            .config
            .get("reminder_greeting")
            .and_then(|v| v.as_str())
            .unwrap_or("Dear reviewer,");
        let body = format!("{greeting}\n\nYour review is due soon. Thank you!\n");
        ctx.uploads
            .upload("reminder-template.md", body.as_bytes())
            .await?;
        Ok(())
    }
}

struct Submitted;

#[async_trait]
impl EventHandler for Submitted {
    async fn run(&self, event: &str, _ctx: &ExecutionContext) -> Result<BotResponse> {
        Ok(BotResponse::message(&format!(
            "Noted ({event}): reviewer invitations can go out now."
        )))
    }
}

pub fn reviewer_bot() -> Bot {
    let definition = BotDefinition::new(BOT_ID, "Reviewer Bot", "Reviewer reminders and assignments", VERSION)
        .with_command(
            CommandSpec::new("remind", "Schedule a reminder for a reviewer")
                .with_usage("@reviewer-bot remind @reviewer [days=N]")
                .with_parameter(
                    Parameter::string("reviewer", "Reviewer to remind, as an @mention").required(),
                )
                .with_parameter(
                    Parameter::number("days", "Days until the nudge goes out")
                        .with_default(json!(3)),
                )
                .with_examples(&[
                    "@reviewer-bot remind @jane.doe",
                    "@reviewer-bot remind @jane.doe days=7",
                ]),
        )
        .with_command(
            CommandSpec::new("assignments", "List open review assignments")
                .with_usage("@reviewer-bot assignments"),
        )
        .with_triggers(&["manuscript-submitted"]);

    Bot::new(definition)
        .command("remind", Remind)
        .command("assignments", Assignments)
        .action("send_reminder", SendReminderAction)
        .on_install(SeedTemplates)
        .on_event(Submitted)
}

pub struct ReviewerBotFactory;

impl BotFactory for ReviewerBotFactory {
    fn manifest(&self) -> BotManifest {
        BotManifest {
            name: BOT_ID.into(),
            version: VERSION.into(),
            description: "Reviewer reminders and assignments".into(),
            author: ManifestAuthor {
                name: "Folio".into(),
                email: None,
                url: None,
            },
            license: Some("MIT".into()),
            keywords: vec!["reviews".into()],
            homepage: None,
            repository: None,
            platform: PlatformManifest {
                bot_id: BOT_ID.into(),
                api_version: "1".into(),
                bot_api_version: "1".into(),
                permissions: vec!["reviews:read".into()],
                is_default: true,
                category: Some("reviews".into()),
                min_platform_version: None,
                supports_file_uploads: true,
            },
        }
    }

    fn build(&self) -> BotPlugin {
        BotPlugin::new(self.manifest(), reviewer_bot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_engine::{BotExecutor, FileUploader};
    use folio_schema::{Actor, JournalIdentity, UploadedFile};
    use std::sync::{Arc, Mutex};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            "conv-1",
            Actor::user("user-1", "editor"),
            JournalIdentity {
                journal_id: "journal-1".into(),
                settings: Value::Null,
            },
        )
    }

    fn executor() -> BotExecutor {
        let executor = BotExecutor::new();
        executor.register_command_bot(reviewer_bot());
        executor.install_bot(BOT_ID, json!({})).unwrap();
        executor
    }

    #[tokio::test]
    async fn remind_captures_mention_and_defaults_days() {
        let responses = executor()
            .process_message("@reviewer-bot remind @jane.doe", &ctx())
            .await;
        assert_eq!(responses.len(), 1);
        let action = &responses[0].actions[0];
        assert_eq!(action.kind, SCHEDULE_REMINDER);
        assert_eq!(action.data["reviewer"], "@jane.doe");
        assert_eq!(action.data["days"], json!(3.0));
    }

    #[tokio::test]
    async fn remind_without_reviewer_fails_validation() {
        let responses = executor()
            .process_message("@reviewer-bot remind", &ctx())
            .await;
        assert!(responses[0]
            .errors
            .iter()
            .any(|e| e.contains("Required parameter 'reviewer' is missing")));
        assert!(responses[0].actions.is_empty());
    }

    #[tokio::test]
    async fn send_reminder_action_normalizes_errors() {
        let executor = executor();
        let ok = executor
            .execute_action_handler(
                BOT_ID,
                "send_reminder",
                &json!({"reviewer": "@jane.doe"}),
                &ActionContext::default(),
            )
            .await;
        assert!(ok.success);

        let failed = executor
            .execute_action_handler(
                BOT_ID,
                "send_reminder",
                &json!({}),
                &ActionContext::default(),
            )
            .await;
        assert!(!failed.success);
        assert!(failed.error.unwrap().contains("needs a reviewer"));
    }

    #[tokio::test]
    async fn install_hook_uploads_template() {
        struct RecordingUploader(Arc<Mutex<Vec<String>>>);

        #[async_trait]
        impl FileUploader for RecordingUploader {
            async fn upload(&self, file_name: &str, data: &[u8]) -> Result<UploadedFile> {
                self.0.lock().unwrap().push(file_name.to_string());
                Ok(UploadedFile {
                    file_name: file_name.to_string(),
                    stored_path: format!("/uploads/{file_name}"),
                    content_hash: "abc".into(),
                    size: data.len() as u64,
                })
            }
        }

        let uploaded = Arc::new(Mutex::new(Vec::new()));
        let hook_ctx = InstallHookContext {
            config: json!({"reminder_greeting": "Hello!"}),
            uploads: Arc::new(RecordingUploader(uploaded.clone())),
        };
        let bot = reviewer_bot();
        bot.install_hook().unwrap().run(&hook_ctx).await.unwrap();
        assert_eq!(*uploaded.lock().unwrap(), vec!["reminder-template.md"]);
    }

    #[tokio::test]
    async fn submitted_event_produces_note() {
        let executor = executor();
        let responses = executor.dispatch_event("manuscript-submitted", &ctx()).await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].messages[0].content.contains("manuscript-submitted"));
    }
}
