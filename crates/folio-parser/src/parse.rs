//! Message scanning: mention-with-command, bare mention, keyword trigger.

use std::collections::HashMap;
use std::sync::OnceLock;

use folio_schema::{BotDefinition, ParamMap, ParsedCommand};
use regex::Regex;
use serde_json::Value;

use crate::help::{command_help, ensure_help_command, general_help, HELP_COMMAND};
use crate::params::parse_params;

/// Command a bot may declare to react to passive keyword matches.
pub const AUTO_TRIGGER_COMMAND: &str = "auto-trigger";

/// Key the raw remainder is stored under for unrecognized commands.
const RAW_PARAM: &str = "raw";

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9][A-Za-z0-9_-]*)").unwrap())
}

fn command_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t]+(\w[\w-]*)").unwrap())
}

/// Registry of bot definitions plus the message grammar over them.
#[derive(Debug, Default)]
pub struct CommandParser {
    bots: HashMap<String, BotDefinition>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a bot definition keyed by id, overwriting any prior
    /// registration. A default `help` command is injected if the bot does
    /// not declare one.
    pub fn register_bot(&mut self, mut definition: BotDefinition) {
        ensure_help_command(&mut definition);
        self.bots.insert(definition.id.clone(), definition);
    }

    pub fn remove_bot(&mut self, bot_id: &str) {
        self.bots.remove(bot_id);
    }

    pub fn bot(&self, bot_id: &str) -> Option<&BotDefinition> {
        self.bots.get(bot_id)
    }

    pub fn bots(&self) -> impl Iterator<Item = &BotDefinition> {
        self.bots.values()
    }

    /// General help text for a registered bot.
    pub fn help_text(&self, bot_id: &str) -> Option<String> {
        self.bots.get(bot_id).map(general_help)
    }

    /// Per-command help text, falling back to general help for an unknown
    /// command name.
    pub fn command_help_text(&self, bot_id: &str, command: &str) -> Option<String> {
        let bot = self.bots.get(bot_id)?;
        Some(match bot.command(command) {
            Some(cmd) => command_help(bot, cmd),
            None => general_help(bot),
        })
    }

    /// Resolve a mention name to a bot. Tries, in order: exact id,
    /// normalized display name (spaces to hyphens), first word of display
    /// name, id-with-hyphen-suffix prefix ("editorial" matches
    /// "editorial-bot"). Case-insensitive except the exact-id fast path.
    fn resolve(&self, name: &str) -> Option<&BotDefinition> {
        if let Some(bot) = self.bots.get(name) {
            return Some(bot);
        }
        let lower = name.to_lowercase();
        if let Some(bot) = self
            .bots
            .values()
            .find(|b| b.name.to_lowercase().replace(' ', "-") == lower)
        {
            return Some(bot);
        }
        if let Some(bot) = self.bots.values().find(|b| {
            b.name
                .split_whitespace()
                .next()
                .map(|w| w.to_lowercase() == lower)
                .unwrap_or(false)
        }) {
            return Some(bot);
        }
        let prefix = format!("{lower}-");
        self.bots
            .iter()
            .find(|(id, _)| id.starts_with(&prefix))
            .map(|(_, bot)| bot)
    }

    /// Scan a message for bot invocations.
    pub fn parse_message(&self, text: &str) -> Vec<ParsedCommand> {
        let mut parsed = Vec::new();

        // Every resolved mention anchors its own segment; a segment runs to
        // the next resolved mention, so one bot's parameters never swallow
        // another bot's invocation. Unresolved mentions stay inside the
        // surrounding segment and are skipped silently.
        let anchors: Vec<(usize, usize, &BotDefinition)> = mention_re()
            .captures_iter(text)
            .filter_map(|cap| {
                let full = cap.get(0)?;
                let name = cap.get(1)?.as_str();
                self.resolve(name).map(|bot| (full.start(), full.end(), bot))
            })
            .collect();

        for (i, (start, name_end, bot)) in anchors.iter().enumerate() {
            let segment_end = anchors
                .get(i + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(text.len());
            let after_name = &text[*name_end..segment_end];

            let Some(word) = command_word_re().captures(after_name) else {
                // Bare mention: invoke the bot's help command.
                tracing::debug!(bot_id = %bot.id, "bare mention");
                let mut command = ParsedCommand::new(&bot.id, HELP_COMMAND);
                if let Some(help) = bot.command(HELP_COMMAND) {
                    command.params = parse_params("", help);
                }
                command.matched_text = text[*start..*name_end].to_string();
                parsed.push(command);
                continue;
            };

            let Some(word_match) = word.get(1) else {
                continue;
            };
            let command_word = word_match.as_str();
            let rest_start = name_end + word_match.end();
            // Parameters run to the end of the line within this segment.
            let rest_end = text[rest_start..segment_end]
                .find('\n')
                .map(|p| rest_start + p)
                .unwrap_or(segment_end);
            let rest = text[rest_start..rest_end].trim();

            let mut command = match bot.command(command_word) {
                Some(spec) => {
                    tracing::debug!(bot_id = %bot.id, command = %command_word, "mention command");
                    let mut c = ParsedCommand::new(&bot.id, command_word);
                    c.params = parse_params(rest, spec);
                    c
                }
                None => {
                    tracing::debug!(bot_id = %bot.id, token = %command_word, "unrecognized command");
                    let mut c = ParsedCommand::new(&bot.id, command_word);
                    c.is_unrecognized = true;
                    let mut params = ParamMap::new();
                    params.insert(RAW_PARAM.to_string(), Value::String(rest.to_string()));
                    c.params = params;
                    c
                }
            };
            command.matched_text = text[*start..rest_end].trim_end().to_string();
            parsed.push(command);
        }

        // Passive keyword activation for bots declaring an auto-trigger
        // command.
        let lowered = text.to_lowercase();
        for bot in self.bots.values() {
            let Some(trigger) = bot.command(AUTO_TRIGGER_COMMAND) else {
                continue;
            };
            for keyword in &bot.keywords {
                if lowered.contains(&keyword.to_lowercase()) {
                    tracing::debug!(bot_id = %bot.id, keyword = %keyword, "keyword trigger");
                    let mut command = ParsedCommand::new(&bot.id, AUTO_TRIGGER_COMMAND);
                    command.params = parse_params("", trigger);
                    command.matched_text = keyword.clone();
                    parsed.push(command);
                }
            }
        }

        parsed
    }
}
