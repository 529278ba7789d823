use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod manifest;

pub use manifest::*;

/// Coerced parameter values, keyed by parameter name.
pub type ParamMap = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Enum,
    Array,
}

impl Default for ParameterKind {
    fn default() -> Self {
        Self::String
    }
}

/// Custom parameter validator. Returns the first structured error message
/// on failure.
#[derive(Clone)]
pub struct ParamValidator(pub Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl std::fmt::Debug for ParamValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ParamValidator")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub kind: ParameterKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Invariant: non-empty when `kind` is `Enum`.
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(skip)]
    pub validator: Option<ParamValidator>,
}

impl Parameter {
    pub fn new(name: &str, description: &str, kind: ParameterKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            default_value: None,
            enum_values: Vec::new(),
            examples: Vec::new(),
            validator: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, description, ParameterKind::String)
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self::new(name, description, ParameterKind::Number)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, description, ParameterKind::Boolean)
    }

    pub fn enumeration(name: &str, description: &str, values: &[&str]) -> Self {
        let mut p = Self::new(name, description, ParameterKind::Enum);
        p.enum_values = values.iter().map(|v| v.to_string()).collect();
        p
    }

    pub fn array(name: &str, description: &str) -> Self {
        Self::new(name, description, ParameterKind::Array)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_validator(
        mut self,
        f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(ParamValidator(Arc::new(f)));
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ParameterKind::String => "string",
            ParameterKind::Number => "number",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Enum => "enum",
            ParameterKind::Array => "array",
        }
    }
}

/// Declarative description of one invocable command. The executable body is
/// bound separately at registration time, keyed by `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub help_text: Option<String>,
}

impl CommandSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            usage: String::new(),
            parameters: Vec::new(),
            examples: Vec::new(),
            permissions: Vec::new(),
            help_text: None,
        }
    }

    pub fn with_usage(mut self, usage: &str) -> Self {
        self.usage = usage.to_string();
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_help_text(mut self, text: &str) -> Self {
        self.help_text = Some(text.to_string());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SectionPlacement {
    Before,
    After,
}

/// Extra help section rendered before or after the command list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpSection {
    pub title: String,
    pub body: String,
    pub placement: SectionPlacement,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpInfo {
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub quick_start: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Immutable description of a bot's capabilities. Replaced wholesale on
/// reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDefinition {
    /// Lowercase alphanumeric + hyphens, unique across the registry.
    pub id: String,
    /// Display name shown in help output.
    pub name: String,
    pub description: String,
    pub version: String,
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub help: Option<HelpInfo>,
    #[serde(default)]
    pub help_sections: Vec<HelpSection>,
}

impl BotDefinition {
    pub fn new(id: &str, name: &str, description: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            version: version.to_string(),
            commands: Vec::new(),
            keywords: Vec::new(),
            triggers: Vec::new(),
            permissions: Vec::new(),
            help: None,
            help_sections: Vec::new(),
        }
    }

    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_triggers(mut self, triggers: &[&str]) -> Self {
        self.triggers = triggers.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_help(mut self, help: HelpInfo) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_help_section(mut self, section: HelpSection) -> Self {
        self.help_sections.push(section);
        self
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.command(name).is_some()
    }
}

/// Bot id shape: lowercase alphanumeric plus hyphens, starting alphanumeric.
pub fn is_valid_bot_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !id.starts_with('-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Mention,
    Keyword,
    Event,
    Manual,
}

/// Ephemeral result of recognizing one mention+command span in input text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub bot_id: String,
    pub command: String,
    #[serde(default)]
    pub params: ParamMap,
    /// Raw text span the parser matched.
    pub matched_text: String,
    /// Set when the command word matched no declared command; `params`
    /// then carries the raw remainder under the `raw` key.
    #[serde(default)]
    pub is_unrecognized: bool,
}

impl ParsedCommand {
    pub fn new(bot_id: &str, command: &str) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            command: command.to_string(),
            params: ParamMap::new(),
            matched_text: String::new(),
            is_unrecognized: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub message_id: Option<String>,
    pub user_id: String,
    pub user_role: String,
    pub trigger: TriggerKind,
}

impl Actor {
    pub fn user(user_id: &str, user_role: &str) -> Self {
        Self {
            message_id: None,
            user_id: user_id.to_string(),
            user_role: user_role.to_string(),
            trigger: TriggerKind::Mention,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalIdentity {
    pub journal_id: String,
    /// Settings snapshot taken when the context was built.
    #[serde(default)]
    pub settings: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Per-invocation context. Constructed fresh per invocation and never
/// mutated afterwards; the executor derives an enhanced copy via
/// [`ExecutionContext::with_merged_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub conversation_id: String,
    #[serde(default)]
    pub manuscript_id: Option<String>,
    pub actor: Actor,
    pub journal: JournalIdentity,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub manuscript: Option<Value>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl ExecutionContext {
    pub fn new(conversation_id: &str, actor: Actor, journal: JournalIdentity) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            manuscript_id: None,
            actor,
            journal,
            config: Value::Null,
            auth_token: None,
            manuscript: None,
            files: Vec::new(),
        }
    }

    pub fn with_manuscript_id(mut self, manuscript_id: &str) -> Self {
        self.manuscript_id = Some(manuscript_id.to_string());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Enhanced copy with `overlay` merged over this context's config.
    /// The original context is left untouched.
    pub fn with_merged_config(&self, overlay: &Value) -> Self {
        let mut merged = self.clone();
        merged.config = merge_config(&self.config, overlay);
        merged
    }
}

/// Key-wise merge with `overlay` taking precedence. Nested objects merge
/// recursively; any other overlay value replaces the base value.
pub fn merge_config(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut out = b.clone();
            for (k, v) in o {
                let merged = match b.get(k) {
                    Some(existing) => merge_config(existing, v),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, Value::Null) => base.clone(),
        (_, other) => other.clone(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    #[serde(with = "serde_bytes_b64")]
    pub data: Vec<u8>,
}

mod serde_bytes_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotMessage {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub structured_data: Option<Value>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl BotMessage {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            attachments: Vec::new(),
            structured_data: None,
            annotations: Vec::new(),
        }
    }
}

/// Side-effect instruction for an external action processor. The engine
/// only emits these, it never applies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotAction {
    pub kind: String,
    pub data: Value,
}

impl BotAction {
    pub fn new(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotResponse {
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<BotMessage>,
    #[serde(default)]
    pub actions: Vec<BotAction>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BotResponse {
    pub fn message(content: &str) -> Self {
        Self {
            messages: vec![BotMessage::text(content)],
            ..Default::default()
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            errors: vec![message.to_string()],
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: BotAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Context for named action handlers, decoupled from chat commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub manuscript_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Service-account identity a bot posts under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub user_id: String,
    pub address: String,
}

/// Metadata recorded for a file written by the install-hook upload helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_name: String,
    pub stored_path: String,
    pub content_hash: String,
    pub size: u64,
}
