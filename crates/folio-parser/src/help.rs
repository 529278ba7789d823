//! Help text synthesis from declared bot metadata.

use folio_schema::{BotDefinition, CommandSpec, Parameter, SectionPlacement};

pub const HELP_COMMAND: &str = "help";

/// Inject the default `help` command into a bot lacking one.
pub fn ensure_help_command(definition: &mut BotDefinition) {
    if definition.has_command(HELP_COMMAND) {
        return;
    }
    let id = definition.id.clone();
    definition.commands.push(
        CommandSpec::new(HELP_COMMAND, "Show what this bot can do")
            .with_usage(&format!("@{id} help [command]"))
            .with_parameter(Parameter::string(
                "command",
                "Command name to get detailed help for",
            ))
            .with_examples(&[&format!("@{id} help"), &format!("@{id} help status")]),
    );
}

/// General help: overview, quick start, custom sections, command list,
/// examples. Markdown-flavored text.
pub fn general_help(definition: &BotDefinition) -> String {
    let mut lines = vec![format!(
        "**{}** v{} — {}",
        definition.name, definition.version, definition.description
    )];

    if let Some(help) = &definition.help {
        if let Some(overview) = &help.overview {
            lines.push(String::new());
            lines.push(overview.clone());
        }
        if let Some(quick_start) = &help.quick_start {
            lines.push(String::new());
            lines.push("**Quick start**".to_string());
            lines.push(quick_start.clone());
        }
    }

    for section in &definition.help_sections {
        if section.placement == SectionPlacement::Before {
            lines.push(String::new());
            lines.push(format!("**{}**", section.title));
            lines.push(section.body.clone());
        }
    }

    lines.push(String::new());
    lines.push("**Commands**".to_string());
    for command in &definition.commands {
        let usage = if command.usage.is_empty() {
            String::new()
        } else {
            format!(" (`{}`)", command.usage)
        };
        lines.push(format!("- **{}** — {}{}", command.name, command.description, usage));
    }

    for section in &definition.help_sections {
        if section.placement == SectionPlacement::After {
            lines.push(String::new());
            lines.push(format!("**{}**", section.title));
            lines.push(section.body.clone());
        }
    }

    let examples = definition
        .help
        .as_ref()
        .map(|h| h.examples.as_slice())
        .unwrap_or_default();
    if !examples.is_empty() {
        lines.push(String::new());
        lines.push("**Examples**".to_string());
        for example in examples {
            lines.push(format!("- `{example}`"));
        }
    }

    lines.join("\n")
}

/// Detailed help for one command: usage, parameter table, long-form text,
/// examples.
pub fn command_help(definition: &BotDefinition, command: &CommandSpec) -> String {
    let mut lines = vec![format!(
        "**{} {}** — {}",
        definition.name, command.name, command.description
    )];

    if !command.usage.is_empty() {
        lines.push(format!("Usage: `{}`", command.usage));
    }

    if !command.parameters.is_empty() {
        lines.push(String::new());
        lines.push("**Parameters**".to_string());
        for param in &command.parameters {
            lines.push(describe_parameter(param));
        }
    }

    if let Some(text) = &command.help_text {
        lines.push(String::new());
        lines.push(text.clone());
    }

    if !command.examples.is_empty() {
        lines.push(String::new());
        lines.push("**Examples**".to_string());
        for example in &command.examples {
            lines.push(format!("- `{example}`"));
        }
    }

    lines.join("\n")
}

fn describe_parameter(param: &Parameter) -> String {
    let requirement = if param.required { "required" } else { "optional" };
    let mut line = format!(
        "- `{}` ({}, {}) — {}",
        param.name,
        param.kind_name(),
        requirement,
        param.description
    );
    if let Some(default) = &param.default_value {
        line.push_str(&format!(" [default: {default}]"));
    }
    if !param.enum_values.is_empty() {
        line.push_str(&format!(" [one of: {}]", param.enum_values.join(", ")));
    }
    line
}

/// Diagnostic message for a command word that matched no declared command.
pub fn unrecognized_command_text(definition: &BotDefinition, token: &str) -> String {
    let mut lines = vec![format!(
        "I don't recognize the command `{token}`. Here's what **{}** can do:",
        definition.name
    )];
    for command in &definition.commands {
        lines.push(format!("- **{}** — {}", command.name, command.description));
    }
    lines.push(String::new());
    lines.push(format!(
        "Try `@{} help <command>` for details on any command.",
        definition.id
    ));
    if token == "bot" {
        lines.push(format!(
            "Tip: mention the bot by name, e.g. `@{} <command>`, rather than writing `bot`.",
            definition.id
        ));
    }
    lines.join("\n")
}

/// Chat-facing rendering of a failed validation: each error plus the
/// command's usage and its first three examples.
pub fn validation_error_text(command: &CommandSpec, errors: &[String]) -> String {
    let mut lines = vec![format!("The `{}` command couldn't run:", command.name)];
    for error in errors {
        lines.push(format!("- {error}"));
    }
    if !command.usage.is_empty() {
        lines.push(format!("Usage: `{}`", command.usage));
    }
    for example in command.examples.iter().take(3) {
        lines.push(format!("Example: `{example}`"));
    }
    lines.join("\n")
}
