//! Parameter extraction, type coercion, and validation.

use std::sync::OnceLock;

use folio_schema::{CommandSpec, ParamMap, Parameter, ParameterKind};
use regex::Regex;
use serde_json::Value;

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)=("[^"]*"|'[^']*'|\S+)"#).unwrap())
}

fn is_key_value(word: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+=\S").unwrap()).is_match(word)
}

fn unquote(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if raw.len() >= 2
        && ((bytes[0] == b'"' && bytes[raw.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[raw.len() - 1] == b'\''))
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

/// Parse the free-text remainder after a command word into the command's
/// declared parameter schema.
pub fn parse_params(rest: &str, command: &CommandSpec) -> ParamMap {
    let mut values = ParamMap::new();
    let text = rest.trim();

    if text.is_empty() {
        backfill_defaults(&mut values, command);
        return values;
    }

    // Help-command shape: a sole parameter named `command` takes the first
    // whitespace-delimited token verbatim, so `help status` passes `status`
    // without requiring `command=status`.
    if command.parameters.len() == 1 && command.parameters[0].name == "command" {
        if let Some(token) = text.split_whitespace().next() {
            values.insert("command".to_string(), Value::String(token.to_string()));
        }
        backfill_defaults(&mut values, command);
        return values;
    }

    // key=value tokens matching declared parameter names, consumed from
    // the text.
    let mut raws: Vec<(String, String)> = Vec::new();
    let mut leftover = text.to_string();
    for cap in key_value_re().captures_iter(text) {
        let key = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        if command.parameter(key).is_none() {
            continue;
        }
        let raw = unquote(cap.get(2).map(|m| m.as_str()).unwrap_or_default());
        raws.push((key.to_string(), raw.to_string()));
        if let Some(full) = cap.get(0) {
            leftover = leftover.replacen(full.as_str(), "", 1);
        }
    }

    // Positional walk over what remains, in declared order.
    let mut tokens = positional_tokens(&leftover).into_iter();
    for param in &command.parameters {
        if raws.iter().any(|(name, _)| name == &param.name) {
            continue;
        }
        if let Some(token) = tokens.next() {
            raws.push((param.name.clone(), token));
        }
    }

    for (name, raw) in raws {
        if let Some(param) = command.parameter(&name) {
            let value = coerce_value(&raw, param);
            if !value.is_null() {
                values.insert(name, value);
            }
        }
    }

    backfill_defaults(&mut values, command);
    values
}

/// Whitespace tokenization with one exception: a token beginning with `@`
/// extends until the next key=value boundary or end-of-string, so
/// multi-word mention lists survive as one positional argument.
fn positional_tokens(leftover: &str) -> Vec<String> {
    let words: Vec<&str> = leftover.split_whitespace().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < words.len() {
        if words[i].starts_with('@') {
            let mut j = i + 1;
            while j < words.len() && !is_key_value(words[j]) {
                j += 1;
            }
            tokens.push(words[i..j].join(" "));
            i = j;
        } else {
            tokens.push(words[i].to_string());
            i += 1;
        }
    }
    tokens
}

// Defaults never satisfy a required parameter; those must be supplied by
// the caller or fail validation.
fn backfill_defaults(values: &mut ParamMap, command: &CommandSpec) {
    for param in &command.parameters {
        if param.required || values.contains_key(&param.name) {
            continue;
        }
        if let Some(default) = &param.default_value {
            values.insert(param.name.clone(), default.clone());
        }
    }
}

/// Coerce one raw string token per the declared parameter type.
pub fn coerce_value(raw: &str, param: &Parameter) -> Value {
    match param.kind {
        ParameterKind::Number => match raw.parse::<f64>() {
            Ok(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Err(_) => param
                .default_value
                .clone()
                .unwrap_or_else(|| Value::String(raw.to_string())),
        },
        ParameterKind::Boolean => {
            let truthy = matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
            Value::Bool(truthy)
        }
        ParameterKind::Array => Value::Array(
            raw.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        ),
        ParameterKind::Enum => {
            if param.enum_values.iter().any(|v| v == raw) {
                Value::String(raw.to_string())
            } else {
                param.default_value.clone().unwrap_or(Value::Null)
            }
        }
        ParameterKind::String => Value::String(raw.to_string()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Check coerced values against the declared schema. Never fails hard:
/// the caller decides whether to abort on `is_valid == false`.
pub fn validate_parameters(values: &ParamMap, command: &CommandSpec) -> ValidationReport {
    let mut errors = Vec::new();

    for param in &command.parameters {
        let value = values.get(&param.name);
        let missing = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        };

        if missing {
            if param.required {
                errors.push(format!("Required parameter '{}' is missing", param.name));
            }
            continue;
        }
        let Some(value) = value else { continue };

        match param.kind {
            ParameterKind::Number => {
                let numeric = value.is_number()
                    || value
                        .as_str()
                        .map(|s| s.parse::<f64>().is_ok())
                        .unwrap_or(false);
                if !numeric {
                    errors.push(format!("Parameter '{}' must be a number", param.name));
                }
            }
            ParameterKind::Enum => {
                let member = value
                    .as_str()
                    .map(|s| param.enum_values.iter().any(|v| v == s))
                    .unwrap_or(false);
                if !member {
                    errors.push(format!(
                        "Parameter '{}' must be one of: {}",
                        param.name,
                        param.enum_values.join(", ")
                    ));
                }
            }
            _ => {}
        }

        if let Some(validator) = &param.validator {
            if let Err(message) = (validator.0)(value) {
                errors.push(message);
            }
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_schema::Parameter;
    use serde_json::json;

    fn accept_command() -> CommandSpec {
        CommandSpec::new("accept", "Accept a manuscript")
            .with_parameter(Parameter::string("reason", "Acceptance note"))
    }

    #[test]
    fn key_value_with_quotes() {
        let params = parse_params(r#"reason="High quality""#, &accept_command());
        assert_eq!(params["reason"], json!("High quality"));
    }

    #[test]
    fn positional_fallback() {
        let params = parse_params("excellent", &accept_command());
        assert_eq!(params["reason"], json!("excellent"));
    }

    #[test]
    fn mention_positional_greedy_until_key_value() {
        let cmd = CommandSpec::new("remind", "Send a reminder")
            .with_parameter(Parameter::string("reviewer", "Reviewer to remind"))
            .with_parameter(Parameter::number("days", "Days until due"));
        let params = parse_params("@jane.doe @john.smith days=3", &cmd);
        assert_eq!(params["reviewer"], json!("@jane.doe @john.smith"));
        assert_eq!(params["days"], json!(3.0));
    }

    #[test]
    fn mention_positional_runs_to_end_of_string() {
        let cmd = CommandSpec::new("remind", "Send a reminder")
            .with_parameter(Parameter::string("reviewer", "Reviewer to remind"));
        let params = parse_params("@jane.doe @john.smith", &cmd);
        assert_eq!(params["reviewer"], json!("@jane.doe @john.smith"));
    }

    #[test]
    fn help_shape_takes_first_token_verbatim() {
        let cmd = CommandSpec::new("help", "Show help")
            .with_parameter(Parameter::string("command", "Command to describe"));
        let params = parse_params("status extra ignored", &cmd);
        assert_eq!(params["command"], json!("status"));
    }

    #[test]
    fn blank_remainder_emits_defaults() {
        let cmd = CommandSpec::new("remind", "Send a reminder")
            .with_parameter(Parameter::number("days", "Days").with_default(json!(7)));
        let params = parse_params("   ", &cmd);
        assert_eq!(params["days"], json!(7));
    }

    #[test]
    fn coerce_array_splits_and_trims() {
        let param = Parameter::array("values", "Values");
        assert_eq!(
            coerce_value("3.5,2.1", &param),
            json!(["3.5", "2.1"]),
        );
        assert_eq!(
            coerce_value("a , b ,c", &param),
            json!(["a", "b", "c"]),
        );
    }

    #[test]
    fn coerce_boolean_accepted_spellings() {
        let param = Parameter::boolean("flag", "Flag");
        for raw in ["true", "1", "yes", "on", "TRUE", "Yes"] {
            assert_eq!(coerce_value(raw, &param), json!(true), "{raw}");
        }
        assert_eq!(coerce_value("no", &param), json!(false));
    }

    #[test]
    fn coerce_number_falls_back_to_default() {
        let param = Parameter::number("days", "Days").with_default(json!(7));
        assert_eq!(coerce_value("nope", &param), json!(7));
        assert_eq!(coerce_value("3.5", &param), json!(3.5));
    }

    #[test]
    fn coerce_enum_rejects_non_member() {
        let param = Parameter::enumeration("status", "Status", &["open", "closed"]);
        assert_eq!(coerce_value("open", &param), json!("open"));
        assert_eq!(coerce_value("bogus", &param), Value::Null);
    }

    #[test]
    fn validate_required_missing() {
        let cmd = CommandSpec::new("assign", "Assign")
            .with_parameter(Parameter::string("editor", "Editor").required());
        let report = validate_parameters(&ParamMap::new(), &cmd);
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("Required parameter 'editor' is missing"));
    }

    #[test]
    fn default_never_satisfies_required_parameter() {
        let cmd = CommandSpec::new("assign", "Assign").with_parameter(
            Parameter::string("editor", "Editor")
                .required()
                .with_default(json!("managing-editor")),
        );
        let params = parse_params("", &cmd);
        assert!(!params.contains_key("editor"));
        let report = validate_parameters(&params, &cmd);
        assert!(!report.is_valid);
    }

    #[test]
    fn validate_empty_string_counts_as_missing() {
        let cmd = CommandSpec::new("assign", "Assign")
            .with_parameter(Parameter::string("editor", "Editor").required());
        let mut values = ParamMap::new();
        values.insert("editor".into(), json!(""));
        let report = validate_parameters(&values, &cmd);
        assert!(!report.is_valid);
    }

    #[test]
    fn validate_enum_message_lists_members() {
        let cmd = CommandSpec::new("set", "Set status")
            .with_parameter(Parameter::enumeration("status", "Status", &["v1", "v2"]));
        let mut values = ParamMap::new();
        values.insert("status".into(), json!("bogus"));
        let report = validate_parameters(&values, &cmd);
        assert!(report.errors[0].contains("must be one of: v1, v2"));
    }

    #[test]
    fn validate_number_type_error() {
        let cmd = CommandSpec::new("remind", "Remind")
            .with_parameter(Parameter::number("days", "Days"));
        let mut values = ParamMap::new();
        values.insert("days".into(), json!("soon"));
        let report = validate_parameters(&values, &cmd);
        assert!(report.errors[0].contains("'days' must be a number"));
    }

    #[test]
    fn validate_custom_validator_message_surfaces() {
        let cmd = CommandSpec::new("accept", "Accept").with_parameter(
            Parameter::string("reason", "Reason").with_validator(|v| {
                if v.as_str().map(|s| s.len() > 3).unwrap_or(false) {
                    Ok(())
                } else {
                    Err("Reason must be longer than 3 characters".to_string())
                }
            }),
        );
        let mut values = ParamMap::new();
        values.insert("reason".into(), json!("ok"));
        let report = validate_parameters(&values, &cmd);
        assert_eq!(report.errors, vec!["Reason must be longer than 3 characters"]);
    }

    #[test]
    fn validate_optional_missing_is_fine() {
        let report = validate_parameters(&ParamMap::new(), &accept_command());
        assert!(report.is_valid);
    }

    #[test]
    fn undeclared_key_value_left_for_positional() {
        let cmd = CommandSpec::new("cmd", "Cmd")
            .with_parameter(Parameter::string("target", "Target"));
        let params = parse_params("other=1 hello", &cmd);
        // `other` is undeclared, so the first remaining token is positional.
        assert_eq!(params["target"], json!("other=1"));
    }
}
