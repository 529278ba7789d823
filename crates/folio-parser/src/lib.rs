//! Turns free-text chat messages into structured bot command invocations.
//!
//! Three scan phases run in order over each message: mention-with-command,
//! bare mention, keyword. Parameter text is extracted as key=value tokens
//! plus positional fallback, coerced against the declared schema, and
//! validated separately so callers decide whether to abort.

mod help;
mod params;
mod parse;

pub use help::{
    command_help, ensure_help_command, general_help, unrecognized_command_text,
    validation_error_text, HELP_COMMAND,
};
pub use params::{coerce_value, parse_params, validate_parameters, ValidationReport};
pub use parse::{CommandParser, AUTO_TRIGGER_COMMAND};
