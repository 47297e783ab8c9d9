use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS, VALUE_COMMANDS,
};

pub const INVALID_NUMBERS_MESSAGE: &str = "Please enter valid numbers";

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }
}

fn find_spec(command: &str, specs: &[CommandSpec]) -> Option<CommandSpec> {
    specs.iter().find(|spec| spec.command == command).copied()
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<String>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

/// Reads exactly three finite numbers separated by whitespace or commas.
pub fn parse_value_triple(arg: &str) -> Option<[f64; 3]> {
    let parts: Vec<&str> = arg
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|part| !part.is_empty())
        .collect();
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    let parse = |raw: &str| raw.parse::<f64>().ok().filter(|value| value.is_finite());
    Some([parse(*a)?, parse(*b)?, parse(*c)?])
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(spec) = find_spec(&command, RAW_ARG_COMMANDS) {
                return Intent::new(spec.action, text)
                    .with_arg(spec.arg_key, Value::String(arg.to_string()));
            }

            if let Some(spec) = find_spec(&command, VALUE_COMMANDS) {
                let Some(values) = parse_value_triple(arg) else {
                    return Intent::new("invalid_values", text)
                        .with_arg("space", Value::String(spec.arg_key.to_string()))
                        .with_arg(
                            "message",
                            Value::String(INVALID_NUMBERS_MESSAGE.to_string()),
                        );
                };
                return Intent::new(spec.action, text)
                    .with_arg("space", Value::String(spec.arg_key.to_string()))
                    .with_arg(
                        "values",
                        Value::Array(values.into_iter().map(Value::from).collect()),
                    );
            }

            if let Some(spec) = find_spec(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(spec.action, text)
                    .with_arg(spec.arg_key, Value::String(parse_single_path_arg(arg)));
            }

            if let Some(spec) = find_spec(&command, NO_ARG_COMMANDS) {
                return Intent::new(spec.action, text);
            }

            return Intent::new("unknown", text)
                .with_arg("command", Value::String(command))
                .with_arg("arg", Value::String(arg.to_string()));
        }
    }

    Intent::new("code_lookup", text).with_arg("code", Value::String(raw_trimmed.to_string()))
}
