mod command_registry;
mod intent_parser;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use intent_parser::{parse_intent, parse_value_triple, Intent, INVALID_NUMBERS_MESSAGE};
