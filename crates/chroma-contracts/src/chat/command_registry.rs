#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "code",
        action: "code_lookup",
        arg_key: "code",
    },
    CommandSpec {
        command: "show",
        action: "show_history_entry",
        arg_key: "code",
    },
    CommandSpec {
        command: "provider",
        action: "set_provider",
        arg_key: "provider",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
        arg_key: "model",
    },
];

/// Commands taking three numbers; `arg_key` holds the color space.
pub(crate) const VALUE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "rgb",
        action: "value_lookup",
        arg_key: "rgb",
    },
    CommandSpec {
        command: "lab",
        action: "value_lookup",
        arg_key: "lab",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "image",
        action: "image_identify",
        arg_key: "path",
    },
    CommandSpec {
        command: "photo",
        action: "image_identify",
        arg_key: "path",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "history",
        action: "history",
        arg_key: "",
    },
    CommandSpec {
        command: "clear_history",
        action: "clear_history",
        arg_key: "",
    },
    CommandSpec {
        command: "popular",
        action: "popular",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
        arg_key: "",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/code",
    "/rgb",
    "/lab",
    "/image",
    "/history",
    "/show",
    "/clear_history",
    "/popular",
    "/provider",
    "/model",
    "/help",
    "/quit",
];
