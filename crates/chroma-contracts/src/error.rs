use thiserror::Error;

/// Failure kinds surfaced by a color search.
///
/// None of these are retried internally; the caller reports them and lets the
/// user try again. A failed search leaves history and earlier results alone.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{0}")]
    Configuration(String),
    #[error("No response from AI")]
    EmptyResponse,
    #[error("Could not parse response from AI. Raw response: {excerpt}...")]
    Parse { excerpt: String },
    #[error("AI returned an empty result list")]
    EmptyResult,
    #[error("Unexpected response structure")]
    UnexpectedShape,
    #[error("{0} is required")]
    MissingInput(&'static str),
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl LookupError {
    /// Stable tag used in event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::EmptyResponse => "empty_response",
            Self::Parse { .. } => "parse",
            Self::EmptyResult => "empty_result",
            Self::UnexpectedShape => "unexpected_shape",
            Self::MissingInput(_) => "missing_input",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::Transport(_) => "transport",
        }
    }
}
