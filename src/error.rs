/**
 * The orchestrator's error taxonomy. Every variant carries enough
 * context to render a usable message on its own.
 *
 * Functions throughout the crate return `anyhow::Result<T>`; a
 * `CliError` is turned into an `anyhow::Error` at the throw site and
 * can be recovered with `downcast_ref` wherever a caller needs to
 * inspect the concrete variant (the help plugin's error capture,
 * `run()`'s exception translation).
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("a command is required")]
    CommandRequired,

    #[error("command \"{command}\" not understood under {dir}")]
    NotFound { command: String, dir: String },

    #[error("module loader returned no command module for \"{path}\"")]
    MissingDefaultExport { path: String },

    #[error("\"{command}\" requires a subcommand")]
    SubcommandRequired { command: String },

    #[error("{0}")]
    Client(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /** Whether this error should be presented to the user as a usage problem (i.e. recoverable by correcting the invocation). */
    pub fn is_usage(&self) -> bool {
        matches!(self, CliError::Usage(_))
    }
}

pub type Result<T> = anyhow::Result<T>;
