/**
 * Orchestration core for interactive, hierarchical command-line tools:
 * parameterized/spread route resolution, an option schema with
 * deferred prompt-on-read validation, cooperative `next`/`end`
 * middleware chaining, and a named-hook plugin lifecycle.
 *
 * The module layout mirrors the pipeline data flows through: `token`
 * and `option` are leaf utilities; `resolver` walks a
 * `ModuleLoader`-supplied tree into a queue; `hooks` and `plugin` are
 * the extension surface; `context` and `state` are the orchestrator
 * and per-`execute` cursor that tie everything together; `run` is the
 * single-shot entry point; `plugins` holds the two reference
 * implementations, `help` and `logger`.
 */
pub mod client;
pub mod context;
pub mod error;
pub mod hooks;
pub mod option;
pub mod plugin;
pub mod plugins;
pub mod resolver;
pub mod run;
pub mod state;
pub mod token;

pub mod prelude {
    pub use crate::client::{Client, PromptRequest, PromptType, StdioClient};
    pub use crate::context::Context;
    pub use crate::error::CliError;
    pub use crate::option::{OptionDecl, OptionType, OptionValue, OptionsConfig};
    pub use crate::plugin::{Plugin, PluginInfo};
    pub use crate::resolver::{CommandModule, Data, HandlerArgs, ModuleLoader};
    pub use crate::run::{run, RunConfig};
    pub use crate::state::{State, Status};
    pub use slog::{crit, debug, error, info, o, trace, warn, Logger};
}

pub use context::Context;
pub use error::CliError;
pub use state::State;
