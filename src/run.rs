/**
 * The single-shot entry point: derive a command string, resolve a
 * commands directory, build a `Context`, run it to completion, and
 * translate exceptions into the crate's error taxonomy. This packages
 * the glue a hand-rolled binary main would otherwise repeat — build a
 * context, register plugins, resolve, run — into a reusable library
 * entry point.
 *
 * Rust has no ambient "process-exit interception" to install the way a
 * scripting runtime might monkey-patch `process.exit`; the sanctioned
 * call site for terminating the process is `Context::exit`, and `run`
 * itself never calls `std::process::exit` directly.
 */
use std::rc::Rc;

use anyhow::Result;
use slog::Logger;

use crate::client::Client;
use crate::error::CliError;
use crate::plugin::Plugin;
use crate::resolver::{self, Data, ModuleLoader};
use crate::Context;

/**
 * Ambient environment knobs: the default-root lookup order, an
 * optional default command, and a `dev_mode` flag that controls
 * whether errors print their full chain or just the top message.
 */
pub struct RunConfig<C> {
    /** Overrides argv-derivation when supplied. */
    pub command: Option<String>,
    pub commands_dir: Option<String>,
    pub default_command: Option<String>,
    pub client: Option<Rc<dyn Client>>,
    pub logger: Option<Logger>,
    pub plugins: Vec<Rc<dyn Plugin<C>>>,
    pub dev_mode: bool,
}

impl<C> Default for RunConfig<C> {
    fn default() -> RunConfig<C> {
        RunConfig {
            command: None,
            commands_dir: None,
            default_command: None,
            client: None,
            logger: None,
            plugins: Vec::new(),
            dev_mode: false,
        }
    }
}

/**
 * Derive the effective command string: the explicit override if one
 * was supplied, else the process argv minus its first two entries
 * (binary path, and whatever the runtime calling convention places
 * second).
 */
fn derive_command_string(config: &RunConfig<impl Sized>) -> String {
    if let Some(cmd) = &config.command {
        return cmd.clone();
    }
    std::env::args().skip(2).collect::<Vec<_>>().join(" ")
}

/**
 * Run one invocation to completion: derive the command string, prepend
 * the default command if the effective input is empty or starts with
 * a flag, resolve the commands directory, build a `Context`, prepare
 * and execute it, and return the result — translating exceptions
 * through the crate's error taxonomy.
 */
pub async fn run<C: 'static>(
    app: C,
    loader: Rc<dyn ModuleLoader<C>>,
    config: RunConfig<C>,
    initial_data: Data,
) -> Result<Data> {
    let mut command_string = derive_command_string(&config);

    if let Some(default_command) = &config.default_command {
        if command_string.is_empty() || command_string.starts_with('-') {
            command_string = if command_string.is_empty() {
                default_command.clone()
            } else {
                format!("{} {}", default_command, command_string)
            };
        }
    }

    let commands_dir = match &config.commands_dir {
        Some(dir) => dir.clone(),
        None => resolver::default_commands_dir(None)?,
    };

    let client = config.client.unwrap_or_else(|| Rc::new(crate::client::StdioClient) as Rc<dyn Client>);
    let logger = config.logger.unwrap_or_else(discard_logger);

    let context = Context::new(
        app,
        command_string,
        commands_dir,
        client,
        logger,
        loader,
        config.plugins,
    )?;

    match run_prepared(&context, initial_data).await {
        Ok(data) => Ok(data),
        Err(err) => translate_error(err, config.dev_mode),
    }
}

async fn run_prepared<C: 'static>(context: &Context<C>, initial_data: Data) -> Result<Data> {
    context.prepare().await?;
    context.execute(initial_data).await
}

/**
 * A `Client` error (something the `Client` has already printed) is
 * returned as the result rather than rethrown; any other `CliError`
 * is rethrown as-is; anything else is wrapped.
 */
fn translate_error(err: anyhow::Error, dev_mode: bool) -> Result<Data> {
    if let Some(CliError::Client(_)) = err.downcast_ref::<CliError>() {
        return Ok(Data::Null);
    }

    if dev_mode {
        for cause in err.chain() {
            eprintln!("  caused by: {}", cause);
        }
    }

    if err.downcast_ref::<CliError>().is_some() {
        Err(err)
    } else {
        Err(CliError::Other(err).into())
    }
}

/** A `slog::Logger` that drops everything, used when the caller supplies none. */
fn discard_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}
