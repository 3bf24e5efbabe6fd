/**
 * Routes a command string against a module tree, producing an ordered
 * `ResolvedCommand` queue: tokenize, take the first free token, look
 * up a registered command, generalized to recursive, filesystem-driven
 * routing with `[name]`/`[...name]` parameter segments.
 */
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use anyhow::Result;

use crate::context::Context;
use crate::error::CliError;
use crate::option::{OptionsConfig, OptionsGetter, Params};
use crate::state::State;

/**
 * A small, dynamically typed value the `data` argument is threaded as.
 * Its shape is left up to the consumer; rather than forcing every
 * plugin, hook payload, and queue entry in the crate to carry the same
 * generic type parameter end to end, handlers exchange this value
 * directly as it passes through `next`/`end`.
 */
pub mod data {
    #[derive(Clone, Debug, PartialEq)]
    pub enum Value {
        Null,
        Bool(bool),
        Number(f64),
        String(String),
        Array(Vec<Value>),
    }

    impl Default for Value {
        fn default() -> Value {
            Value::Null
        }
    }

    impl From<&str> for Value {
        fn from(s: &str) -> Value {
            Value::String(s.to_string())
        }
    }

    impl From<String> for Value {
        fn from(s: String) -> Value {
            Value::String(s)
        }
    }

    impl From<bool> for Value {
        fn from(b: bool) -> Value {
            Value::Bool(b)
        }
    }

    impl From<f64> for Value {
        fn from(n: f64) -> Value {
            Value::Number(n)
        }
    }

    impl Value {
        pub fn as_str(&self) -> Option<&str> {
            match self {
                Value::String(s) => Some(s),
                _ => None,
            }
        }
    }
}

pub use data::Value as Data;

/**
 * Payload passed to every handler invocation. `context` and `state`
 * are cheap `Rc`-backed handles valid for the duration of the call —
 * treat them as back-references, not long-lived owners.
 */
pub struct HandlerArgs<C> {
    pub context: Context<C>,
    pub state: State<C>,
    pub client: Rc<dyn crate::client::Client>,
    pub options: OptionsGetter,
    pub params: Params,
    pub command: Rc<ResolvedCommand<C>>,
    pub data: Data,
}

pub type HandlerFn<C> =
    Rc<dyn Fn(HandlerArgs<C>) -> Pin<Box<dyn Future<Output = Result<()>>>>>;

/**
 * A unit of executable behavior: description, option schema, handler.
 * `is_middleware` defaults to `true`; a `false` value in non-terminal
 * position causes the resolver to substitute the pass-through handler,
 * since the module only exists to forward data in that position.
 */
pub struct CommandModule<C> {
    pub description: Option<String>,
    pub options: OptionsConfig,
    pub requires_subcommand: bool,
    pub is_middleware: bool,
    pub handler: HandlerFn<C>,
}

// Implemented by hand rather than `#[derive(Clone)]`: the derive macro
// would add a spurious `C: Clone` bound even though no field stores a
// `C` directly (only behind `Rc<dyn Fn(HandlerArgs<C>) -> ..>`, whose
// `Rc::clone` needs no such bound).
impl<C> Clone for CommandModule<C> {
    fn clone(&self) -> CommandModule<C> {
        CommandModule {
            description: self.description.clone(),
            options: self.options.clone(),
            requires_subcommand: self.requires_subcommand,
            is_middleware: self.is_middleware,
            handler: self.handler.clone(),
        }
    }
}

impl<C: 'static> CommandModule<C> {
    pub fn new(handler: HandlerFn<C>) -> CommandModule<C> {
        CommandModule {
            description: None,
            options: OptionsConfig::new(),
            requires_subcommand: false,
            is_middleware: true,
            handler,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> CommandModule<C> {
        self.description = Some(desc.into());
        self
    }

    pub fn options(mut self, options: OptionsConfig) -> CommandModule<C> {
        self.options = options;
        self
    }

    pub fn requires_subcommand(mut self, v: bool) -> CommandModule<C> {
        self.requires_subcommand = v;
        self
    }

    pub fn is_middleware(mut self, v: bool) -> CommandModule<C> {
        self.is_middleware = v;
        self
    }

    /**
     * The synthetic pass-through module: forwards `data` unchanged.
     * Never authored by a user; inserted by the resolver.
     */
    pub fn pass_through() -> CommandModule<C> {
        CommandModule::new(Rc::new(|args: HandlerArgs<C>| {
            Box::pin(async move {
                args.state.next(Some(args.data)).await;
                Ok(())
            })
        }))
    }
}

/**
 * What the loader found (or didn't) at a path: a module, a directory
 * with no module of its own, or nothing at all. A loader may also
 * fail outright, surfaced as any `anyhow::Error` its `Result` carries.
 */
pub enum LoadResult<C> {
    Module(CommandModule<C>),
    Directory,
    NotFound,
}

/**
 * A replaceable resolution function; plugins may swap this at `init`
 * or during before-resolve via `BeforeResolvePayload::set_resolve_fn`.
 * The engine reads it through an indirection on every step, so a
 * replacement installed mid-resolution takes effect immediately.
 */
pub type ResolveFnPtr<C> =
    Rc<dyn Fn(&str, &str, &dyn ModuleLoader<C>) -> Result<ResolvedCommand<C>>>;

pub trait ModuleLoader<C> {
    /** Look up whatever lives at `dir/name`. */
    fn load(&self, dir: &str, name: &str) -> Result<LoadResult<C>>;

    /**
     * List the `[name]`/`[...name]` parameter entries of `dir`, in
     * directory order, so the resolver can search them when a literal
     * lookup misses.
     */
    fn list_param_entries(&self, dir: &str) -> Result<Vec<ParamEntry>>;
}

#[derive(Clone)]
pub struct ParamEntry {
    pub entry_name: String,
    pub param_name: String,
    pub spread: bool,
}

/** A resolved step in the command queue. */
pub struct ResolvedCommand<C> {
    pub command: CommandModule<C>,
    pub command_name: String,
    /**
     * This step's own path segment (e.g. `"[id]"` for a parameter
     * match). `Context::resolve_with_hooks` overwrites this with the
     * full accumulated logical route (e.g. `"users/[id]/delete"`)
     * once the step is appended to the queue.
     */
    pub command_path: String,
    pub command_tokens: Vec<String>,
    pub remaining_command_string: String,
    pub subcommands_dir: String,
    pub params: Params,
}

impl<C> std::fmt::Debug for ResolvedCommand<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCommand")
            .field("command_name", &self.command_name)
            .field("command_path", &self.command_path)
            .field("command_tokens", &self.command_tokens)
            .field("remaining_command_string", &self.remaining_command_string)
            .field("subcommands_dir", &self.subcommands_dir)
            .field("params", &self.params)
            .finish()
    }
}

fn is_valid_command_name(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/**
 * Resolve one step: tokenize `command_string`, find the module at
 * `commands_dir/<first free token>` (or a matching parameter segment),
 * and return it along with the remaining, flag-trimmed command string
 * for the next step.
 */
pub fn resolve_step<C: 'static>(
    command_string: &str,
    commands_dir: &str,
    loader: &dyn ModuleLoader<C>,
) -> Result<ResolvedCommand<C>> {
    let all_tokens = crate::token::split_tokens(command_string, ' ');
    let first_free = all_tokens.iter().position(|t| !t.starts_with('-'));

    let (command_name, name_index) = match first_free {
        Some(idx) => (all_tokens[idx].clone(), idx),
        None => return Err(CliError::CommandRequired.into()),
    };

    if !is_valid_command_name(&command_name) {
        return Err(CliError::NotFound {
            command: command_name,
            dir: commands_dir.to_string(),
        }
        .into());
    }

    let command_tokens = all_tokens[..=name_index].to_vec();
    let mut remaining_tokens = all_tokens[name_index + 1..].to_vec();

    let mut params: Params = HashMap::new();
    let mut subcommands_dir = format!("{}/{}", commands_dir, command_name);

    let mut path_segment = command_name.clone();

    let module = match loader.load(commands_dir, &command_name)? {
        LoadResult::Module(m) => m,
        LoadResult::Directory => CommandModule::pass_through(),
        LoadResult::NotFound => {
            let entries = loader.list_param_entries(commands_dir)?;
            let found = entries.into_iter().find_map(|entry| {
                if entry.spread {
                    params.insert(
                        entry.param_name.clone(),
                        crate::option::ParamValue::Multi(
                            std::iter::once(command_name.clone())
                                .chain(remaining_tokens.iter().cloned())
                                .collect(),
                        ),
                    );
                    remaining_tokens.clear();
                    subcommands_dir = format!("{}/{}", commands_dir, entry.entry_name);
                    Some(entry)
                } else {
                    params.insert(
                        entry.param_name.clone(),
                        crate::option::ParamValue::Single(command_name.clone()),
                    );
                    subcommands_dir = format!("{}/{}", commands_dir, entry.entry_name);
                    Some(entry)
                }
            });

            match found {
                Some(entry) => {
                    path_segment = entry.entry_name.clone();
                    match loader.load(commands_dir, &entry.entry_name) {
                        Ok(LoadResult::Module(m)) => m,
                        _ => CommandModule::pass_through(),
                    }
                }
                None => {
                    return Err(CliError::NotFound {
                        command: command_name,
                        dir: commands_dir.to_string(),
                    }
                    .into())
                }
            }
        }
    };

    let remaining_command_string = if !module.options.is_empty() {
        match crate::option::first_free_token_index(&remaining_tokens, &module.options) {
            Ok(Some(idx)) => remaining_tokens[idx..].join(" "),
            Ok(None) => String::new(),
            Err(_) => remaining_tokens.join(" "),
        }
    } else {
        remaining_tokens.join(" ")
    };

    let final_module = if !module.is_middleware && !remaining_command_string.is_empty() {
        CommandModule { handler: CommandModule::<C>::pass_through().handler, ..module }
    } else {
        module
    };

    Ok(ResolvedCommand {
        command: final_module,
        command_name,
        command_path: path_segment,
        command_tokens,
        remaining_command_string,
        subcommands_dir,
        params,
    })
}

/**
 * Resolve the default root commands directory when none was supplied:
 * try `<cwd>/commands`, then `<caller_dir>/commands`.
 */
pub fn default_commands_dir(caller_dir: Option<&str>) -> Result<String> {
    let cwd = std::env::current_dir().ok();
    let mut attempted = Vec::new();

    if let Some(cwd) = &cwd {
        let candidate = cwd.join("commands");
        attempted.push(candidate.display().to_string());
        if candidate.is_dir() {
            return Ok(candidate.display().to_string());
        }
    }

    if let Some(caller_dir) = caller_dir {
        let candidate = std::path::Path::new(caller_dir).join("commands");
        attempted.push(candidate.display().to_string());
        if candidate.is_dir() {
            return Ok(candidate.display().to_string());
        }
    }

    Err(CliError::Usage(format!(
        "could not find a commands directory; tried: {}",
        attempted.join(", ")
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLoader<C> {
        modules: std::collections::HashMap<String, CommandModule<C>>,
        dirs: std::collections::HashMap<String, Vec<ParamEntry>>,
    }

    impl<C> ModuleLoader<C> for FixedLoader<C>
    where
        C: Clone,
    {
        fn load(&self, dir: &str, name: &str) -> Result<LoadResult<C>> {
            let path = format!("{}/{}", dir, name);
            if let Some(m) = self.modules.get(&path) {
                return Ok(LoadResult::Module(m.clone()));
            }
            if self.dirs.contains_key(&path) {
                return Ok(LoadResult::Directory);
            }
            Ok(LoadResult::NotFound)
        }

        fn list_param_entries(&self, dir: &str) -> Result<Vec<ParamEntry>> {
            Ok(self.dirs.get(dir).cloned().unwrap_or_default())
        }
    }

    fn noop_module() -> CommandModule<()> {
        CommandModule::new(Rc::new(|args: HandlerArgs<()>| {
            Box::pin(async move {
                args.state.next(Some(args.data)).await;
                Ok(())
            })
        }))
    }

    #[test]
    fn command_tokens_are_prefix_of_input() {
        let mut modules = std::collections::HashMap::new();
        modules.insert("commands/hello".to_string(), noop_module());
        let loader = FixedLoader { modules, dirs: Default::default() };

        let resolved =
            resolve_step::<()>("hello --name Alice", "commands", &loader).unwrap();
        assert_eq!(resolved.command_tokens, vec!["hello"]);
        assert_eq!(resolved.remaining_command_string, "");
    }

    #[test]
    fn spread_param_captures_remainder_verbatim() {
        let mut dirs = std::collections::HashMap::new();
        dirs.insert(
            "commands".to_string(),
            vec![ParamEntry {
                entry_name: "[...rest]".to_string(),
                param_name: "rest".to_string(),
                spread: true,
            }],
        );
        let loader: FixedLoader<()> =
            FixedLoader { modules: Default::default(), dirs };

        let resolved = resolve_step::<()>("a b c", "commands", &loader).unwrap();
        assert_eq!(
            resolved.params.get("rest").unwrap().as_multi().unwrap(),
            &["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert_eq!(resolved.remaining_command_string, "");
    }

    #[test]
    fn not_found_without_param_segment() {
        let loader: FixedLoader<()> =
            FixedLoader { modules: Default::default(), dirs: Default::default() };
        let err = resolve_step::<()>("nope", "commands", &loader).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn empty_input_is_command_required() {
        let loader: FixedLoader<()> =
            FixedLoader { modules: Default::default(), dirs: Default::default() };
        let err = resolve_step::<()>("", "commands", &loader).unwrap_err();
        assert!(err.downcast_ref::<CliError>().is_some());
    }

    #[test]
    fn data_value_conversions() {
        let v: Data = "hi".into();
        assert_eq!(v, Data::String("hi".to_string()));
    }
}
