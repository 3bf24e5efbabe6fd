/**
 * The prepare -> resolve -> parse -> execute orchestrator: the struct
 * that owns a command's options and bookkeeping for one invocation, as
 * an async, hook-observable, re-entrant-safe handle shared by the
 * resolver, `State`, plugins and hook handlers alike.
 *
 * `Context<C>` is `Rc<RefCell<_>>`-backed for the same reason `State<C>`
 * is: the engine is single-threaded and cooperative, so cheap clones
 * stand in for back-references, rather than fighting the borrow
 * checker over one long-lived `&mut`.
 *
 * Hook dispatch takes the relevant `HookSlot` out of the `RefCell` with
 * `std::mem::take` before awaiting it, then puts it back. `HookSlot`
 * derives `Default` exactly so this dance is cheap. Without it, a
 * reentrant hook (one that calls back into `on`/`off` on the same
 * event, or into another hook that touches the same `RefCell`) would
 * hit a `BorrowMutError` the moment a handler tried to mutate the
 * registry while the dispatcher's borrow was still held across the
 * `.await`.
 */
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use slog::Logger;

use crate::client::Client;
use crate::error::CliError;
use crate::hooks::{
    AfterCommandPayload, AfterExecutePayload, AfterParsePayload, AfterResolvePayload,
    AfterStateChangePayload, BeforeCommandPayload, BeforeEndPayload, BeforeErrorPayload,
    BeforeExecutePayload, BeforeExitPayload, BeforeParsePayload, BeforeResolvePayload,
    BeforeStateChangePayload, HookFn, HookHandle, HookRegistry,
};
use crate::option::{OptionValues, OptionsConfig, ParseFnPtr};
use crate::plugin::{check_unique_name, Plugin, PluginInfo};
use crate::resolver::{
    self, Data, ModuleLoader, ResolveFnPtr, ResolvedCommand,
};
use crate::state::State;

struct ContextInner<C> {
    app: C,
    command_string: String,
    commands_dir: String,
    client: Rc<dyn Client>,
    logger: Logger,
    loader: Rc<dyn ModuleLoader<C>>,
    hooks: HookRegistry<C>,
    plugins: Vec<Rc<dyn Plugin<C>>>,
    plugin_info: Vec<PluginInfo>,
    options: OptionsConfig,
    option_values: Rc<RefCell<OptionValues>>,
    queue: Vec<Rc<ResolvedCommand<C>>>,
    result: Option<Data>,
    is_resolved: bool,
    is_parsed: bool,
    is_ready: bool,
    resolve_fn: ResolveFnPtr<C>,
    parse_fn: ParseFnPtr,
}

/** Default resolve function: one `resolver::resolve_step` call. */
fn default_resolve_fn<C: 'static>() -> ResolveFnPtr<C> {
    Rc::new(|command_string, commands_dir, loader| {
        resolver::resolve_step(command_string, commands_dir, loader)
    })
}

/**
 * Default parse function: `option::parse` with validation on, unknown
 * flags rejected.
 */
fn default_parse_fn() -> ParseFnPtr {
    std::sync::Arc::new(|tokens, schema, validate, allow_unknown| {
        crate::option::parse(tokens, schema, validate, allow_unknown)
    })
}

pub struct Context<C> {
    inner: Rc<RefCell<ContextInner<C>>>,
}

impl<C> Clone for Context<C> {
    fn clone(&self) -> Context<C> {
        Context { inner: self.inner.clone() }
    }
}

macro_rules! hook_dispatch {
    ($call:ident, $on:ident, $once_fn:ident, $off:ident, $field:ident, $payload:ty) => {
        /// Take the slot out, await every handler against it, put it
        /// back — never holds the registry's `RefCell` borrow across an
        /// `.await` point.
        pub async fn $call(&self, payload: &mut $payload) -> Result<()> {
            let mut slot = {
                let mut inner = self.inner.borrow_mut();
                std::mem::take(&mut inner.hooks.$field)
            };
            let result = slot.call(payload).await;
            {
                let mut inner = self.inner.borrow_mut();
                inner.hooks.$field = slot;
            }
            result
        }

        pub fn $on(&self, f: HookFn<$payload>) -> HookHandle {
            self.inner.borrow_mut().hooks.$field.on(f)
        }

        pub fn $once_fn(&self, f: HookFn<$payload>) -> HookHandle {
            self.inner.borrow_mut().hooks.$field.once(f)
        }

        pub fn $off(&self, handle: HookHandle) {
            self.inner.borrow_mut().hooks.$field.off(handle)
        }
    };
}

impl<C: 'static> Context<C> {
    pub fn new(
        app: C,
        command_string: impl Into<String>,
        commands_dir: impl Into<String>,
        client: Rc<dyn Client>,
        logger: Logger,
        loader: Rc<dyn ModuleLoader<C>>,
        plugins: Vec<Rc<dyn Plugin<C>>>,
    ) -> Result<Context<C>> {
        let mut plugin_info = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            check_unique_name(&plugin_info, plugin.name())?;
            let mut info = PluginInfo::new(plugin.name());
            info.version = plugin.version().map(|v| v.to_string());
            info.description = plugin.description().map(|d| d.to_string());
            plugin_info.push(info);
        }

        Ok(Context {
            inner: Rc::new(RefCell::new(ContextInner {
                app,
                command_string: command_string.into(),
                commands_dir: commands_dir.into(),
                client,
                logger,
                loader,
                hooks: HookRegistry::default(),
                plugins,
                plugin_info,
                options: OptionsConfig::new(),
                option_values: Rc::new(RefCell::new(OptionValues::new())),
                queue: Vec::new(),
                result: None,
                is_resolved: false,
                is_parsed: false,
                is_ready: false,
                resolve_fn: default_resolve_fn(),
                parse_fn: default_parse_fn(),
            })),
        })
    }

    // ---- accessors ---------------------------------------------------

    pub fn with_app<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        let inner = self.inner.borrow();
        f(&inner.app)
    }

    pub fn with_app_mut<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let mut inner = self.inner.borrow_mut();
        f(&mut inner.app)
    }

    pub fn command_string(&self) -> String {
        self.inner.borrow().command_string.clone()
    }

    pub fn commands_dir(&self) -> String {
        self.inner.borrow().commands_dir.clone()
    }

    pub fn client(&self) -> Rc<dyn Client> {
        self.inner.borrow().client.clone()
    }

    pub fn logger(&self) -> Logger {
        self.inner.borrow().logger.clone()
    }

    pub fn options(&self) -> OptionsConfig {
        self.inner.borrow().options.clone()
    }

    pub fn option_values(&self) -> Rc<RefCell<OptionValues>> {
        self.inner.borrow().option_values.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    pub fn queue_get(&self, idx: usize) -> Rc<ResolvedCommand<C>> {
        self.inner.borrow().queue[idx].clone()
    }

    pub fn result(&self) -> Option<Data> {
        self.inner.borrow().result.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.borrow().is_resolved
    }

    pub fn is_parsed(&self) -> bool {
        self.inner.borrow().is_parsed
    }

    pub fn is_ready(&self) -> bool {
        self.inner.borrow().is_ready
    }

    pub fn plugin_info(&self) -> Vec<PluginInfo> {
        self.inner.borrow().plugin_info.clone()
    }

    /**
     * Shallow-merge additional option declarations into the Context's
     * schema. A plugin's `init` typically calls this to declare its
     * own options.
     */
    pub fn set_options(&self, options: OptionsConfig) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        crate::option::merge_options(&mut inner.options, &options)
    }

    // ---- hook dispatch / registration --------------------------------

    hook_dispatch!(
        call_before_resolve,
        on_before_resolve,
        once_before_resolve,
        off_before_resolve,
        before_resolve,
        BeforeResolvePayload<C>
    );
    hook_dispatch!(
        call_after_resolve,
        on_after_resolve,
        once_after_resolve,
        off_after_resolve,
        after_resolve,
        AfterResolvePayload
    );
    hook_dispatch!(
        call_before_parse,
        on_before_parse,
        once_before_parse,
        off_before_parse,
        before_parse,
        BeforeParsePayload
    );
    hook_dispatch!(
        call_after_parse,
        on_after_parse,
        once_after_parse,
        off_after_parse,
        after_parse,
        AfterParsePayload
    );
    hook_dispatch!(
        call_before_execute,
        on_before_execute,
        once_before_execute,
        off_before_execute,
        before_execute,
        BeforeExecutePayload
    );
    hook_dispatch!(
        call_after_execute,
        on_after_execute,
        once_after_execute,
        off_after_execute,
        after_execute,
        AfterExecutePayload
    );
    hook_dispatch!(
        call_before_command,
        on_before_command,
        once_before_command,
        off_before_command,
        before_command,
        BeforeCommandPayload
    );
    hook_dispatch!(
        call_after_command,
        on_after_command,
        once_after_command,
        off_after_command,
        after_command,
        AfterCommandPayload
    );
    hook_dispatch!(
        call_before_end,
        on_before_end,
        once_before_end,
        off_before_end,
        before_end,
        BeforeEndPayload
    );
    hook_dispatch!(
        call_before_error,
        on_before_error,
        once_before_error,
        off_before_error,
        before_error,
        BeforeErrorPayload
    );
    hook_dispatch!(
        call_before_exit,
        on_before_exit,
        once_before_exit,
        off_before_exit,
        before_exit,
        BeforeExitPayload
    );
    hook_dispatch!(
        call_before_state_change,
        on_before_state_change,
        once_before_state_change,
        off_before_state_change,
        before_state_change,
        BeforeStateChangePayload
    );
    hook_dispatch!(
        call_after_state_change,
        on_after_state_change,
        once_after_state_change,
        off_after_state_change,
        after_state_change,
        AfterStateChangePayload
    );

    // ---- orchestration ------------------------------------------------

    /** Idempotent: initialize plugins, resolve, parse, mark ready. A second call is a no-op. */
    pub async fn prepare(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        self.init_plugins().await?;
        self.resolve_with_hooks().await?;
        self.parse_with_hooks().await?;

        self.inner.borrow_mut().is_ready = true;
        Ok(())
    }

    async fn init_plugins(&self) -> Result<()> {
        let plugins = self.inner.borrow().plugins.clone();
        for (i, plugin) in plugins.iter().enumerate() {
            let already_ready = self.inner.borrow().plugin_info[i].is_ready();
            if already_ready {
                continue;
            }
            plugin.init(self.clone()).await?;
            self.inner.borrow().plugin_info[i].mark_ready();
        }
        Ok(())
    }

    async fn resolve_with_hooks(&self) -> Result<()> {
        let mut remaining = self.command_string();
        let mut dir = self.commands_dir();

        // Route params accumulate across resolution steps rather than
        // resetting at each one: a `[name]`/`[...name]` segment is
        // usually a pass-through node with its own queue entry, one or
        // more steps removed from the terminal handler that actually
        // wants to read it (e.g. `users/[id]/delete`). Each
        // `ResolvedCommand.params` therefore holds everything captured
        // so far, not just what this step captured.
        let mut accumulated_params = crate::option::Params::new();

        // The logical route accumulates the same way: each step
        // contributes its own path segment, and the terminal handler
        // sees the full hierarchical route (e.g. "users/[id]/delete").
        let mut accumulated_path: Vec<String> = Vec::new();

        loop {
            let mut before = BeforeResolvePayload {
                remaining_command_string: remaining.clone(),
                next_commands_dir: dir.clone(),
                skip: false,
                stop_resolving: false,
                addendum: Vec::new(),
                resolve_fn: None,
            };
            self.call_before_resolve(&mut before).await?;

            if let Some(f) = before.resolve_fn.take() {
                self.inner.borrow_mut().resolve_fn = f;
            }
            if !before.addendum.is_empty() {
                let mut inner = self.inner.borrow_mut();
                for cmd in before.addendum {
                    inner.queue.push(cmd);
                }
            }

            let skip = before.skip;
            let stop = before.stop_resolving;

            if !skip {
                let resolve_fn = self.inner.borrow().resolve_fn.clone();
                let loader = self.inner.borrow().loader.clone();
                let mut resolved = (resolve_fn)(&remaining, &dir, loader.as_ref())?;

                {
                    let mut inner = self.inner.borrow_mut();
                    crate::option::merge_options(&mut inner.options, &resolved.command.options)?;
                }

                accumulated_params.extend(resolved.params.clone());
                resolved.params = accumulated_params.clone();

                accumulated_path.push(resolved.command_path.clone());
                resolved.command_path = accumulated_path.join("/");

                remaining = resolved.remaining_command_string.clone();
                dir = resolved.subcommands_dir.clone();
                self.inner.borrow_mut().queue.push(Rc::new(resolved));
            }

            let mut after = AfterResolvePayload {
                remaining_command_string: remaining.clone(),
                next_commands_dir: dir.clone(),
                skipped: skip,
            };
            self.call_after_resolve(&mut after).await?;

            if stop || remaining.is_empty() {
                break;
            }
        }

        self.inner.borrow_mut().is_resolved = true;

        let last_requires_subcommand = {
            let inner = self.inner.borrow();
            inner.queue.last().map(|c| (c.command.requires_subcommand, c.command_name.clone()))
        };
        if let Some((true, command)) = last_requires_subcommand {
            return Err(CliError::SubcommandRequired { command }.into());
        }

        Ok(())
    }

    async fn parse_with_hooks(&self) -> Result<()> {
        let mut before = BeforeParsePayload { skip: false, parsed_options_and_skip: None, parse_fn: None };
        self.call_before_parse(&mut before).await?;

        if let Some(f) = before.parse_fn.take() {
            self.inner.borrow_mut().parse_fn = f;
        }

        let skip = before.skip;
        if !skip {
            let tokens = crate::token::split_tokens(&self.command_string(), ' ');
            let parse_fn = self.inner.borrow().parse_fn.clone();
            let schema = self.options();
            let parsed = (parse_fn)(&tokens, &schema, true, false)?;
            self.option_values().borrow_mut().extend(parsed.options);
        } else if let Some(values) = before.parsed_options_and_skip {
            self.option_values().borrow_mut().extend(values);
        }

        let mut after = AfterParsePayload { skipped: skip };
        self.call_after_parse(&mut after).await?;

        self.inner.borrow_mut().is_parsed = true;
        Ok(())
    }

    /**
     * Run one invocation to completion: create a fresh `State`, drive
     * the queue, store the final `data` as the Context's `result`.
     */
    pub async fn execute(&self, initial_data: Data) -> Result<Data> {
        let state = State::new(self.clone(), initial_data.clone());

        let mut before = BeforeExecutePayload { skip: false, result: None };
        self.call_before_execute(&mut before).await?;

        let result = if before.skip {
            before.result.unwrap_or(initial_data)
        } else {
            if !self.is_ready() {
                return Err(CliError::Usage("context is not ready; call prepare() first".to_string()).into());
            }
            match state.start(initial_data).await {
                Ok(data) => data,
                Err(err) => {
                    self.throw(err).await?;
                    state.data()
                }
            }
        };

        let mut after = AfterExecutePayload { skipped: before.skip, result: None };
        self.call_after_execute(&mut after).await?;
        let result = after.result.unwrap_or(result);

        self.inner.borrow_mut().result = Some(result.clone());
        Ok(result)
    }

    /**
     * Every throw point in the orchestrator funnels here. Hooks may
     * replace the error, suppress it via `ignore()`, or let it
     * propagate.
     */
    pub async fn throw(&self, err: anyhow::Error) -> Result<()> {
        let mut payload = BeforeErrorPayload { error: err, ignore: false };
        self.call_before_error(&mut payload).await?;
        if payload.ignore {
            Ok(())
        } else {
            Err(payload.error)
        }
    }

    /**
     * Hooks may cancel, replace the code, or replace the message. Not
     * cancelled: logs via the `Client` (info on code 0, error
     * otherwise) and terminates the process.
     */
    pub async fn exit(&self, code: i32, message: Option<String>) -> Result<()> {
        let mut payload = BeforeExitPayload { code, message, cancel: false };
        self.call_before_exit(&mut payload).await?;

        if payload.cancel {
            return Ok(());
        }

        let text = payload.message.unwrap_or_default();
        if payload.code == 0 {
            self.client().log(&self.logger(), &text);
        } else {
            self.client().error(&self.logger(), &text);
        }

        std::process::exit(payload.code);
    }
}
