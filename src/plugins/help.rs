/**
 * The built-in help plugin: a `help`/`h` boolean option, a
 * before-resolve short-circuit when the remaining input is nothing but
 * help flags, a before-execute skip when help was requested or a usage
 * error was captured, and an after-execute render-or-report step.
 * Rendering itself — turning a `Context`'s merged options and queue
 * into readable text — is left to an external collaborator;
 * `HelpRenderer` is the seam, and `PlainHelpRenderer` a minimal,
 * undecorated default.
 */
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use anyhow::Result;

use crate::context::Context;
use crate::error::CliError;
use crate::hooks::{AfterExecutePayload, BeforeErrorPayload, BeforeExecutePayload, BeforeResolvePayload};
use crate::option::{OptionDecl, OptionsConfig};
use crate::plugin::Plugin;

pub trait HelpRenderer<C> {
    fn render(&self, context: &Context<C>) -> String;
}

/**
 * Lists the merged option schema in declaration order. No ANSI, no
 * column alignment beyond simple padding — a real renderer is a
 * consumer concern.
 */
pub struct PlainHelpRenderer;

impl<C: 'static> HelpRenderer<C> for PlainHelpRenderer {
    fn render(&self, context: &Context<C>) -> String {
        let mut out = String::new();
        out.push_str(&format!("usage: {}\n", context.command_string()));
        out.push_str("\noptions:\n");
        for (key, decl) in context.options().iter() {
            let aliases = if decl.alias.is_empty() {
                String::new()
            } else {
                format!(" ({})", decl.alias.join(", "))
            };
            out.push_str(&format!("  --{}{}\t{}\n", key, aliases, decl.description));
        }
        out
    }
}

fn only_help_flags(remaining: &str) -> bool {
    let tokens = crate::token::split_tokens(remaining, ' ');
    if tokens.is_empty() {
        return false;
    }
    tokens.iter().all(|t| matches!(t.as_str(), "-h" | "--help" | "--no-help"))
}

pub struct HelpPlugin<C> {
    renderer: Rc<dyn HelpRenderer<C>>,
}

impl<C: 'static> HelpPlugin<C> {
    pub fn new() -> HelpPlugin<C> {
        HelpPlugin { renderer: Rc::new(PlainHelpRenderer) }
    }

    pub fn with_renderer(renderer: Rc<dyn HelpRenderer<C>>) -> HelpPlugin<C> {
        HelpPlugin { renderer }
    }
}

impl<C: 'static> Default for HelpPlugin<C> {
    fn default() -> HelpPlugin<C> {
        HelpPlugin::new()
    }
}

impl<C: 'static> Plugin<C> for HelpPlugin<C> {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> Option<&str> {
        Some("built-in usage/help rendering")
    }

    fn init<'a>(&'a self, context: Context<C>) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        let renderer = self.renderer.clone();
        Box::pin(async move {
            let mut declared = OptionsConfig::new();
            declared.insert(
                "help".to_string(),
                OptionDecl::boolean().alias("h").description("show help text"),
            );
            context.set_options(declared)?;

            // Shared between the before-error capture and the later
            // before-execute/after-execute handlers; a plugin's `init`
            // only gets `&self` for the duration of the call, so this
            // state lives in its own `Rc<RefCell<_>>` rather than on
            // `self`.
            let captured_usage: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

            context.on_before_resolve(crate::hooks::hook(move |payload: &mut BeforeResolvePayload<C>| {
                let remaining = payload.remaining_command_string.clone();
                Box::pin(async move {
                    if only_help_flags(&remaining) {
                        payload.skip();
                        payload.stop_resolving();
                    }
                    Ok(())
                })
            }));

            {
                let captured_usage = captured_usage.clone();
                context.on_before_error(crate::hooks::hook(move |payload: &mut BeforeErrorPayload| {
                    let captured_usage = captured_usage.clone();
                    Box::pin(async move {
                        if let Some(CliError::Usage(message)) = payload.error.downcast_ref::<CliError>() {
                            *captured_usage.borrow_mut() = Some(message.clone());
                            payload.ignore();
                        }
                        Ok(())
                    })
                }));
            }

            {
                let context_for_hook = context.clone();
                let captured_usage = captured_usage.clone();
                let context_for_closure = context_for_hook.clone();
                context_for_hook.on_before_execute(crate::hooks::hook(move |payload: &mut BeforeExecutePayload| {
                    let context = context_for_closure.clone();
                    let captured_usage = captured_usage.clone();
                    Box::pin(async move {
                        let help_requested = context
                            .option_values()
                            .borrow()
                            .get("help")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        if help_requested || captured_usage.borrow().is_some() {
                            payload.skip();
                        }
                        Ok(())
                    })
                }));
            }

            {
                let context_for_hook = context.clone();
                let context_for_closure = context_for_hook.clone();
                context_for_hook.on_after_execute(crate::hooks::hook(move |payload: &mut AfterExecutePayload| {
                    let context = context_for_closure.clone();
                    let captured_usage = captured_usage.clone();
                    let renderer = renderer.clone();
                    Box::pin(async move {
                        let help_requested = context
                            .option_values()
                            .borrow()
                            .get("help")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);

                        if help_requested {
                            let text = renderer.render(&context);
                            context.client().log(&context.logger(), &text);
                        } else if let Some(message) = captured_usage.borrow().clone() {
                            context.client().error(&context.logger(), &message);
                            payload.set_result(crate::resolver::Data::String(message));
                        }
                        Ok(())
                    })
                }));
            }

            Ok(())
        })
    }
}
