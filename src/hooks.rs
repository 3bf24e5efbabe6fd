/**
 * The twelve-plus named lifecycle hooks. Each event gets its own
 * `HookSlot<P>` holding an ordered list of handlers and a
 * strongly-typed payload `P`; a `HookRegistry<C>` bundles one slot per
 * event instead of a name-keyed map of dynamically-typed payloads.
 *
 * Handlers run in registration order, each awaited before the next
 * runs; there is no implicit parallelism. `once` handlers remove
 * themselves before invoking the user body. Adding a handler during a
 * `call` only affects future calls.
 */
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use anyhow::Result;

use crate::option::OptionValues;
use crate::resolver::{Data, ResolvedCommand};

pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;
pub type HookFn<P> = Rc<dyn for<'p> Fn(&'p mut P) -> HookFuture<'p>>;

/**
 * Builds a `HookFn<P>` from a closure. Plain `Rc::new(move |payload| ..)`
 * at a call site struggles to infer the higher-ranked bound `HookFn`
 * needs (the closure must work for *any* borrow lifetime of `payload`,
 * not the one lifetime inference would otherwise pick); routing
 * through a generic function whose `where` clause states that bound
 * explicitly gives the compiler something concrete to check the
 * closure against.
 */
pub fn hook<P: 'static>(f: impl for<'p> Fn(&'p mut P) -> HookFuture<'p> + 'static) -> HookFn<P> {
    Rc::new(f)
}

struct Entry<P> {
    id: u64,
    once: bool,
    f: HookFn<P>,
}

/** One named lifecycle event: an ordered list of handlers over payload type `P`. */
pub struct HookSlot<P> {
    entries: Vec<Entry<P>>,
    next_id: u64,
}

impl<P> Default for HookSlot<P> {
    fn default() -> HookSlot<P> {
        HookSlot { entries: Vec::new(), next_id: 0 }
    }
}

/** Handle returned by `on`/`once`, usable with `off`. */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookHandle(u64);

impl<P: 'static> HookSlot<P> {
    pub fn on(&mut self, f: HookFn<P>) -> HookHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { id, once: false, f });
        HookHandle(id)
    }

    pub fn once(&mut self, f: HookFn<P>) -> HookHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { id, once: true, f });
        HookHandle(id)
    }

    pub fn off(&mut self, handle: HookHandle) {
        self.entries.retain(|e| e.id != handle.0);
    }

    /**
     * Await each registered handler in registration order against a
     * snapshot taken at call time; handlers added mid-call do not
     * affect this invocation.
     */
    pub async fn call(&mut self, payload: &mut P) -> Result<()> {
        let snapshot: Vec<Entry<P>> = self
            .entries
            .iter()
            .map(|e| Entry { id: e.id, once: e.once, f: e.f.clone() })
            .collect();

        let mut fired_once = Vec::new();
        for entry in &snapshot {
            if entry.once {
                fired_once.push(entry.id);
            }
            (entry.f)(payload).await?;
        }

        if !fired_once.is_empty() {
            self.entries.retain(|e| !fired_once.contains(&e.id));
        }

        Ok(())
    }
}

// ---- Payloads -------------------------------------------------------

pub struct BeforeResolvePayload<C> {
    pub remaining_command_string: String,
    pub next_commands_dir: String,
    pub skip: bool,
    pub stop_resolving: bool,
    pub addendum: Vec<Rc<ResolvedCommand<C>>>,
    pub resolve_fn: Option<crate::resolver::ResolveFnPtr<C>>,
}

impl<C> BeforeResolvePayload<C> {
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn stop_resolving(&mut self) {
        self.stop_resolving = true;
    }

    pub fn add_resolved_commands(&mut self, cmds: impl IntoIterator<Item = Rc<ResolvedCommand<C>>>) {
        self.addendum.extend(cmds);
    }

    pub fn set_resolve_fn(&mut self, f: crate::resolver::ResolveFnPtr<C>) {
        self.resolve_fn = Some(f);
    }
}

pub struct AfterResolvePayload {
    pub remaining_command_string: String,
    pub next_commands_dir: String,
    pub skipped: bool,
}

pub struct BeforeParsePayload {
    pub skip: bool,
    pub parsed_options_and_skip: Option<OptionValues>,
    pub parse_fn: Option<crate::option::ParseFnPtr>,
}

impl BeforeParsePayload {
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn set_parsed_options_and_skip(&mut self, values: OptionValues) {
        self.parsed_options_and_skip = Some(values);
        self.skip = true;
    }

    pub fn set_parse_fn(&mut self, f: crate::option::ParseFnPtr) {
        self.parse_fn = Some(f);
    }
}

pub struct AfterParsePayload {
    pub skipped: bool,
}

pub struct BeforeExecutePayload {
    pub skip: bool,
    pub result: Option<Data>,
}

impl BeforeExecutePayload {
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn set_result_and_skip(&mut self, result: Data) {
        self.result = Some(result);
        self.skip = true;
    }
}

pub struct AfterExecutePayload {
    pub skipped: bool,
    pub result: Option<Data>,
}

impl AfterExecutePayload {
    /**
     * Overrides the value `execute` ultimately stores on `Context` and
     * returns. Used by the help plugin to publish a captured usage
     * error's message as the result.
     */
    pub fn set_result(&mut self, result: Data) {
        self.result = Some(result);
    }
}

#[derive(Default)]
pub struct BeforeCommandPayload {
    pub skip: bool,
}

impl BeforeCommandPayload {
    pub fn skip(&mut self) {
        self.skip = true;
    }
}

pub struct AfterCommandPayload {
    pub skipped: bool,
}

pub struct BeforeEndPayload {
    pub data: Option<Data>,
}

pub struct BeforeErrorPayload {
    pub error: anyhow::Error,
    pub ignore: bool,
}

impl BeforeErrorPayload {
    pub fn set_error(&mut self, err: anyhow::Error) {
        self.error = err;
    }

    pub fn ignore(&mut self) {
        self.ignore = true;
    }
}

pub struct BeforeExitPayload {
    pub code: i32,
    pub message: Option<String>,
    pub cancel: bool,
}

impl BeforeExitPayload {
    pub fn set_code(&mut self, code: i32) {
        self.code = code;
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn cancel(&mut self) {
        self.cancel = true;
    }
}

#[derive(Clone, Default)]
pub struct Changes {
    pub data: Option<Data>,
    pub advance: bool,
    pub end: bool,
}

pub struct BeforeStateChangePayload {
    pub changes: Changes,
    pub skip: bool,
}

impl BeforeStateChangePayload {
    pub fn set_changes(&mut self, changes: Changes) {
        self.changes = changes;
    }

    pub fn skip(&mut self) {
        self.skip = true;
    }
}

pub struct AfterStateChangePayload {
    pub skipped: bool,
}

/**
 * All twelve-plus lifecycle hooks for one `Context`, generic over the
 * consumer-provided context type `C` (only the before-resolve payload
 * needs it, to carry pre-seeded `ResolvedCommand<C>`s).
 */
pub struct HookRegistry<C> {
    pub before_resolve: HookSlot<BeforeResolvePayload<C>>,
    pub after_resolve: HookSlot<AfterResolvePayload>,
    pub before_parse: HookSlot<BeforeParsePayload>,
    pub after_parse: HookSlot<AfterParsePayload>,
    pub before_execute: HookSlot<BeforeExecutePayload>,
    pub after_execute: HookSlot<AfterExecutePayload>,
    pub before_command: HookSlot<BeforeCommandPayload>,
    pub after_command: HookSlot<AfterCommandPayload>,
    pub before_end: HookSlot<BeforeEndPayload>,
    pub before_error: HookSlot<BeforeErrorPayload>,
    pub before_exit: HookSlot<BeforeExitPayload>,
    pub before_state_change: HookSlot<BeforeStateChangePayload>,
    pub after_state_change: HookSlot<AfterStateChangePayload>,
}

impl<C> Default for HookRegistry<C> {
    fn default() -> HookRegistry<C> {
        HookRegistry {
            before_resolve: HookSlot::default(),
            after_resolve: HookSlot::default(),
            before_parse: HookSlot::default(),
            after_parse: HookSlot::default(),
            before_execute: HookSlot::default(),
            after_execute: HookSlot::default(),
            before_command: HookSlot::default(),
            after_command: HookSlot::default(),
            before_end: HookSlot::default(),
            before_error: HookSlot::default(),
            before_exit: HookSlot::default(),
            before_state_change: HookSlot::default(),
            after_state_change: HookSlot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_handler_self_removes() {
        // Exercised at the tokio level in tests/scenarios.rs; here we
        // just check bookkeeping on an empty slot.
        let slot: HookSlot<BeforeCommandPayload> = HookSlot::default();
        assert_eq!(slot.entries.len(), 0);
    }
}
