/**
 * The per-`execute` cursor through the resolved command queue, driving
 * a full middleware chain with cooperative `next`/`end` control flow.
 *
 * `State<C>` is a cheap `Rc`-backed handle — the engine is single
 * threaded and cooperative, so `Rc<RefCell<_>>` is the natural fit
 * rather than `Arc<Mutex<_>>` — so a handler can hold its own `state`
 * and `context` handles for the duration of the call without lifetime
 * gymnastics; treat them as back-references valid only for that call.
 */
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::context::Context;
use crate::hooks::{
    AfterCommandPayload, BeforeCommandPayload, BeforeEndPayload, BeforeStateChangePayload,
    Changes,
};
use crate::option::{OptionsGetter, Params};
use crate::resolver::{Data, HandlerArgs, ResolvedCommand};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Pending,
    Running,
    Ended,
    Errored,
}

struct StateInner<C> {
    context: Context<C>,
    index: usize,
    data: Data,
    command: Option<Rc<ResolvedCommand<C>>>,
    params: Params,
    status: Status,
    next_called: bool,
    end_called: bool,
}

pub struct State<C> {
    inner: Rc<RefCell<StateInner<C>>>,
}

impl<C> Clone for State<C> {
    fn clone(&self) -> State<C> {
        State { inner: self.inner.clone() }
    }
}

impl<C: 'static> State<C> {
    pub fn new(context: Context<C>, initial_data: Data) -> State<C> {
        State {
            inner: Rc::new(RefCell::new(StateInner {
                context,
                index: 0,
                data: initial_data,
                command: None,
                params: Params::new(),
                status: Status::Pending,
                next_called: false,
                end_called: false,
            })),
        }
    }

    pub fn context(&self) -> Context<C> {
        self.inner.borrow().context.clone()
    }

    pub fn data(&self) -> Data {
        self.inner.borrow().data.clone()
    }

    pub fn params(&self) -> Params {
        self.inner.borrow().params.clone()
    }

    pub fn command(&self) -> Option<Rc<ResolvedCommand<C>>> {
        self.inner.borrow().command.clone()
    }

    pub fn status(&self) -> Status {
        self.inner.borrow().status
    }

    pub fn index(&self) -> usize {
        self.inner.borrow().index
    }

    /**
     * Advance to the next queue entry, optionally replacing `data`. May
     * be called at most once per handler invocation; later calls
     * within the same invocation are a no-op.
     */
    pub async fn next(&self, data: Option<Data>) {
        if self.already_decided() {
            return;
        }
        self.apply_changes(Changes { data, advance: true, end: false }).await;
        self.inner.borrow_mut().next_called = true;
    }

    /**
     * End the chain, optionally replacing `data`. Fires `beforeEnd`
     * before the state transition lands.
     */
    pub async fn end(&self, data: Option<Data>) {
        if self.already_decided() {
            return;
        }
        let mut payload = BeforeEndPayload { data: data.clone() };
        let ctx = self.context();
        ctx.call_before_end(&mut payload).await.ok();
        self.apply_changes(Changes { data: payload.data, advance: false, end: true }).await;
        self.inner.borrow_mut().end_called = true;
    }

    fn already_decided(&self) -> bool {
        let inner = self.inner.borrow();
        inner.next_called || inner.end_called
    }

    async fn apply_changes(&self, changes: Changes) {
        let ctx = self.context();
        let mut payload = BeforeStateChangePayload { changes: changes.clone(), skip: false };
        ctx.call_before_state_change(&mut payload).await.ok();

        if !payload.skip {
            let mut inner = self.inner.borrow_mut();
            if let Some(d) = payload.changes.data.clone() {
                inner.data = d;
            }
            if payload.changes.advance {
                inner.index += 1;
            }
            if payload.changes.end {
                inner.status = Status::Ended;
            }
        }

        let mut after = crate::hooks::AfterStateChangePayload { skipped: payload.skip };
        ctx.call_after_state_change(&mut after).await.ok();
    }

    /**
     * Drive the queue to completion: dispatch `beforeCommand`, invoke
     * the handler (auto-advancing if it calls neither `next` nor
     * `end`), dispatch `afterCommand`, and loop. A handler that calls
     * `end` halts the loop before the next `beforeCommand` fires — the
     * loop re-checks `status` at the top of every iteration, ahead of
     * dispatching the next `beforeCommand`.
     */
    pub async fn start(&self, initial_data: Data) -> Result<Data> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.data = initial_data;
            inner.index = 0;
            inner.status = Status::Running;
        }

        let queue_len = self.context().queue_len();

        loop {
            let (idx, ended) = {
                let inner = self.inner.borrow();
                (inner.index, inner.status == Status::Ended)
            };
            if idx >= queue_len || ended {
                break;
            }

            let command = self.context().queue_get(idx);
            {
                let mut inner = self.inner.borrow_mut();
                inner.command = Some(command.clone());
                inner.params = command.params.clone();
                inner.next_called = false;
                inner.end_called = false;
            }

            let mut before_cmd = BeforeCommandPayload::default();
            self.context().call_before_command(&mut before_cmd).await.ok();

            if before_cmd.skip {
                self.inner.borrow_mut().index += 1;
                let mut after = AfterCommandPayload { skipped: true };
                self.context().call_after_command(&mut after).await.ok();
                continue;
            }

            let options = self.build_options_getter();
            let data = self.data();
            let handler_args = HandlerArgs {
                context: self.context(),
                state: self.clone(),
                client: self.context().client(),
                options,
                params: command.params.clone(),
                command: command.clone(),
                data,
            };

            (command.command.handler)(handler_args).await?;

            let (next_called, end_called) = {
                let inner = self.inner.borrow();
                (inner.next_called, inner.end_called)
            };
            if !next_called && !end_called {
                self.next(None).await;
            }

            let mut after_cmd = AfterCommandPayload { skipped: false };
            self.context().call_after_command(&mut after_cmd).await.ok();
        }

        Ok(self.data())
    }

    fn build_options_getter(&self) -> OptionsGetter {
        let ctx = self.context();
        OptionsGetter::new(ctx.options(), ctx.option_values(), ctx.client(), ctx.logger())
    }
}
