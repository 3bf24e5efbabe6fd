/**
 * The built-in logger plugin: observational handlers on the core
 * lifecycle hooks, gated by process-global enable/disable/toggle
 * switches (shared mutable state with last-writer-wins semantics,
 * documented as global rather than hidden behind an instance) and an
 * optional append-mode file sink.
 */
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use slog::Logger;

use crate::context::Context;
use crate::hooks::{AfterCommandPayload, BeforeCommandPayload, BeforeErrorPayload, BeforeExitPayload};
use crate::plugin::Plugin;

static LOGGER_ENABLED: AtomicBool = AtomicBool::new(true);

/**
 * Process-global switch. Affects every `LoggerPlugin` instance in the
 * process.
 */
pub fn enable() {
    LOGGER_ENABLED.store(true, Ordering::SeqCst);
}

pub fn disable() {
    LOGGER_ENABLED.store(false, Ordering::SeqCst);
}

pub fn toggle() {
    LOGGER_ENABLED.fetch_xor(true, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    LOGGER_ENABLED.load(Ordering::SeqCst)
}

type Sink = Option<Rc<RefCell<File>>>;

fn record_line(sink: &Sink, line: &str) {
    if let Some(file) = sink {
        let _ = writeln!(file.borrow_mut(), "{}", line);
    }
}

pub struct LoggerPlugin {
    sink: Sink,
}

impl LoggerPlugin {
    pub fn new() -> LoggerPlugin {
        LoggerPlugin { sink: None }
    }

    /**
     * Appends one line per observed event to `path`, opened (and
     * created if missing) in append mode. Written to synchronously —
     * a line-append sink does not warrant an async file I/O crate.
     */
    pub fn with_file_sink(path: impl AsRef<Path>) -> Result<LoggerPlugin> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LoggerPlugin { sink: Some(Rc::new(RefCell::new(file))) })
    }
}

impl Default for LoggerPlugin {
    fn default() -> LoggerPlugin {
        LoggerPlugin::new()
    }
}

impl<C: 'static> Plugin<C> for LoggerPlugin {
    fn name(&self) -> &str {
        "logger"
    }

    fn description(&self) -> Option<&str> {
        Some("observational lifecycle logging")
    }

    fn init<'a>(&'a self, context: Context<C>) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        let sink = self.sink.clone();
        Box::pin(async move {
            let logger = context.logger();

            {
                let sink = sink.clone();
                let logger = logger.clone();
                context.on_before_command(crate::hooks::hook(move |payload: &mut BeforeCommandPayload| {
                    let sink = sink.clone();
                    let logger = logger.clone();
                    let skip = payload.skip;
                    Box::pin(async move {
                        emit(&logger, &sink, &format!("beforeCommand skip={}", skip));
                        Ok(())
                    })
                }));
            }

            {
                let sink = sink.clone();
                let logger = logger.clone();
                context.on_after_command(crate::hooks::hook(move |payload: &mut AfterCommandPayload| {
                    let sink = sink.clone();
                    let logger = logger.clone();
                    let skipped = payload.skipped;
                    Box::pin(async move {
                        emit(&logger, &sink, &format!("afterCommand skipped={}", skipped));
                        Ok(())
                    })
                }));
            }

            {
                let sink = sink.clone();
                let logger = logger.clone();
                context.on_before_error(crate::hooks::hook(move |payload: &mut BeforeErrorPayload| {
                    let sink = sink.clone();
                    let logger = logger.clone();
                    let message = payload.error.to_string();
                    Box::pin(async move {
                        emit(&logger, &sink, &format!("beforeError {}", message));
                        Ok(())
                    })
                }));
            }

            {
                let sink = sink.clone();
                let logger = logger.clone();
                context.on_before_exit(crate::hooks::hook(move |payload: &mut BeforeExitPayload| {
                    let sink = sink.clone();
                    let logger = logger.clone();
                    let code = payload.code;
                    Box::pin(async move {
                        emit(&logger, &sink, &format!("beforeExit code={}", code));
                        Ok(())
                    })
                }));
            }

            Ok(())
        })
    }
}

fn emit(logger: &Logger, sink: &Sink, line: &str) {
    if !is_enabled() {
        return;
    }
    slog::debug!(logger, "{}", line);
    record_line(sink, line);
}
