/**
 * The plugin contract. A plugin is a name plus an optional async `init`
 * that runs once, before resolution, and may mutate options, register
 * hooks, or replace the context's resolve/parse functions.
 */
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;

use crate::context::Context;
use crate::error::CliError;

pub trait Plugin<C> {
    fn name(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    /**
     * Runs once, before resolution. May mutate `context`'s options,
     * register hook handlers, or replace its resolve/parse functions.
     */
    fn init<'a>(&'a self, context: Context<C>) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        let _ = context;
        Box::pin(async { Ok(()) })
    }
}

/**
 * Shallow-frozen (by convention, not enforcement) snapshot of a
 * plugin's identity, published on `Context` once `init` returns.
 */
#[derive(Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub meta: RefCell<HashMap<String, String>>,
    is_ready: Cell<bool>,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>) -> PluginInfo {
        PluginInfo {
            name: name.into(),
            version: None,
            description: None,
            meta: RefCell::new(HashMap::new()),
            is_ready: Cell::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.get()
    }

    /**
     * Transitions `is_ready` false -> true exactly once; a second call
     * is a no-op.
     */
    pub fn mark_ready(&self) {
        self.is_ready.set(true);
    }
}

/** Reject a duplicate plugin name before registration. */
pub fn check_unique_name(existing: &[PluginInfo], name: &str) -> Result<()> {
    if existing.iter().any(|p| p.name == name) {
        return Err(CliError::Plugin(format!("duplicate plugin \"{}\"", name)).into());
    }
    Ok(())
}
