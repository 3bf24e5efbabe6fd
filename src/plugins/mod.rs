/**
 * The two reference plugins: `help` and `logger`. Neither one is
 * privileged — both are ordinary `Plugin<C>` implementations a
 * consumer could have written, registered the same way any
 * third-party plugin would be.
 */
pub mod help;
pub mod logger;

pub use help::{HelpRenderer, HelpPlugin, PlainHelpRenderer};
pub use logger::LoggerPlugin;
