/**
 * The abstract I/O boundary the orchestrator talks to: logging, error
 * reporting, and interactive prompts. The prompt *transport* (line
 * editing, select menus) is deliberately out of scope; `Client` only
 * defines the request/response contract. `StdioClient` is a minimal
 * concrete implementation suitable for tests and as the `run()`
 * default.
 */
use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use slog::Logger;

use crate::error::CliError;
use crate::option::OptionValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptType {
    Text,
    Number,
    Confirm,
    Select,
    Multiselect,
    List,
    Password,
    Date,
    Autocomplete,
    Toggle,
    Invisible,
}

#[derive(Clone)]
pub struct PromptRequest {
    pub kind: PromptType,
    pub message: String,
    pub initial: Option<OptionValue>,
    pub choices: Vec<String>,
    /**
     * Returns `Ok(())` when the answer is acceptable, or `Err(message)`
     * with a diagnostic otherwise; the transport is expected to
     * re-prompt on failure.
     */
    pub validate: Option<std::sync::Arc<dyn Fn(&OptionValue) -> Result<(), String> + Send + Sync>>,
}

impl std::fmt::Debug for PromptRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRequest")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("initial", &self.initial)
            .field("choices", &self.choices)
            .field("validate", &self.validate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl PromptRequest {
    pub fn new(kind: PromptType, message: impl Into<String>) -> PromptRequest {
        PromptRequest {
            kind,
            message: message.into(),
            initial: None,
            choices: Vec::new(),
            validate: None,
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

pub trait Client {
    fn log(&self, logger: &Logger, msg: &str);
    fn error(&self, logger: &Logger, msg: &str);
    fn prompt<'a>(
        &'a self,
        request: PromptRequest,
    ) -> BoxFuture<'a, anyhow::Result<OptionValue>>;
    fn confirm<'a>(&'a self, message: &'a str) -> BoxFuture<'a, anyhow::Result<bool>>;
}

/**
 * A plain stdio `Client`: logs go to stdout via the logger, errors to
 * stderr, and prompts are read synchronously from stdin.
 */
pub struct StdioClient;

impl Client for StdioClient {
    fn log(&self, logger: &Logger, msg: &str) {
        slog::info!(logger, "{}", msg);
    }

    fn error(&self, logger: &Logger, msg: &str) {
        slog::error!(logger, "{}", msg);
        eprintln!("Error: {}", msg);
    }

    fn prompt<'a>(
        &'a self,
        request: PromptRequest,
    ) -> BoxFuture<'a, anyhow::Result<OptionValue>> {
        Box::pin(async move {
            loop {
                print!("{}: ", request.message);
                std::io::stdout().flush().ok();

                let mut line = String::new();
                std::io::stdin()
                    .read_line(&mut line)
                    .map_err(|e| CliError::Client(e.to_string()))?;
                let line = line.trim();

                let value = match request.kind {
                    PromptType::Number => match line.parse::<f64>() {
                        Ok(n) => OptionValue::Number(n),
                        Err(_) => {
                            eprintln!("please enter a number");
                            continue;
                        }
                    },
                    PromptType::Confirm | PromptType::Toggle => {
                        OptionValue::Bool(matches!(line, "y" | "yes" | "true"))
                    }
                    PromptType::List | PromptType::Multiselect => OptionValue::ArrayStr(
                        line.split(',').map(|s| s.trim().to_string()).collect(),
                    ),
                    _ => OptionValue::Str(line.to_string()),
                };

                if let Some(validate) = &request.validate {
                    if let Err(msg) = validate(&value) {
                        eprintln!("{}", msg);
                        continue;
                    }
                }

                return Ok(value);
            }
        })
    }

    fn confirm<'a>(&'a self, message: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let request = PromptRequest::new(PromptType::Confirm, message.to_string());
            match self.prompt(request).await? {
                OptionValue::Bool(b) => Ok(b),
                _ => Ok(false),
            }
        })
    }
}
