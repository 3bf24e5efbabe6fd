/**
 * The per-key accessor handlers a handler reads options through. Each
 * call to `get` (i) returns the parsed value if present, (ii) else the
 * declared default, (iii) else, if a prompt was requested (explicitly
 * via `GetOpts::prompt`, or implicitly because the declaration is
 * `required`), prompts and caches the answer, (iv) else returns
 * `None`.
 */
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use slog::Logger;

use super::{OptionDecl, OptionType, OptionValue, OptionsConfig, OptionValues, ValidateFn};
use crate::client::{Client, PromptRequest, PromptType};

#[derive(Clone, Default)]
pub struct GetOpts {
    pub prompt: Option<String>,
    pub validate: Option<ValidateFn>,
    pub initial: Option<OptionValue>,
}

fn prompt_type_for(kind: OptionType) -> PromptType {
    match kind {
        OptionType::Str => PromptType::Text,
        OptionType::Number => PromptType::Number,
        OptionType::Bool => PromptType::Confirm,
        OptionType::ArrayStr | OptionType::ArrayNumber => PromptType::List,
    }
}

pub struct OptionsGetter {
    schema: OptionsConfig,
    alias_to_canonical: std::collections::HashMap<String, String>,
    values: Rc<RefCell<OptionValues>>,
    client: Rc<dyn Client>,
    logger: Logger,
}

impl OptionsGetter {
    pub fn new(
        schema: OptionsConfig,
        values: Rc<RefCell<OptionValues>>,
        client: Rc<dyn Client>,
        logger: Logger,
    ) -> OptionsGetter {
        let mut alias_to_canonical = std::collections::HashMap::new();
        for (key, decl) in schema.iter() {
            for alias in decl.alias.iter() {
                alias_to_canonical.insert(alias.clone(), key.clone());
            }
        }
        OptionsGetter { schema, alias_to_canonical, values, client, logger }
    }

    fn canonical(&self, key: &str) -> String {
        self.alias_to_canonical
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    fn decl(&self, canonical: &str) -> Option<&OptionDecl> {
        self.schema.get(canonical)
    }

    /**
     * Fetch a value by key (or one of its aliases), deferring to a
     * prompt when necessary per the policy above.
     */
    pub async fn get(&self, key: &str, opts: Option<GetOpts>) -> Result<Option<OptionValue>> {
        let canonical = self.canonical(key);

        if let Some(v) = self.values.borrow().get(&canonical) {
            return Ok(Some(v.clone()));
        }

        let decl = match self.decl(&canonical) {
            Some(d) => d,
            None => return Ok(None),
        };

        if let Some(default) = &decl.default {
            if opts.as_ref().and_then(|o| o.prompt.as_ref()).is_none() {
                return Ok(Some(default.clone()));
            }
        }

        let prompt_message = opts.as_ref().and_then(|o| o.prompt.clone());
        let must_prompt = prompt_message.is_some() || decl.required;

        if !must_prompt {
            return Ok(decl.default.clone());
        }

        let message = prompt_message.unwrap_or_else(|| canonical.clone());
        let initial = opts
            .as_ref()
            .and_then(|o| o.initial.clone())
            .or_else(|| decl.default.clone());
        let validate = opts
            .as_ref()
            .and_then(|o| o.validate.clone())
            .or_else(|| decl.validate.clone());

        let mut request = PromptRequest::new(prompt_type_for(decl.kind), message);
        request.initial = initial;
        request.validate = validate;

        slog::debug!(self.logger, "prompting for option"; "key" => %canonical);

        let value = self.client.prompt(request).await?;
        self.values.borrow_mut().insert(canonical.clone(), value.clone());
        Ok(Some(value))
    }
}
