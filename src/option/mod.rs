/**
 * Option declarations, the merged schema they form, and the parsed
 * values a command reads at runtime. See `parser` for the code that
 * turns a command string into `OptionValues` against an `OptionsConfig`,
 * and `getter` for the deferred, prompt-capable accessor handlers read.
 */
mod getter;
pub(crate) mod parser;

pub use getter::{GetOpts, OptionsGetter};
pub use parser::{first_free_token_index, parse, ParsedArgs};

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionType {
    Str,
    Number,
    Bool,
    ArrayStr,
    ArrayNumber,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Str(String),
    Number(f64),
    Bool(bool),
    ArrayStr(Vec<String>),
    ArrayNumber(Vec<f64>),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array_str(&self) -> Option<&[String]> {
        match self {
            OptionValue::ArrayStr(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array_number(&self) -> Option<&[f64]> {
        match self {
            OptionValue::ArrayNumber(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind(&self) -> OptionType {
        match self {
            OptionValue::Str(_) => OptionType::Str,
            OptionValue::Number(_) => OptionType::Number,
            OptionValue::Bool(_) => OptionType::Bool,
            OptionValue::ArrayStr(_) => OptionType::ArrayStr,
            OptionValue::ArrayNumber(_) => OptionType::ArrayNumber,
        }
    }
}

pub type ValidateFn = Arc<dyn Fn(&OptionValue) -> Result<(), String> + Send + Sync>;

/**
 * A single option declaration. Keys are canonical; `alias` lists any
 * further tokens (short letters or alternate long names) that resolve
 * to the same canonical key.
 */
#[derive(Clone)]
pub struct OptionDecl {
    pub kind: OptionType,
    pub alias: Vec<String>,
    pub description: String,
    pub default: Option<OptionValue>,
    pub required: bool,
    pub choices: Option<Vec<OptionValue>>,
    pub conflicts: Vec<String>,
    pub requires: Vec<String>,
    pub validate: Option<ValidateFn>,
}

impl OptionDecl {
    pub fn new(kind: OptionType) -> OptionDecl {
        OptionDecl {
            kind,
            alias: Vec::new(),
            description: String::new(),
            default: None,
            required: false,
            choices: None,
            conflicts: Vec::new(),
            requires: Vec::new(),
            validate: None,
        }
    }

    pub fn string() -> OptionDecl {
        OptionDecl::new(OptionType::Str)
    }

    pub fn number() -> OptionDecl {
        OptionDecl::new(OptionType::Number)
    }

    pub fn boolean() -> OptionDecl {
        OptionDecl::new(OptionType::Bool)
    }

    pub fn array_string() -> OptionDecl {
        OptionDecl::new(OptionType::ArrayStr)
    }

    pub fn array_number() -> OptionDecl {
        OptionDecl::new(OptionType::ArrayNumber)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> OptionDecl {
        self.alias.push(alias.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> OptionDecl {
        self.description = desc.into();
        self
    }

    pub fn default(mut self, value: OptionValue) -> OptionDecl {
        self.default = Some(value);
        self
    }

    pub fn required(mut self, required: bool) -> OptionDecl {
        self.required = required;
        self
    }

    pub fn choices(mut self, choices: Vec<OptionValue>) -> OptionDecl {
        self.choices = Some(choices);
        self
    }

    pub fn conflicts(mut self, key: impl Into<String>) -> OptionDecl {
        self.conflicts.push(key.into());
        self
    }

    pub fn requires(mut self, key: impl Into<String>) -> OptionDecl {
        self.requires.push(key.into());
        self
    }

    pub fn validate(
        mut self,
        f: impl Fn(&OptionValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> OptionDecl {
        self.validate = Some(Arc::new(f));
        self
    }
}

/** Insertion-order-preserving map from canonical key to declaration. */
pub type OptionsConfig = IndexMap<String, OptionDecl>;

/**
 * A replaceable parse function. A plugin may install its own during
 * setup or while a parse is in flight, in place of the default.
 */
pub type ParseFnPtr =
    Arc<dyn Fn(&[String], &OptionsConfig, bool, bool) -> anyhow::Result<ParsedArgs>>;

/** Parsed, typed option values keyed by canonical key. */
pub type OptionValues = HashMap<String, OptionValue>;

/**
 * Shallow-merge `incoming` into `base`. A duplicate key keeps the
 * incoming declaration (later wins per the data-model invariant), but
 * is refused if doing so would contradict an existing `conflicts` set
 * involving that key's `required`/`default` posture.
 */
pub fn merge_options(
    base: &mut OptionsConfig,
    incoming: &OptionsConfig,
) -> anyhow::Result<()> {
    for (key, decl) in incoming.iter() {
        if let Some(existing) = base.get(key) {
            for peer in existing.conflicts.iter() {
                if peer == key {
                    continue;
                }
                if let Some(peer_decl) = base.get(peer) {
                    if peer_decl.required && decl.required {
                        anyhow::bail!(
                            "option \"{}\" conflicts with required option \"{}\"",
                            key,
                            peer
                        );
                    }
                }
            }
        }
        base.insert(key.clone(), decl.clone());
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl ParamValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[String]> {
        match self {
            ParamValue::Multi(v) => Some(v),
            _ => None,
        }
    }
}

pub type Params = HashMap<String, ParamValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_preserves_insertion_order() {
        let mut base = OptionsConfig::new();
        base.insert("b".into(), OptionDecl::string());
        let mut incoming = OptionsConfig::new();
        incoming.insert("a".into(), OptionDecl::string());
        merge_options(&mut base, &incoming).unwrap();
        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn merge_later_wins() {
        let mut base = OptionsConfig::new();
        base.insert("k".into(), OptionDecl::string().default(OptionValue::Str("x".into())));
        let mut incoming = OptionsConfig::new();
        incoming.insert("k".into(), OptionDecl::string().default(OptionValue::Str("y".into())));
        merge_options(&mut base, &incoming).unwrap();
        assert_eq!(
            base.get("k").unwrap().default,
            Some(OptionValue::Str("y".into()))
        );
    }
}
