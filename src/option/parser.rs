/**
 * Turns a tokenized command string into `(free tokens, OptionValues)`
 * against a merged `OptionsConfig`. Raw short/long/clustered-short
 * flag tokenizing is delegated to `getopts`; the declarative layer on
 * top (array accumulation with comma-splitting, `--no-key` negation,
 * choices/conflicts/requires, unknown-flag tolerance) is this module's
 * own.
 */
use std::collections::HashMap;

use anyhow::Result;

use super::{OptionType, OptionValue, OptionsConfig, OptionValues};
use crate::error::CliError;

#[derive(Debug)]
pub struct ParsedArgs {
    pub tokens: Vec<String>,
    pub options: OptionValues,
}

#[derive(Clone)]
struct Registration {
    getopts_name: String,
    canonical: String,
    negate: bool,
}

fn negated_name(long: &str) -> String {
    format!("no-{}", long)
}

/**
 * Build a `getopts::Options` for `schema`, returning it along with the
 * registrations needed to map raw getopts matches back to canonical
 * keys.
 */
fn build(schema: &OptionsConfig) -> (getopts::Options, Vec<Registration>) {
    let mut opts = getopts::Options::new();
    opts.parsing_style(getopts::ParsingStyle::FloatingFrees);
    let mut regs = Vec::new();

    for (key, decl) in schema.iter() {
        let mut names: Vec<String> = vec![key.clone()];
        names.extend(decl.alias.iter().cloned());

        for name in names {
            let is_short = name.chars().count() == 1;
            let (short, long) = if is_short {
                (name.as_str(), "")
            } else {
                ("", name.as_str())
            };

            match decl.kind {
                OptionType::Bool => {
                    opts.optflagopt(short, long, &decl.description, "BOOL");
                    regs.push(Registration {
                        getopts_name: name.clone(),
                        canonical: key.clone(),
                        negate: false,
                    });
                    if !is_short {
                        let neg = negated_name(&name);
                        opts.optflag("", &neg, "");
                        regs.push(Registration {
                            getopts_name: neg,
                            canonical: key.clone(),
                            negate: true,
                        });
                    }
                }
                OptionType::ArrayStr | OptionType::ArrayNumber => {
                    opts.optmulti(short, long, &decl.description, "VALUE");
                    regs.push(Registration {
                        getopts_name: name.clone(),
                        canonical: key.clone(),
                        negate: false,
                    });
                }
                OptionType::Str | OptionType::Number => {
                    opts.optopt(short, long, &decl.description, "VALUE");
                    regs.push(Registration {
                        getopts_name: name.clone(),
                        canonical: key.clone(),
                        negate: false,
                    });
                }
            }
        }
    }

    (opts, regs)
}

/**
 * Strip the first occurrence of an unrecognized flag token (`-x` or
 * `--name[=value]`) from `tokens` so a retry can proceed. Returns
 * `None` if the flag cannot be located (should not happen for a flag
 * `getopts` itself just reported).
 */
fn strip_unknown(tokens: &[String], flag: &str) -> Option<Vec<String>> {
    let long = format!("--{}", flag);
    let short = format!("-{}", flag);
    let mut out = tokens.to_vec();
    if let Some(pos) = out.iter().position(|t| {
        t == &long || t.starts_with(&format!("{}=", long)) || t == &short
    }) {
        out.remove(pos);
        Some(out)
    } else {
        None
    }
}

/**
 * Parse `tokens` against `schema`. When `validate` is false, `choices`/
 * `conflicts`/`requires` checks are skipped and `required` is never
 * enforced (this is the mode the resolver uses to peel leading flags
 * off a remaining command string without failing fast). When
 * `allow_unknown` is set, unrecognized flags are tolerated and left as
 * free tokens instead of causing a `Usage` error.
 */
pub fn parse(
    tokens: &[String],
    schema: &OptionsConfig,
    validate: bool,
    allow_unknown: bool,
) -> Result<ParsedArgs> {
    let (opts, regs) = build(schema);
    let mut working = tokens.to_vec();

    let matches = loop {
        match opts.parse(&working) {
            Ok(m) => break m,
            Err(getopts::Fail::UnrecognizedOption(name)) if allow_unknown => {
                match strip_unknown(&working, &name) {
                    Some(next) => working = next,
                    None => {
                        return Err(
                            CliError::Usage(format!("unrecognized option: {}", name)).into()
                        )
                    }
                }
            }
            Err(e) => return Err(CliError::Usage(e.to_string()).into()),
        }
    };

    let mut values: OptionValues = HashMap::new();

    for (key, decl) in schema.iter() {
        let my_regs: Vec<&Registration> =
            regs.iter().filter(|r| &r.canonical == key).collect();

        match decl.kind {
            OptionType::Bool => {
                let mut result: Option<bool> = None;
                for r in &my_regs {
                    if matches.opt_present(&r.getopts_name) {
                        if r.negate {
                            result = Some(false);
                        } else {
                            match matches.opt_str(&r.getopts_name) {
                                Some(raw) => {
                                    result = Some(matches!(
                                        raw.to_lowercase().as_str(),
                                        "true" | "1" | "yes"
                                    ))
                                }
                                None => result = result.or(Some(true)),
                            }
                        }
                    }
                }
                if let Some(v) = result {
                    values.insert(key.clone(), OptionValue::Bool(v));
                }
            }
            OptionType::Str => {
                for r in &my_regs {
                    if let Some(raw) = matches.opt_str(&r.getopts_name) {
                        values.insert(key.clone(), OptionValue::Str(raw));
                    }
                }
            }
            OptionType::Number => {
                for r in &my_regs {
                    if let Some(raw) = matches.opt_str(&r.getopts_name) {
                        match raw.parse::<f64>() {
                            Ok(n) => {
                                values.insert(key.clone(), OptionValue::Number(n));
                            }
                            Err(_) if !validate => {}
                            Err(_) => {
                                return Err(CliError::Usage(format!(
                                    "option \"{}\" expects a number, got \"{}\"",
                                    key, raw
                                ))
                                .into())
                            }
                        }
                    }
                }
            }
            OptionType::ArrayStr => {
                let mut acc = Vec::new();
                for r in &my_regs {
                    for raw in matches.opt_strs(&r.getopts_name) {
                        acc.extend(raw.split(',').map(|s| s.trim().to_string()));
                    }
                }
                if !acc.is_empty() {
                    values.insert(key.clone(), OptionValue::ArrayStr(acc));
                }
            }
            OptionType::ArrayNumber => {
                let mut acc = Vec::new();
                for r in &my_regs {
                    for raw in matches.opt_strs(&r.getopts_name) {
                        for piece in raw.split(',') {
                            match piece.trim().parse::<f64>() {
                                Ok(n) => acc.push(n),
                                Err(_) if !validate => {}
                                Err(_) => {
                                    return Err(CliError::Usage(format!(
                                        "option \"{}\" expects numbers, got \"{}\"",
                                        key,
                                        piece.trim()
                                    ))
                                    .into())
                                }
                            }
                        }
                    }
                }
                if !acc.is_empty() {
                    values.insert(key.clone(), OptionValue::ArrayNumber(acc));
                }
            }
        }
    }

    if validate {
        validate_values(schema, &values)?;
    }

    Ok(ParsedArgs { tokens: matches.free.clone(), options: values })
}

fn validate_values(schema: &OptionsConfig, values: &OptionValues) -> Result<()> {
    for (key, decl) in schema.iter() {
        let value = match values.get(key) {
            Some(v) => v,
            None => continue,
        };

        if let Some(choices) = &decl.choices {
            if !choices.contains(value) {
                return Err(CliError::Usage(format!(
                    "option \"{}\" must be one of the declared choices",
                    key
                ))
                .into());
            }
        }

        for peer in &decl.conflicts {
            if values.contains_key(peer) {
                return Err(CliError::Usage(format!(
                    "option \"{}\" conflicts with \"{}\"",
                    key, peer
                ))
                .into());
            }
        }

        for peer in &decl.requires {
            if !values.contains_key(peer) {
                return Err(CliError::Usage(format!(
                    "option \"{}\" requires \"{}\"",
                    key, peer
                ))
                .into());
            }
        }

        if let Some(validate) = &decl.validate {
            if let Err(msg) = validate(value) {
                return Err(CliError::Usage(format!(
                    "option \"{}\" is invalid: {}",
                    key, msg
                ))
                .into());
            }
        }
    }

    Ok(())
}

/**
 * Helper used by the resolver: re-parse without validation and report
 * the index of the first free (non-flag) token, if any, so the caller
 * can trim leading flags off the remainder.
 */
pub fn first_free_token_index(tokens: &[String], schema: &OptionsConfig) -> Result<Option<usize>> {
    let parsed = parse(tokens, schema, false, true)?;
    if parsed.tokens.is_empty() {
        return Ok(None);
    }
    let first = &parsed.tokens[0];
    Ok(tokens.iter().position(|t| t == first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::OptionDecl;

    fn schema() -> OptionsConfig {
        let mut s = OptionsConfig::new();
        s.insert("name".into(), OptionDecl::string());
        s.insert("force".into(), OptionDecl::boolean().alias("f"));
        s.insert("port".into(), OptionDecl::number());
        s.insert("tags".into(), OptionDecl::array_string());
        s
    }

    fn toks(s: &str) -> Vec<String> {
        crate::token::split_tokens(s, ' ')
    }

    #[test]
    fn parses_long_value() {
        let p = parse(&toks("hello --name Alice"), &schema(), true, false).unwrap();
        assert_eq!(p.tokens, vec!["hello"]);
        assert_eq!(p.options.get("name").unwrap().as_str(), Some("Alice"));
    }

    #[test]
    fn boolean_presence_true() {
        let p = parse(&toks("x -f"), &schema(), true, false).unwrap();
        assert_eq!(p.options.get("force").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn boolean_negation() {
        let p = parse(&toks("x --no-force"), &schema(), true, false).unwrap();
        assert_eq!(p.options.get("force").unwrap().as_bool(), Some(false));
    }

    #[test]
    fn numeric_rejects_non_numeric() {
        let err = parse(&toks("x --port abc"), &schema(), true, false).unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn array_accumulates_and_splits_commas() {
        let p = parse(
            &toks("x --tags a,b --tags c"),
            &schema(),
            true,
            false,
        )
        .unwrap();
        assert_eq!(
            p.options.get("tags").unwrap().as_array_str(),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()].as_slice())
        );
    }

    #[test]
    fn unknown_flag_errors_by_default() {
        let err = parse(&toks("x --bogus"), &schema(), true, false).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("bogus")
            || err.to_string().to_lowercase().contains("unrecognized")
            || err.to_string().to_lowercase().contains("unknown"));
    }

    #[test]
    fn unknown_flag_tolerated_when_allowed() {
        let p = parse(&toks("x --bogus"), &schema(), true, true).unwrap();
        assert!(p.tokens.contains(&"x".to_string()));
    }
}
