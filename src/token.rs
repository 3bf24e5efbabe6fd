/**
 * Split and join shell-like argument strings.
 *
 * `split_tokens` understands double-quoted spans (so a delimiter inside
 * quotes does not end the token) and the `\"` escape for a literal quote.
 * `join_tokens` is the approximate inverse: it re-quotes any token that
 * contains the delimiter.
 */
use std::borrow::Cow;

/**
 * Partition `s` on `delim`. A `"` that is not itself escaped opens a
 * quoted span that swallows further delimiters (and any nested
 * whitespace) until a matching unescaped `"` closes it. `\"` inside a
 * quoted span becomes a literal `"` in the resulting token. An unclosed
 * quote runs to the end of the string.
 */
pub fn split_tokens(s: &str, delim: char) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut have_cur = false;
    let mut in_quotes = false;
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '\\' && chars.peek() == Some(&'"') {
                cur.push('"');
                chars.next();
            } else if c == '"' {
                in_quotes = false;
            } else {
                cur.push(c);
            }
            continue;
        }

        if c == '"' {
            in_quotes = true;
            have_cur = true;
            continue;
        }

        if c == delim {
            if have_cur {
                tokens.push(std::mem::take(&mut cur));
                have_cur = false;
            }
            continue;
        }

        cur.push(c);
        have_cur = true;
    }

    if have_cur {
        tokens.push(cur);
    }

    tokens
}

/**
 * Anything that can be flattened into a list of tokens: a single string,
 * or any number of nested lists of strings.
 */
pub trait IntoTokens {
    fn into_tokens(self, out: &mut Vec<String>);
}

impl IntoTokens for &str {
    fn into_tokens(self, out: &mut Vec<String>) {
        out.push(self.to_string());
    }
}

impl IntoTokens for String {
    fn into_tokens(self, out: &mut Vec<String>) {
        out.push(self);
    }
}

impl<T: IntoTokens> IntoTokens for Vec<T> {
    fn into_tokens(self, out: &mut Vec<String>) {
        for t in self {
            t.into_tokens(out);
        }
    }
}

impl<T: IntoTokens + Clone> IntoTokens for &[T] {
    fn into_tokens(self, out: &mut Vec<String>) {
        for t in self {
            t.clone().into_tokens(out);
        }
    }
}

#[derive(Clone, Debug)]
pub struct JoinOptions {
    pub delimiter: char,
    pub wrap_in_quotes: bool,
}

impl Default for JoinOptions {
    fn default() -> JoinOptions {
        JoinOptions { delimiter: ' ', wrap_in_quotes: true }
    }
}

/**
 * Flatten `tokens`, drop empty strings, and join with `opts.delimiter`.
 * When more than one surviving token remains and `opts.wrap_in_quotes`
 * is set, any token containing the delimiter is wrapped in quotes with
 * inner quotes escaped.
 */
pub fn join_tokens(tokens: impl IntoTokens, opts: JoinOptions) -> String {
    let mut flat = Vec::new();
    tokens.into_tokens(&mut flat);
    flat.retain(|t| !t.is_empty());

    let needs_wrap = flat.len() > 1 && opts.wrap_in_quotes;

    flat.iter()
        .map(|t| -> Cow<str> {
            if needs_wrap && t.contains(opts.delimiter) {
                Cow::Owned(format!("\"{}\"", t.replace('"', "\\\"")))
            } else {
                Cow::Borrowed(t.as_str())
            }
        })
        .collect::<Vec<_>>()
        .join(&opts.delimiter.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(split_tokens("", ' '), Vec::<String>::new());
    }

    #[test]
    fn basic_split() {
        assert_eq!(
            split_tokens("hello --name Alice", ' '),
            vec!["hello", "--name", "Alice"]
        );
    }

    #[test]
    fn quoted_span_merges() {
        assert_eq!(
            split_tokens(r#"say "hello there" now"#, ' '),
            vec!["say", "hello there", "now"]
        );
    }

    #[test]
    fn escaped_quote_is_literal() {
        assert_eq!(
            split_tokens(r#"echo "she said \"hi\"""#, ' '),
            vec!["echo", r#"she said "hi""#]
        );
    }

    #[test]
    fn roundtrip_without_nested_quotes() {
        let s = "one two three";
        let tokens = split_tokens(s, ' ');
        assert_eq!(join_tokens(tokens, JoinOptions::default()), s);
    }

    #[test]
    fn join_wraps_tokens_with_delimiter() {
        let joined = join_tokens(
            vec!["a".to_string(), "b c".to_string()],
            JoinOptions::default(),
        );
        assert_eq!(joined, "a \"b c\"");
    }

    #[test]
    fn join_drops_empty_tokens() {
        let joined = join_tokens(
            vec!["a".to_string(), "".to_string(), "b".to_string()],
            JoinOptions::default(),
        );
        assert_eq!(joined, "a b");
    }

    #[test]
    fn join_flattens_nested_lists() {
        let nested =
            vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]];
        assert_eq!(join_tokens(nested, JoinOptions::default()), "a b c");
    }
}
