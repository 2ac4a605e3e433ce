use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Variable bindings: each name maps to zero or more values.
pub type Vars = BTreeMap<String, Vec<String>>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(?:\$|\{([^}]*)\})").unwrap());

/// Text with `${name}` placeholders and `$$` escapes.
///
/// Resolution never mutates the template. A name bound to N values yields N
/// variants, and several placeholders in one template multiply left to right.
/// Unbound or empty-bound placeholders are removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn resolve(&self, vars: &Vars) -> Vec<String> {
        let mut out = Vec::new();
        expand(&self.text, vars, String::new(), &mut out);
        out
    }

    /// Names referenced by `${name}` tokens, ignoring `$$` escapes.
    pub fn variables(&self) -> BTreeSet<String> {
        PLACEHOLDER
            .captures_iter(&self.text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// The variable name when the whole template is exactly one `${name}`.
    pub fn sole_variable(&self) -> Option<&str> {
        let name = self.text.strip_prefix("${")?.strip_suffix('}')?;
        if name.contains('}') {
            return None;
        }
        Some(name)
    }

    pub fn is_literal(&self) -> bool {
        self.variables().is_empty()
    }
}

fn expand(mut rest: &str, vars: &Vars, mut prefix: String, out: &mut Vec<String>) {
    loop {
        let Some(pos) = rest.find('$') else {
            prefix.push_str(rest);
            out.push(prefix);
            return;
        };

        prefix.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('$') {
            prefix.push('$');
            rest = after;
            continue;
        }

        let Some(body) = tail.strip_prefix('{') else {
            prefix.push('$');
            rest = tail;
            continue;
        };

        let Some(end) = body.find('}') else {
            // unterminated token stays literal
            prefix.push_str("${");
            rest = body;
            continue;
        };

        let name = &body[..end];
        let after = &body[end + 1..];

        match vars.get(name).filter(|values| !values.is_empty()) {
            None => rest = after,
            Some(values) => {
                for value in values {
                    let mut variant = prefix.clone();
                    variant.push_str(value);
                    expand(after, vars, variant, out);
                }
                return;
            }
        }
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Builds a [`Vars`] map from `(name, values)` pairs.
pub fn vars<I, K, V>(pairs: I) -> Vars
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
        .collect()
}
