use indexmap::IndexMap;

use crate::template::Vars;

pub const TRUE: &str = "true";
pub const FALSE: &str = "false";

/// Flags whose names start with this marker are internal and never forwarded.
pub const RESERVED_PREFIX: char = '~';

/// Forces the self-freshness decision when present.
pub const FRESH_OVERRIDE: &str = "~FRESH";

/// Deletes the `.old` binary backup after a successful rebuild and rerun.
pub const REMOVE_OLD: &str = "~RMOLD";

/// `name=value` settings parsed from command-line words, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    values: IndexMap<String, String>,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name=value`, bare `name` (true) and `-name` (false).
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::new();
        flags.extend_from_args(args);
        flags
    }

    pub fn extend_from_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let arg = arg.as_ref();
            if arg.is_empty() {
                continue;
            }

            if let Some((name, value)) = arg.split_once('=') {
                self.set(name, value);
            } else if let Some(name) = arg.strip_prefix('-') {
                self.set(name, FALSE);
            } else {
                self.set(arg, TRUE);
            }
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// `None` when unset, otherwise whether the value reads as true.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(is_truthy)
    }

    pub fn is_true(&self, name: &str) -> bool {
        self.get_bool(name).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `name=value` words for every non-reserved flag.
    pub fn forwarded(&self) -> Vec<String> {
        self.iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }

    /// Non-reserved flags as template bindings; values split on whitespace.
    pub fn to_vars(&self) -> Vars {
        self.iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.split_whitespace().map(str::to_string).collect(),
                )
            })
            .collect()
    }
}

pub fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let flags = Flags::parse(["foo=bar", "baz", "-qux"]);
        assert_eq!(flags.get("foo"), Some("bar"));
        assert_eq!(flags.get_bool("baz"), Some(true));
        assert_eq!(flags.get_bool("qux"), Some(false));
        assert_eq!(flags.get("missing"), None);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let flags = Flags::parse(["cflags=-DX=1"]);
        assert_eq!(flags.get("cflags"), Some("-DX=1"));
    }

    #[test]
    fn test_forwarded_skips_reserved() {
        let flags = Flags::parse(["~FRESH=false", "cc=clang", "app"]);
        assert_eq!(flags.forwarded(), vec!["cc=clang", "app=true"]);
    }

    #[test]
    fn test_vars_split_words() {
        let flags = Flags::parse(["cflags=-O2  -Wall", "empty=", "~x=1"]);
        let vars = flags.to_vars();
        assert_eq!(vars["cflags"], vec!["-O2", "-Wall"]);
        assert!(vars["empty"].is_empty());
        assert!(!vars.contains_key("~x"));
    }
}
