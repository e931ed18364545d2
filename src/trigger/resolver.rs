//! `%NAME%` token resolution for trigger attributes.

use std::collections::HashMap;

/// Looks up values for `%NAME%` tokens.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;

    /// Replace every `%NAME%` token in `value` with its resolved value.
    ///
    /// Unknown tokens and unpaired `%` are left as written.
    fn resolve_whole_string(&self, value: &str) -> String {
        let mut resolved = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find('%') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('%') else {
                break;
            };
            let name = &after[..end];
            resolved.push_str(&rest[..start]);
            match self.resolve(name) {
                Some(replacement) if !name.is_empty() => {
                    resolved.push_str(&replacement);
                    rest = &after[end + 1..];
                }
                _ => {
                    resolved.push('%');
                    rest = after;
                }
            }
        }
        resolved.push_str(rest);
        resolved
    }
}

/// Resolves tokens from process environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvNameResolver;

impl NameResolver for EnvNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Resolves tokens from a fixed map.
#[derive(Debug, Default, Clone)]
pub struct MapNameResolver {
    values: HashMap<String, String>,
}

impl MapNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapNameResolver {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl NameResolver for MapNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}
