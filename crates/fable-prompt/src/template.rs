use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-\.]+)\s*\}\}").expect("variable pattern is valid")
});

/// User-defined `{{name}}` substitutions applied to every outbound text part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalVariables(BTreeMap<String, String>);

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let _ = self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Substitute global variables only; anything unknown stays as written.
    pub fn apply(&self, text: &str) -> String {
        if self.0.is_empty() || !text.contains("{{") {
            return text.to_string();
        }
        VARIABLE
            .replace_all(text, |caps: &Captures<'_>| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl From<BTreeMap<String, String>> for GlobalVariables {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Fill a template in a single pass. Caller data (dotted paths into a JSON
/// object) wins over global variables; unknown placeholders are left in place.
/// Substituted values are not scanned again.
pub fn render(template: &str, data: &Value, globals: &GlobalVariables) -> String {
    VARIABLE
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            if let Some(value) = lookup(data, name) {
                return value_to_text(value);
            }
            match globals.get(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup<'v>(data: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(data, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
