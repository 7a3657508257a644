//! Named view templates for interstitials whose content is a view reference.

use std::collections::HashMap;

/// Simple template registry using `{{variable}}` syntax.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Replace every `{{key}}` (whitespace inside the braces allowed) with the
/// matching value. Strings are inserted raw, other JSON values in their JSON
/// form. Unknown placeholders are left as written.
pub fn substitute(template: &str, variables: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            result.push_str(&rest[open..]);
            return result;
        };

        let key = after_open[..close].trim();
        match variables.get(key) {
            Some(serde_json::Value::String(s)) => result.push_str(s),
            Some(other) => result.push_str(&other.to_string()),
            None => result.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }

    result.push_str(rest);
    result
}
