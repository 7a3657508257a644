//! Turns an interstitial's content descriptor into displayable markup.

use interlude_core::templates::{substitute, TemplateRegistry};
use interlude_core::types::ContentType;
use interlude_core::{Interstitial, InterludeResult};

/// Host-supplied renderer. The engine treats the output as opaque.
pub trait ContentRenderer: Send + Sync {
    fn render(
        &self,
        interstitial: &Interstitial,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> InterludeResult<String>;
}

/// Renders stored bodies and registered view templates with `{{key}}`
/// substitution. The interstitial's own name, title and uuid are always
/// available; caller data overrides them.
#[derive(Debug, Clone, Default)]
pub struct StoredContentRenderer {
    templates: TemplateRegistry,
}

impl StoredContentRenderer {
    pub fn new(templates: TemplateRegistry) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    fn variables(
        interstitial: &Interstitial,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut vars = serde_json::Map::new();
        vars.insert("name".into(), interstitial.name.clone().into());
        vars.insert("title".into(), interstitial.title.clone().into());
        vars.insert("uuid".into(), interstitial.uuid.to_string().into());
        vars.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    fn render_view(&self, view: &str, vars: &serde_json::Map<String, serde_json::Value>) -> String {
        match self.templates.get(view) {
            Some(body) => substitute(body, vars),
            None => format!("<!-- View '{view}' not found -->"),
        }
    }

    fn render_stored(interstitial: &Interstitial, vars: &serde_json::Map<String, serde_json::Value>) -> String {
        let body = interstitial.content.as_deref().unwrap_or_default();
        if body.contains("{{") {
            substitute(body, vars)
        } else {
            body.to_string()
        }
    }
}

impl ContentRenderer for StoredContentRenderer {
    fn render(
        &self,
        interstitial: &Interstitial,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> InterludeResult<String> {
        let vars = Self::variables(interstitial, data);
        let view = interstitial.view_name.as_deref().filter(|v| !v.is_empty());

        let html = match interstitial.content_type {
            ContentType::ViewReference => match view {
                Some(view) => self.render_view(view, &vars),
                None => String::new(),
            },
            ContentType::Stored => Self::render_stored(interstitial, &vars),
            // A form uses its own view when one is registered, else the stored markup.
            ContentType::Form => match view.filter(|v| self.templates.contains(v)) {
                Some(view) => self.render_view(view, &vars),
                None => Self::render_stored(interstitial, &vars),
            },
        };
        Ok(html)
    }
}
