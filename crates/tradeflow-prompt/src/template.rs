//! MiniJinja-backed prompt template

use crate::{PromptError, Result};
use minijinja::{Environment, Value};
use serde::Serialize;

/// A named, versioned prompt template
///
/// The source uses standard Jinja2 syntax (`{{ var }}`, `{% if %}`,
/// `{% for %}`, builtin filters such as `upper` and `trim`). The source is
/// parsed once at construction so a broken template fails at startup rather
/// than mid-run.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    version: String,
    source: String,
}

/// Rendered prompt text plus the template version that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    pub text: String,
    pub version: String,
}

impl PromptTemplate {
    /// Create and validate a template
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self> {
        let template = Self {
            name: name.into(),
            version: version.into(),
            source: source.into(),
        };

        Environment::new()
            .template_from_str(&template.source)
            .map_err(|e| PromptError::TemplateParseFailed {
                name: template.name.clone(),
                detail: e.to_string(),
            })?;

        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Raw template source
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render with variables
    pub fn render<S: Serialize>(&self, vars: &S) -> Result<RenderedPrompt> {
        let env = Environment::new();
        let text = env
            .render_str(&self.source, Value::from_serialize(vars))
            .map_err(|e| PromptError::RenderError {
                name: self.name.clone(),
                detail: e.to_string(),
            })?;

        Ok(RenderedPrompt {
            text,
            version: self.version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_with_conditionals_and_loops() {
        let template = PromptTemplate::new(
            "bull",
            "v1",
            "Argue for {{ ticker | upper }}.{% if history %} Rebut: {% for h in history %}[{{ h }}]{% endfor %}{% endif %}",
        )
        .unwrap();

        let first = template.render(&json!({ "ticker": "aapl", "history": [] })).unwrap();
        assert_eq!(first.text, "Argue for AAPL.");

        let later = template
            .render(&json!({ "ticker": "aapl", "history": ["bear-1"] }))
            .unwrap();
        assert_eq!(later.text, "Argue for AAPL. Rebut: [bear-1]");
        assert_eq!(later.version, "v1");
    }

    #[test]
    fn test_invalid_template_is_rejected_at_construction() {
        let err = PromptTemplate::new("broken", "v1", "{% if x %}unclosed").unwrap_err();
        assert!(matches!(err, PromptError::TemplateParseFailed { .. }));
    }
}
