//! Prompt catalog

use crate::{PromptError, PromptTemplate, RenderedPrompt, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Immutable `name -> template` catalog
///
/// Built once per process; lookups never lock.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    templates: BTreeMap<String, PromptTemplate>,
}

impl PromptCatalog {
    pub fn builder() -> PromptCatalogBuilder {
        PromptCatalogBuilder::default()
    }

    /// Get a template by name
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Check if a template is registered
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Version label of a template
    pub fn version(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(PromptTemplate::version)
    }

    /// Render a registered template
    pub fn render<S: Serialize>(&self, name: &str, vars: &S) -> Result<RenderedPrompt> {
        self.templates
            .get(name)
            .ok_or_else(|| PromptError::TemplateNotRegistered(name.to_string()))?
            .render(vars)
    }

    /// Registered template names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Builder for [`PromptCatalog`]
#[derive(Debug, Default)]
pub struct PromptCatalogBuilder {
    templates: BTreeMap<String, PromptTemplate>,
}

impl PromptCatalogBuilder {
    /// Add a template, replacing any template with the same name
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.templates.insert(template.name().to_string(), template);
        self
    }

    /// Add several templates
    pub fn templates(self, templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        templates.into_iter().fold(self, Self::template)
    }

    pub fn build(self) -> PromptCatalog {
        PromptCatalog {
            templates: self.templates,
        }
    }
}
