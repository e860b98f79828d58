//! Prompt templates with `{{variable}}` substitution.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A variable referenced by the template was not provided.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// The template text is unusable.
    #[error("template rendering failed: {reason}")]
    RenderError {
        /// Reason for the failure.
        reason: String,
    },
}

/// A prompt template with variable substitution.
///
/// Placeholders use `{{name}}`; whitespace inside the braces is ignored.
/// Substitution is a single pass, so placeholder syntax inside a substituted
/// value is emitted literally rather than expanded again.
///
/// Non-strict templates only fail for variables declared required and render
/// every other unresolved placeholder as an empty string. Strict templates
/// fail for any unresolved placeholder.
///
/// # Examples
///
/// ```
/// use prompt_compose::template::PromptTemplate;
///
/// let template = PromptTemplate::builder("You are {{role}}. {{task}}")
///     .with_variable("role", "a helpful assistant")
///     .with_variable("task", "Answer questions concisely.")
///     .build()
///     .unwrap();
///
/// let rendered = template.render().unwrap();
/// assert!(rendered.contains("helpful assistant"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    variables: HashMap<String, String>,
    required_variables: Vec<String>,
    #[serde(default)]
    strict: bool,
}

impl PromptTemplate {
    /// Creates a new non-strict template with the supplied text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: HashMap::new(),
            required_variables: Vec::new(),
            strict: false,
        }
    }

    /// Creates a strict template with the supplied text.
    #[must_use]
    pub fn strict(template: impl Into<String>) -> Self {
        Self {
            strict: true,
            ..Self::new(template)
        }
    }

    /// Returns a builder for constructing templates.
    #[must_use]
    pub fn builder(template: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder::new(template)
    }

    /// Sets a default variable value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Renders the template with its default variables.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a variable cannot be resolved.
    pub fn render(&self) -> TemplateResult<String> {
        self.render_with(&HashMap::new())
    }

    /// Renders the template with additional runtime variables.
    ///
    /// Runtime variables override template defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a variable cannot be resolved.
    pub fn render_with(&self, runtime_vars: &HashMap<String, String>) -> TemplateResult<String> {
        for name in &self.required_variables {
            if !runtime_vars.contains_key(name) && !self.variables.contains_key(name) {
                return Err(TemplateError::MissingVariable { name: name.clone() });
            }
        }

        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find("{{") {
            rendered.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                rendered.push_str(&rest[open..]);
                return Ok(rendered);
            };

            let name = after_open[..close].trim();
            if name.is_empty() {
                rendered.push_str(&rest[open..open + 2 + close + 2]);
            } else if let Some(value) = runtime_vars
                .get(name)
                .or_else(|| self.variables.get(name))
            {
                rendered.push_str(value);
            } else if self.strict {
                return Err(TemplateError::MissingVariable {
                    name: name.to_owned(),
                });
            }
            rest = &after_open[close + 2..];
        }

        rendered.push_str(rest);
        Ok(rendered)
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns whether every placeholder must resolve.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template)
    }
}

/// Builder for constructing prompt templates.
pub struct TemplateBuilder {
    template: String,
    variables: HashMap<String, String>,
    required_variables: Vec<String>,
    strict: bool,
}

impl TemplateBuilder {
    /// Creates a new builder with the supplied template text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: HashMap::new(),
            required_variables: Vec::new(),
            strict: false,
        }
    }

    /// Sets a variable with a default value.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Declares a required variable (must be provided at render time).
    #[must_use]
    pub fn with_required_variable(mut self, name: impl Into<String>) -> Self {
        self.required_variables.push(name.into());
        self
    }

    /// Makes every referenced placeholder required.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Builds the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::RenderError`] if a placeholder is opened but
    /// never closed.
    pub fn build(self) -> TemplateResult<PromptTemplate> {
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find("{{") {
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                return Err(TemplateError::RenderError {
                    reason: format!("unclosed placeholder at `{}`", &rest[open..]),
                });
            };
            rest = &after_open[close + 2..];
        }

        Ok(PromptTemplate {
            template: self.template,
            variables: self.variables,
            required_variables: self.required_variables,
            strict: self.strict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn renders_simple_template() {
        let template = PromptTemplate::builder("Hello {{name}}!")
            .with_variable("name", "World")
            .build()
            .unwrap();

        assert_eq!(template.render().unwrap(), "Hello World!");
    }

    #[test]
    fn runtime_variables_override_defaults() {
        let template = PromptTemplate::builder("Hello {{name}}!")
            .with_variable("name", "World")
            .build()
            .unwrap();

        let rendered = template.render_with(&vars(&[("name", "Alice")])).unwrap();
        assert_eq!(rendered, "Hello Alice!");
    }

    #[test]
    fn required_variables_error_when_missing() {
        let template = PromptTemplate::builder("Hello {{name}}!")
            .with_required_variable("name")
            .build()
            .unwrap();

        let err = template.render().expect_err("should error");
        assert!(matches!(err, TemplateError::MissingVariable { name } if name == "name"));
    }

    #[test]
    fn lenient_templates_render_unknown_placeholders_empty() {
        let template = PromptTemplate::new("a{{unknown}}b");
        assert_eq!(template.render().unwrap(), "ab");
    }

    #[test]
    fn strict_templates_reject_unknown_placeholders() {
        let template = PromptTemplate::builder("{{input}} {{restriction}}")
            .strict()
            .build()
            .unwrap();

        let err = template
            .render_with(&vars(&[("input", "hi")]))
            .expect_err("restriction missing");
        assert!(matches!(err, TemplateError::MissingVariable { name } if name == "restriction"));
    }

    #[test]
    fn strict_constructor_matches_builder() {
        let built = PromptTemplate::builder("{{a}}").strict().build().unwrap();
        assert_eq!(PromptTemplate::strict("{{a}}"), built);
        assert!(built.is_strict());
    }

    #[test]
    fn whitespace_inside_braces_is_ignored() {
        let template = PromptTemplate::new("Hi {{ name }}.");
        assert_eq!(
            template.render_with(&vars(&[("name", "Bob")])).unwrap(),
            "Hi Bob."
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let template = PromptTemplate::new("<human>{{input}}</human> {{restriction}}");
        let rendered = template
            .render_with(&vars(&[("input", "{{restriction}}"), ("restriction", "R")]))
            .unwrap();
        assert_eq!(rendered, "<human>{{restriction}}</human> R");
    }

    #[test]
    fn literal_brackets_are_untouched() {
        let template = PromptTemplate::new("see [[CONTEXT]] and {single}");
        assert_eq!(template.render().unwrap(), "see [[CONTEXT]] and {single}");
    }

    #[test]
    fn build_rejects_unclosed_placeholder() {
        let err = PromptTemplate::builder("Hello {{name")
            .build()
            .expect_err("unclosed");
        assert!(matches!(err, TemplateError::RenderError { .. }));
    }

    #[test]
    fn mutable_template_updates() {
        let mut template = PromptTemplate::new("Hello {{name}}!");
        template.set_variable("name", "Bob");
        assert_eq!(template.render().unwrap(), "Hello Bob!");
    }
}
