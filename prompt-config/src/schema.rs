//! Strongly typed configuration schemas.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;

use prompt_primitives::Message;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Prompt fragments configured per chat.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatPrompts {
    /// Base system prompt placed first in every request.
    pub base: String,
    /// Restriction text appended to the instruction block.
    #[serde(default)]
    pub restriction: String,
}

/// Per-chat model and budget settings.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    /// Prompt fragments.
    pub prompts: ChatPrompts,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Hard ceiling on prompt tokens.
    pub input_token_limit: usize,
    /// Maximum tokens the model may generate.
    pub output_token_limit: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl ChatSettings {
    /// Checks that the settings can drive a model call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the model is empty, either token
    /// limit is zero, or the temperature is outside `0.0..=2.0`.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model must not be empty"));
        }
        if self.input_token_limit == 0 {
            return Err(ConfigError::invalid("inputTokenLimit must be positive"));
        }
        if self.output_token_limit == 0 {
            return Err(ConfigError::invalid("outputTokenLimit must be positive"));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(format!(
                "temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Conversation state supplied with each invocation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Thread {
    /// Recent conversation turns, oldest first.
    pub history: Vec<Message>,
    /// Long-term memories, most relevant first.
    pub context: Vec<Message>,
    /// Free-form values available to the instruction template.
    pub values: HashMap<String, String>,
}

impl Thread {
    /// Creates a thread from history and context.
    #[must_use]
    pub fn new(history: Vec<Message>, context: Vec<Message>) -> Self {
        Self {
            history,
            context,
            values: HashMap::new(),
        }
    }

    /// Adds a template value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

/// String-keyed configuration carrying provider credentials.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct HookConfig(BTreeMap<String, String>);

impl HookConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from key/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Captures the listed environment variables that are set.
    #[must_use]
    pub fn from_env<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut config = Self::new();
        for key in keys {
            let key = key.as_ref();
            if let Ok(value) = env::var(key) {
                config.insert(key, value);
            } else {
                tracing::debug!(key, "environment variable not set");
            }
        }
        config
    }

    /// Sets a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a value when present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns a non-empty value or an error naming the key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if the key is absent or blank.
    pub fn require(&self, key: &str) -> ConfigResult<&str> {
        self.get(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: key.to_owned(),
            })
    }

    /// Returns the configured key names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for HookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|key| (key, "<redacted>")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChatSettings {
        ChatSettings {
            prompts: ChatPrompts {
                base: "You are helpful.".to_owned(),
                restriction: "Be brief.".to_owned(),
            },
            model: "gpt-4o-mini".to_owned(),
            input_token_limit: 4096,
            output_token_limit: 512,
            temperature: 0.7,
        }
    }

    #[test]
    fn parses_camel_case_settings() {
        let json = r#"{
            "prompts": { "base": "You are helpful.", "restriction": "Be brief." },
            "model": "gpt-4o-mini",
            "inputTokenLimit": 4096,
            "outputTokenLimit": 512,
            "temperature": 0.7
        }"#;
        let parsed: ChatSettings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, settings());
        parsed.validate().unwrap();
    }

    #[test]
    fn rejects_zero_input_limit() {
        let mut chat = settings();
        chat.input_token_limit = 0;
        assert!(matches!(chat.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut chat = settings();
        chat.temperature = 3.5;
        assert!(chat.validate().is_err());
        chat.temperature = f32::NAN;
        assert!(chat.validate().is_err());
    }

    #[test]
    fn thread_defaults_missing_sections() {
        let thread: Thread = serde_json::from_str(r#"{"history": []}"#).unwrap();
        assert!(thread.context.is_empty());
        assert!(thread.values.is_empty());
    }

    #[test]
    fn require_rejects_blank_values() {
        let config = HookConfig::from_pairs([("OPENAI_KEY", "  ")]);
        let err = config.require("OPENAI_KEY").expect_err("blank");
        assert!(matches!(err, ConfigError::MissingKey { key } if key == "OPENAI_KEY"));
    }

    #[test]
    fn debug_output_redacts_values() {
        let config = HookConfig::from_pairs([("OPENAI_KEY", "sk-secret")]);
        let rendered = format!("{config:?}");
        assert!(rendered.contains("OPENAI_KEY"));
        assert!(!rendered.contains("sk-secret"));
    }
}
