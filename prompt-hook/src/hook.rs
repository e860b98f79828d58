//! The chat hook: compose, resolve the credential, stream.

use std::fmt;
use std::sync::Arc;

use prompt_adapters::openai::{OpenAiConfig, OpenAiStreamer};
use prompt_adapters::traits::{CompletionRequest, CompletionStreamer, EventStream, StreamOptions};
use prompt_compose::PromptCompositor;
use prompt_config::{ChatSettings, HookConfig, Thread};
use prompt_primitives::InvocationId;
use prompt_telemetry::invocation_span;
use tracing::{Instrument, debug, warn};

use crate::error::{HookError, HookResult};

/// Configuration key holding the provider credential unless overridden.
pub const DEFAULT_CREDENTIAL_KEY: &str = "OPENAI_KEY";

/// Composes prompts and relays streamed completions for a chat.
#[derive(Clone)]
pub struct ChatHook {
    compositor: PromptCompositor,
    streamer: Arc<dyn CompletionStreamer>,
    credential_key: String,
}

impl fmt::Debug for ChatHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatHook")
            .field("compositor", &self.compositor)
            .field("provider", &self.streamer.metadata().provider())
            .field("credential_key", &self.credential_key)
            .finish()
    }
}

impl ChatHook {
    /// Creates a hook around `streamer` with the default compositor.
    #[must_use]
    pub fn new(streamer: Arc<dyn CompletionStreamer>) -> Self {
        Self {
            compositor: PromptCompositor::default(),
            streamer,
            credential_key: DEFAULT_CREDENTIAL_KEY.to_owned(),
        }
    }

    /// Creates a hook backed by the `OpenAI` streamer.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Streamer`] when the endpoint configuration is invalid.
    pub fn openai(config: OpenAiConfig) -> HookResult<Self> {
        Ok(Self::new(Arc::new(OpenAiStreamer::new(config)?)))
    }

    /// Replaces the compositor.
    #[must_use]
    pub fn with_compositor(mut self, compositor: PromptCompositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Changes which configuration key holds the credential.
    #[must_use]
    pub fn with_credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    /// Returns the compositor.
    #[must_use]
    pub const fn compositor(&self) -> &PromptCompositor {
        &self.compositor
    }

    /// Returns the credential key.
    #[must_use]
    pub fn credential_key(&self) -> &str {
        &self.credential_key
    }

    /// Builds the completion request without contacting the provider.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Config`] for invalid chat settings,
    /// [`HookError::Compose`] when the prompt cannot be composed, and
    /// [`HookError::MissingCredential`] when the credential is absent.
    pub fn prepare(
        &self,
        input: &str,
        config: &HookConfig,
        chat: &ChatSettings,
        thread: &Thread,
    ) -> HookResult<CompletionRequest> {
        chat.validate()?;
        let prompt = self.compositor.compose(input, chat, thread)?;

        let api_key =
            config
                .require(&self.credential_key)
                .map_err(|_| HookError::MissingCredential {
                    key: self.credential_key.clone(),
                })?;

        let options = StreamOptions::new(chat.model.clone(), api_key)
            .with_max_tokens(chat.output_token_limit)
            .with_max_prompt_tokens(chat.input_token_limit)
            .with_temperature(chat.temperature)
            .with_stop(Vec::new());

        Ok(CompletionRequest::new(prompt.into_messages(), options)?)
    }

    /// Answers `input` with a streamed completion.
    ///
    /// Events are relayed unchanged and in order. Failures after the stream
    /// starts arrive as `Err` items; dropping the stream cancels the request.
    ///
    /// # Errors
    ///
    /// See [`ChatHook::prepare`]; additionally returns [`HookError::Streamer`]
    /// when the provider rejects the request before streaming.
    pub async fn respond(
        &self,
        input: &str,
        config: &HookConfig,
        chat: &ChatSettings,
        thread: &Thread,
    ) -> HookResult<EventStream> {
        let span = invocation_span(InvocationId::random(), &chat.model);
        async move {
            let request = match self.prepare(input, config, chat, thread) {
                Ok(request) => request,
                Err(err) => {
                    warn!(error = %err, "completion not attempted");
                    return Err(err);
                }
            };

            debug!(
                provider = self.streamer.metadata().provider(),
                messages = request.messages().len(),
                "dispatching completion"
            );
            self.streamer.stream(request).await.map_err(|err| {
                warn!(error = %err, "streamer failed to start");
                HookError::from(err)
            })
        }
        .instrument(span)
        .await
    }
}
