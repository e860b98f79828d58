//! Streaming `OpenAI` chat completions.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use futures::stream;
use hyper::body::{HttpBody, to_bytes};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Body, Request, Response, StatusCode, Uri};
use prompt_primitives::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::http_client::{HyperClient, build_https_client};
use crate::sse::SseDecoder;
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, CompletionRequest, CompletionStreamer,
    EventStream, ResponseEvent,
};

/// Environment variable overriding the API base URL.
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/";
const DONE_SENTINEL: &str = "[DONE]";
const EVENT_BUFFER: usize = 64;

/// Configuration for the `OpenAI` streamer.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiConfig {
    /// Creates a configuration targeting the public API.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the base URL from `OPENAI_BASE_URL` when set.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the variable holds an invalid URL.
    pub fn from_env() -> AdapterResult<Self> {
        match env::var(OPENAI_BASE_URL_ENV) {
            Ok(url) => Self::new().with_base_url(url),
            Err(_) => Ok(Self::new()),
        }
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the TCP connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how long to wait for response headers.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the longest silence tolerated between streamed chunks.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Streams chat completions from the `OpenAI` API (or a compatible server).
pub struct OpenAiStreamer {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl fmt::Debug for OpenAiStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiStreamer")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiStreamer {
    /// Constructs a streamer with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let endpoint_text = format!("{}v1/chat/completions", config.base_url);
        let endpoint = endpoint_text.parse::<Uri>().map_err(|err| {
            AdapterError::configuration(format!("invalid OpenAI endpoint: {err}"))
        })?;

        Ok(Self {
            client: build_https_client(config.connect_timeout),
            endpoint,
            metadata: AdapterMetadata::new("openai", endpoint_text),
            request_timeout: config.request_timeout,
            idle_timeout: config.idle_timeout,
        })
    }

    fn build_request(request: &CompletionRequest) -> ChatCompletionRequest {
        let options = request.options();
        ChatCompletionRequest {
            model: options.model.clone(),
            messages: request.messages().iter().map(map_message).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop: options.stop.clone(),
            stream: true,
        }
    }
}

#[async_trait]
impl CompletionStreamer for OpenAiStreamer {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn stream(&self, request: CompletionRequest) -> AdapterResult<EventStream> {
        let payload = Self::build_request(&request);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode OpenAI request: {err}"))
        })?;

        debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            max_tokens = payload.max_tokens,
            max_prompt_tokens = request.options().max_prompt_tokens,
            "starting OpenAI completion stream"
        );

        let http_request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .header(
                AUTHORIZATION,
                format!("Bearer {}", request.options().api_key),
            )
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build OpenAI request: {err}"))
            })?;

        let response = timeout(self.request_timeout, self.client.request(http_request))
            .await
            .map_err(|_| AdapterError::transport("OpenAI request timed out"))?
            .map_err(|err| AdapterError::transport(format!("OpenAI request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(pump(response.into_body(), tx, self.idle_timeout));

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

type EventSender = mpsc::Sender<AdapterResult<ResponseEvent>>;

/// Reads the SSE body and forwards decoded events until the provider is done,
/// an error occurs, or the consumer drops the stream.
async fn pump(mut body: Body, tx: EventSender, idle_timeout: Duration) {
    let mut decoder = SseDecoder::new();
    let mut finished = false;

    loop {
        let next = tokio::select! {
            () = tx.closed() => {
                debug!("completion stream dropped by consumer; closing connection");
                return;
            }
            next = timeout(idle_timeout, body.data()) => next,
        };

        let chunk = match next {
            Err(_) => {
                let _ = tx
                    .send(Err(AdapterError::transport("OpenAI stream idle timeout")))
                    .await;
                return;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                let _ = tx
                    .send(Err(AdapterError::transport(format!(
                        "OpenAI stream interrupted: {err}"
                    ))))
                    .await;
                return;
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        for event in decoder.push(&chunk) {
            match forward(&tx, &event.data, &mut finished).await {
                Flow::Continue => {}
                Flow::Stop => return,
            }
        }
    }

    if let Some(event) = decoder.finish() {
        if let Flow::Stop = forward(&tx, &event.data, &mut finished).await {
            return;
        }
    }

    if !finished {
        warn!("OpenAI stream ended without a finish marker");
        let _ = tx
            .send(Err(AdapterError::transport(
                "OpenAI stream ended before completion",
            )))
            .await;
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn forward(tx: &EventSender, data: &str, finished: &mut bool) -> Flow {
    if data.trim() == DONE_SENTINEL {
        if !*finished {
            let _ = tx.send(Ok(ResponseEvent::finished(None))).await;
            *finished = true;
        }
        return Flow::Stop;
    }

    let events = match decode_chunk(data) {
        Ok(events) => events,
        Err(err) => {
            let _ = tx.send(Err(err)).await;
            return Flow::Stop;
        }
    };

    for event in events {
        if event.is_finished() {
            if *finished {
                continue;
            }
            *finished = true;
        }
        if tx.send(Ok(event)).await.is_err() {
            return Flow::Stop;
        }
    }
    Flow::Continue
}

/// Decodes one SSE `data` payload into response events.
fn decode_chunk(data: &str) -> AdapterResult<Vec<ResponseEvent>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|err| {
        AdapterError::response(format!("failed to decode OpenAI stream chunk: {err}"))
    })?;

    if let Some(error) = chunk.error {
        return Err(AdapterError::response(error.message));
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.and_then(|delta| delta.content) {
            if !content.is_empty() {
                events.push(ResponseEvent::delta(content));
            }
        }
        if let Some(reason) = choice.finish_reason {
            events.push(ResponseEvent::finished(Some(reason)));
        }
    }
    Ok(events)
}

async fn status_error(response: Response<Body>) -> AdapterError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let reason = match to_bytes(response.into_body()).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(err) => format!("<unreadable body: {err}>"),
    };

    warn!(%status, "OpenAI rejected completion request");
    match status {
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterError::Authentication {
            reason: format!("OpenAI returned {status}: {reason}"),
        },
        _ => AdapterError::response(format!("OpenAI returned {status}: {reason}")),
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

fn map_message(message: &Message) -> OpenAiMessage {
    OpenAiMessage {
        role: message.role().as_str(),
        content: message.content().to_owned(),
    }
}

fn sanitize_base_url(input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(
            "OpenAI base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid OpenAI base URL: {err}")))?;
    Ok(base)
}
