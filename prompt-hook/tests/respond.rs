use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use prompt_adapters::traits::{
    AdapterError, AdapterMetadata, AdapterResult, CompletionRequest, CompletionStreamer,
    EventStream, ResponseEvent,
};
use prompt_compose::{
    ComposeError, CompositionPolicy, EstimateResult, PromptCompositor, PromptTemplate,
    TokenEstimator,
};
use prompt_config::{ChatPrompts, ChatSettings, HookConfig, Thread};
use prompt_hook::{ChatHook, DEFAULT_CREDENTIAL_KEY, HookError};
use prompt_primitives::Message;
use tokio::sync::{mpsc, oneshot};

/// Replays a fixed script and records every request it receives.
struct ScriptedStreamer {
    metadata: AdapterMetadata,
    script: Vec<AdapterResult<ResponseEvent>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedStreamer {
    fn new(script: Vec<AdapterResult<ResponseEvent>>) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "memory"),
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> CompletionRequest {
        self.last_request
            .lock()
            .unwrap()
            .clone()
            .expect("streamer was called")
    }
}

#[async_trait]
impl CompletionStreamer for ScriptedStreamer {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn stream(&self, request: CompletionRequest) -> AdapterResult<EventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        Ok(Box::pin(stream::iter(self.script.clone())))
    }
}

/// Fails before producing any event.
struct RejectingStreamer(AdapterMetadata);

#[async_trait]
impl CompletionStreamer for RejectingStreamer {
    fn metadata(&self) -> &AdapterMetadata {
        &self.0
    }

    async fn stream(&self, _request: CompletionRequest) -> AdapterResult<EventStream> {
        Err(AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        })
    }
}

/// Streams deltas from a background task until the consumer goes away.
struct EndlessStreamer {
    metadata: AdapterMetadata,
    stopped: Mutex<Option<oneshot::Sender<usize>>>,
}

#[async_trait]
impl CompletionStreamer for EndlessStreamer {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn stream(&self, _request: CompletionRequest) -> AdapterResult<EventStream> {
        let (tx, rx) = mpsc::channel(1);
        let stopped = self.stopped.lock().unwrap().take();
        tokio::spawn(async move {
            let mut sent = 0;
            while tx.send(Ok(ResponseEvent::delta("tick"))).await.is_ok() {
                sent += 1;
            }
            if let Some(stopped) = stopped {
                let _ = stopped.send(sent);
            }
        });
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

/// One token per byte, no framing.
struct ByteEstimator;

impl TokenEstimator for ByteEstimator {
    fn estimate_text(&self, text: &str) -> EstimateResult<usize> {
        Ok(text.len())
    }
}

fn chat(base: &str, limit: usize) -> ChatSettings {
    ChatSettings {
        prompts: ChatPrompts {
            base: base.to_owned(),
            restriction: "Answer briefly.".to_owned(),
        },
        model: "gpt-4o-mini".to_owned(),
        input_token_limit: limit,
        output_token_limit: 512,
        temperature: 0.7,
    }
}

fn credentials() -> HookConfig {
    HookConfig::from_pairs([(DEFAULT_CREDENTIAL_KEY, "sk-integration")])
}

fn thread() -> Thread {
    Thread::new(
        vec![
            Message::user("What is a borrow?"),
            Message::assistant("A temporary reference."),
        ],
        vec![Message::system("The user is learning Rust.")],
    )
}

fn byte_hook(streamer: Arc<dyn CompletionStreamer>) -> ChatHook {
    let template = PromptTemplate::builder("{{input}}")
        .strict()
        .build()
        .unwrap();
    ChatHook::new(streamer).with_compositor(
        PromptCompositor::new(Arc::new(ByteEstimator))
            .with_policy(CompositionPolicy::default().with_instruction(template)),
    )
}

#[tokio::test]
async fn relays_events_unchanged() {
    let script = vec![
        Ok(ResponseEvent::delta("Own")),
        Ok(ResponseEvent::delta("ership")),
        Ok(ResponseEvent::finished(Some("stop".to_owned()))),
    ];
    let streamer = ScriptedStreamer::new(script.clone());
    let hook = ChatHook::new(streamer.clone());

    let events: Vec<_> = hook
        .respond("Explain ownership", &credentials(), &chat("You teach Rust.", 4096), &thread())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events, script);
    assert_eq!(streamer.calls(), 1);
}

#[tokio::test]
async fn request_carries_composed_prompt_and_options() {
    let streamer = ScriptedStreamer::new(Vec::new());
    let hook = ChatHook::new(streamer.clone());
    let thread = thread();

    let _stream = hook
        .respond("Explain ownership", &credentials(), &chat("You teach Rust.", 4096), &thread)
        .await
        .unwrap();

    let request = streamer.last_request();
    let options = request.options();
    assert_eq!(options.model, "gpt-4o-mini");
    assert_eq!(options.api_key, "sk-integration");
    assert_eq!(options.max_tokens, 512);
    assert_eq!(options.max_prompt_tokens, 4096);
    assert!(options.stop.is_empty());

    let messages = request.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0], Message::system("You teach Rust."));
    assert_eq!(messages[1], thread.context[0]);
    assert_eq!(&messages[2..4], thread.history.as_slice());
    assert!(messages[4].content().contains("Explain ownership"));
    assert!(messages[4].content().ends_with("Answer briefly."));
}

#[tokio::test]
async fn budget_overflow_never_reaches_the_streamer() {
    let streamer = ScriptedStreamer::new(Vec::new());
    let hook = byte_hook(streamer.clone());
    let base: String = "b".repeat(70);
    let input: String = "i".repeat(40);

    let err = hook
        .respond(&input, &credentials(), &chat(&base, 100), &thread())
        .await
        .err()
        .expect("fixed messages exceed the limit");

    assert!(matches!(
        err,
        HookError::Compose(ComposeError::BudgetExceeded {
            required: 110,
            available: 60,
            limit: 100,
        })
    ));
    assert_eq!(streamer.calls(), 0);
}

#[tokio::test]
async fn render_failure_never_reaches_the_streamer() {
    let streamer = ScriptedStreamer::new(Vec::new());
    let template = PromptTemplate::strict("{{input}} in {{language}}");
    let hook = ChatHook::new(streamer.clone()).with_compositor(
        PromptCompositor::default()
            .with_policy(CompositionPolicy::default().with_instruction(template)),
    );

    let err = hook
        .respond("Explain traits", &credentials(), &chat("base", 4096), &Thread::default())
        .await
        .err()
        .expect("unresolved placeholder");

    assert!(matches!(err, HookError::Compose(ComposeError::Render(_))));
    assert_eq!(streamer.calls(), 0);
}

#[tokio::test]
async fn missing_credential_is_reported() {
    let streamer = ScriptedStreamer::new(Vec::new());
    let hook = ChatHook::new(streamer.clone());

    let err = hook
        .respond("hi", &HookConfig::new(), &chat("base", 4096), &thread())
        .await
        .err()
        .expect("no key configured");

    assert!(matches!(err, HookError::MissingCredential { ref key } if key == "OPENAI_KEY"));
    assert_eq!(streamer.calls(), 0);
}

#[tokio::test]
async fn streamer_rejection_is_returned_directly() {
    let hook = ChatHook::new(Arc::new(RejectingStreamer(AdapterMetadata::new(
        "rejecting",
        "memory",
    ))));

    let err = hook
        .respond("hi", &credentials(), &chat("base", 4096), &thread())
        .await
        .err()
        .expect("streamer refuses");

    assert!(matches!(
        err,
        HookError::Streamer(AdapterError::RateLimited {
            retry_after: Some(delay),
        }) if delay == Duration::from_secs(2)
    ));
}

#[tokio::test]
async fn mid_stream_failure_arrives_as_an_item() {
    let streamer = ScriptedStreamer::new(vec![
        Ok(ResponseEvent::delta("partial")),
        Err(AdapterError::transport("connection reset")),
    ]);
    let hook = ChatHook::new(streamer);

    let mut stream = hook
        .respond("hi", &credentials(), &chat("base", 4096), &thread())
        .await
        .unwrap();

    assert_eq!(
        stream.next().await,
        Some(Ok(ResponseEvent::delta("partial")))
    );
    assert!(matches!(
        stream.next().await,
        Some(Err(AdapterError::Transport { .. }))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_stream_stops_the_producer() {
    let (stopped_tx, stopped_rx) = oneshot::channel();
    let hook = ChatHook::new(Arc::new(EndlessStreamer {
        metadata: AdapterMetadata::new("endless", "memory"),
        stopped: Mutex::new(Some(stopped_tx)),
    }));

    let mut stream = hook
        .respond("hi", &credentials(), &chat("base", 4096), &thread())
        .await
        .unwrap();
    assert_eq!(stream.next().await, Some(Ok(ResponseEvent::delta("tick"))));
    drop(stream);

    let sent = tokio::time::timeout(Duration::from_secs(5), stopped_rx)
        .await
        .expect("producer observed cancellation")
        .expect("producer reported");
    assert!(sent >= 1);
}

#[tokio::test]
async fn responses_are_independent_across_invocations() {
    let streamer = ScriptedStreamer::new(vec![Ok(ResponseEvent::finished(None))]);
    let hook = ChatHook::new(streamer.clone());
    let chat = chat("base", 4096);

    let first = hook
        .respond("same input", &credentials(), &chat, &thread())
        .await
        .unwrap();
    let first_request = streamer.last_request();
    drop(first);

    let _second = hook
        .respond("same input", &credentials(), &chat, &thread())
        .await
        .unwrap();
    assert_eq!(streamer.last_request(), first_request);
    assert_eq!(streamer.calls(), 2);
}

#[tokio::test]
async fn nul_characters_reach_the_streamer_verbatim() {
    let streamer = ScriptedStreamer::new(vec![Ok(ResponseEvent::finished(None))]);
    let hook = ChatHook::new(streamer.clone());

    let _stream = hook
        .respond("C strings end in \0", &credentials(), &chat("base", 4096), &thread())
        .await
        .unwrap();

    let request = streamer.last_request();
    let instruction = request.messages().last().expect("instruction block");
    assert!(instruction.content().contains("C strings end in \0"));
}
