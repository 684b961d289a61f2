//! Streaming chat completions.
//!
//! A chat call POSTs the message list and consumes the SSE response through
//! [`StreamReader`]. Every `data` line that carries a
//! `choices[0].delta.content` fragment grows the running text, and callers
//! receive the full text so far (partial markdown has to be re-rendered from
//! the start on every update).

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt as _, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::reader::{ReadOutcome, ReadStep, StreamReader};
use crate::sse::StreamEvent;

/// Header carrying the application id on every backend request.
pub const APP_ID_HEADER: &str = "X-App-Id";

const DONE_SENTINEL: &str = "[DONE]";

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static>>;

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message of the outbound conversation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(serde::Serialize)]
struct ChatRequestBody<'a> {
    messages: &'a [ChatMessage],
    enable_thinking: bool,
}

/// Running text of one streaming call.
///
/// Grows only by appending deltas in arrival order.
#[derive(Debug, Default)]
pub struct ContentAccumulator {
    content: String,
}

impl ContentAccumulator {
    /// Full text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    /// Parses one JSON line and appends its delta.
    ///
    /// Returns the new cumulative text when the line carried a non-empty
    /// delta. Unparsable lines are logged and skipped.
    pub fn ingest_line(&mut self, line: &str) -> Option<&str> {
        let line = line.trim();
        if line.is_empty() || line == DONE_SENTINEL {
            return None;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, line, "skipping unparsable SSE data line");
                return None;
            }
        };
        let delta = value
            .pointer("/choices/0/delta/content")
            .and_then(|v| v.as_str())
            .filter(|d| !d.is_empty())?;
        self.content.push_str(delta);
        Some(&self.content)
    }

    /// Ingests every line of an event payload and returns one snapshot of the
    /// full text per applied delta.
    ///
    /// A single `data` field may carry several JSON lines.
    pub fn ingest_event(&mut self, event: &StreamEvent) -> Vec<String> {
        if event.data.is_empty() {
            return Vec::new();
        }
        event
            .data
            .split('\n')
            .filter_map(|line| self.ingest_line(line).map(ToOwned::to_owned))
            .collect()
    }
}

/// Progress of one chat call.
///
/// Any number of `Update`s is followed by exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Full text so far, after a new delta.
    Update { content: String },
    /// Stream ended normally; the last `Update` holds the final text.
    Completed,
    /// Stream could not be established or broke; later events never follow.
    Failed(ClientError),
    /// The caller cancelled. Neither `Completed` nor `Failed` is emitted.
    Aborted,
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Update { .. })
    }
}

/// Client for the streaming chat endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ChatClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = config.http_client()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a pull-based stream of chat events for `messages`.
    ///
    /// Nothing is sent until the stream is first polled. Each poll issues at
    /// most one network read. Cancelling `cancel` ends the stream with
    /// [`ChatEvent::Aborted`].
    pub fn stream(
        &self,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> impl Stream<Item = ChatEvent> + Send + use<> {
        let stream_id = uuid::Uuid::new_v4();
        debug!(
            %stream_id,
            url = %self.config.chat_url,
            messages = messages.len(),
            "starting chat stream"
        );
        let request = self
            .http
            .post(&self.config.chat_url)
            .header(APP_ID_HEADER, &self.config.app_id)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&ChatRequestBody {
                messages,
                enable_thinking: false,
            });
        chat_event_stream(stream_id, request, cancel)
    }

    /// Starts a chat call and returns a handle for consuming it.
    pub fn start_stream(
        &self,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> ChatStream {
        ChatStream {
            inner: Box::pin(self.stream(messages, cancel.clone())),
            cancel,
            content: String::new(),
            saw_terminal: false,
        }
    }
}

/// Handle over a running chat call.
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = ChatEvent> + Send>>,
    cancel: CancellationToken,
    content: String,
    saw_terminal: bool,
}

impl ChatStream {
    /// Token that aborts this call when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests cancellation of the in-flight request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Text delivered by the most recent update.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        if self.saw_terminal {
            return None;
        }
        let event = self.inner.next().await;
        match &event {
            Some(ChatEvent::Update { content }) => self.content.clone_from(content),
            Some(_) => self.saw_terminal = true,
            None => {}
        }
        event
    }

    /// Drains the call and returns the final text.
    pub async fn finish(self) -> Result<String, ClientError> {
        self.finish_with(|_| {}).await
    }

    /// Drains the call, passing each full-text update to `on_update`.
    ///
    /// Aborts surface as [`ClientError::Cancelled`].
    pub async fn finish_with(
        mut self,
        mut on_update: impl FnMut(&str),
    ) -> Result<String, ClientError> {
        while let Some(event) = self.next_event().await {
            match event {
                ChatEvent::Update { .. } => on_update(&self.content),
                ChatEvent::Completed => return Ok(self.content),
                ChatEvent::Failed(err) => return Err(err),
                ChatEvent::Aborted => return Err(ClientError::Cancelled),
            }
        }
        Err(ClientError::protocol("chat stream ended without a terminal event"))
    }
}

enum Phase {
    Connect(reqwest::RequestBuilder),
    Reading(StreamReader<ByteStream>),
    Done,
}

struct ChatState {
    stream_id: uuid::Uuid,
    phase: Phase,
    cancel: CancellationToken,
    accumulator: ContentAccumulator,
    pending: VecDeque<ChatEvent>,
}

fn chat_event_stream(
    stream_id: uuid::Uuid,
    request: reqwest::RequestBuilder,
    cancel: CancellationToken,
) -> impl Stream<Item = ChatEvent> + Send + 'static {
    stream::unfold(
        ChatState {
            stream_id,
            phase: Phase::Connect(request),
            cancel,
            accumulator: ContentAccumulator::default(),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                match std::mem::replace(&mut state.phase, Phase::Done) {
                    Phase::Done => return None,
                    Phase::Connect(request) => match connect(request, &state.cancel).await {
                        Ok(reader) => state.phase = Phase::Reading(reader),
                        Err(terminal) => {
                            debug!(stream_id = %state.stream_id, ?terminal, "chat stream not established");
                            state.pending.push_back(terminal);
                        }
                    },
                    Phase::Reading(mut reader) => match reader.next_step().await {
                        Some(ReadStep::Events(events)) => {
                            for event in &events {
                                for content in state.accumulator.ingest_event(event) {
                                    state.pending.push_back(ChatEvent::Update { content });
                                }
                            }
                            state.phase = Phase::Reading(reader);
                        }
                        Some(ReadStep::Finished(outcome)) => {
                            debug!(
                                stream_id = %state.stream_id,
                                bytes = reader.bytes_read(),
                                chars = state.accumulator.content().chars().count(),
                                ?outcome,
                                "chat stream finished"
                            );
                            state.pending.push_back(match outcome {
                                ReadOutcome::Completed => ChatEvent::Completed,
                                ReadOutcome::Failed(err) => ChatEvent::Failed(err),
                                ReadOutcome::Aborted => ChatEvent::Aborted,
                            });
                        }
                        None => {}
                    },
                }
            }
        },
    )
}

async fn connect(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<StreamReader<ByteStream>, ChatEvent> {
    let sent = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        sent = request.send() => Some(sent),
    };
    let response = match sent {
        None => return Err(ChatEvent::Aborted),
        Some(Err(_)) if cancel.is_cancelled() => return Err(ChatEvent::Aborted),
        Some(Err(err)) => {
            return Err(ChatEvent::Failed(ClientError::transport("chat request", err)));
        }
        Some(Ok(response)) => response,
    };
    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatEvent::Aborted),
            text = response.text() => text.unwrap_or_else(|_| "<unreadable body>".to_string()),
        };
        return Err(ChatEvent::Failed(ClientError::Http {
            operation: "chat request",
            status: status.as_u16(),
            body,
        }));
    }
    let body: ByteStream = Box::pin(response.bytes_stream());
    Ok(StreamReader::new(body, cancel.clone()).operation("chat stream read"))
}
