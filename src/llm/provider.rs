//! Model service contract.
//!
//! The router only ever talks to an `LlmProvider`; request and response
//! schemas of the concrete service stay inside its implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        };
        write!(f, "{s}")
    }
}

/// A single text message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A stateless completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// A completed model reply.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Where the model should read an image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A URL the model service fetches itself.
    Remote(String),
    /// A `data:` URL carrying the encoded bytes inline.
    Inline(String),
}

impl ImageSource {
    pub fn as_url(&self) -> &str {
        match self {
            Self::Remote(url) | Self::Inline(url) => url,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }
}

/// A single-shot request carrying one image.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub system: String,
    pub text: String,
    pub image: ImageSource,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Handle to a server-held conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one asynchronous run on a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub thread_id: ThreadId,
    pub run_id: String,
}

/// Status of an asynchronous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Operations the router needs from a hosted model service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Whether `complete_with_image` can be used at all.
    fn supports_vision(&self) -> bool {
        true
    }

    /// Stateless completion over the full message sequence.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Create an empty server-held thread.
    async fn create_thread(&self) -> Result<ThreadId, LlmError>;

    /// Append one message to a thread and start a run over it.
    ///
    /// `instructions` are added to the assistant's own instructions for this
    /// run only.
    async fn append_and_run(
        &self,
        thread: &ThreadId,
        message: &ChatMessage,
        instructions: Option<&str>,
    ) -> Result<RunHandle, LlmError>;

    async fn poll_run(&self, run: &RunHandle) -> Result<RunStatus, LlmError>;

    /// Ask the service to stop a run that is still pending.
    async fn cancel_run(&self, _run: &RunHandle) -> Result<(), LlmError> {
        Ok(())
    }

    /// Text of the newest assistant message on the thread.
    async fn fetch_latest_reply(&self, thread: &ThreadId) -> Result<String, LlmError>;

    async fn complete_with_image(
        &self,
        request: VisionRequest,
    ) -> Result<CompletionResponse, LlmError>;
}
