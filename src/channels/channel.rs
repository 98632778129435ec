//! Transport contract: what a channel delivers and what it renders.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::session::UserId;

/// A photo as received from the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Raw bytes, already downloaded by the transport.
    pub bytes: Arc<[u8]>,
    /// URL the model service may fetch the same image from, if any.
    pub remote_url: Option<String>,
    pub caption: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            remote_url: None,
            caption: None,
        }
    }

    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        let caption = caption.into();
        if !caption.trim().is_empty() {
            self.caption = Some(caption);
        }
        self
    }
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("remote_url", &self.remote_url.as_ref().map(|_| "<set>"))
            .field("caption", &self.caption)
            .finish()
    }
}

/// A photo the transport has announced but not downloaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    /// Transport-specific handle passed back to `Channel::fetch_photo`.
    pub file_id: String,
    pub caption: Option<String>,
}

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundInput {
    /// Explicit (re)start, e.g. `/start`.
    Start,
    Text(String),
    Photo(ImagePayload),
    /// Fetched through the channel in the user's turn order.
    PendingPhoto(PhotoRef),
}

impl InboundInput {
    pub fn is_photo(&self) -> bool {
        matches!(self, Self::Photo(_) | Self::PendingPhoto(_))
    }
}

/// One inbound event from a channel.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub input: InboundInput,
    /// Channel-specific routing data (e.g. chat id).
    pub metadata: serde_json::Value,
}

impl InboundEvent {
    pub fn new(user_id: UserId, input: InboundInput) -> Self {
        Self {
            user_id,
            input,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Suggested reply buttons for the transport to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardHint {
    /// Rows of single-tap choices.
    Choices(Vec<Vec<String>>),
    /// Hide any keyboard shown earlier.
    Remove,
}

impl KeyboardHint {
    pub fn choices<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choices(
            rows.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }
}

/// Reply produced for one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub text: String,
    pub keyboard: Option<KeyboardHint>,
}

impl OutboundReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: KeyboardHint) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Progress signals sent while a reply is being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Typing,
    Notice(String),
}

pub type MessageStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(&self, event: &InboundEvent, reply: OutboundReply)
    -> Result<(), ChannelError>;

    async fn send_status(
        &self,
        event: &InboundEvent,
        status: StatusUpdate,
    ) -> Result<(), ChannelError>;

    /// Download a photo delivered as `InboundInput::PendingPhoto`.
    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<ImagePayload, ChannelError> {
        Err(ChannelError::DownloadFailed {
            name: self.name().to_string(),
            reason: format!("cannot fetch file {}", photo.file_id),
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
