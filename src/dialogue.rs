//! Dialogue controller: the single entry point for inbound events.
//!
//! `handle` locks the user's session for the whole turn, lets onboarding
//! answer while the profile is incomplete, and hands everything after that
//! to the AI backend router. Failures come back as short apologies; the
//! session is left as it was before the turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channels::{Channel, InboundEvent, InboundInput, OutboundReply, StatusUpdate};
use crate::config::BotConfig;
use crate::context::ContextBuilder;
use crate::error::{BackendFailure, ChannelError};
use crate::llm::LlmProvider;
use crate::onboarding::{Handled, OnboardingInput, OnboardingMachine, Stage};
use crate::router::{AiRouter, UserInput};
use crate::session::{Session, SessionStore, UserId};

pub const TEXT_APOLOGY: &str =
    "Sorry, I couldn't get an answer right now. Please try again in a moment.";

pub const IMAGE_APOLOGY: &str = "Sorry, I couldn't analyze that photo right now. \
     Please try again in a moment, or describe your pet in text.";

pub const MALFORMED_IMAGE_APOLOGY: &str = "Sorry, I couldn't open that photo. \
     Please send it again, or describe your pet in text.";

pub const UNSUPPORTED_APOLOGY: &str = "Sorry, I can't look at photos at the moment. \
     Please describe your pet in text and I'll do my best to help.";

pub const QUOTA_APOLOGY: &str =
    "Sorry, I'm getting too many questions right now. Please try again a bit later.";

pub const PHOTO_DOWNLOAD_APOLOGY: &str =
    "Sorry, something went wrong while receiving your photo. Please try sending it again.";

pub const EMPTY_QUESTION: &str = "Please type your question about your pet.";

/// Sent while a photo is being analyzed.
pub const PHOTO_NOTICE: &str = "Looking at your photo...";

pub struct DialogueController {
    store: SessionStore,
    onboarding: OnboardingMachine,
    router: AiRouter,
    request_timeout: Duration,
}

impl DialogueController {
    pub fn new(llm: Arc<dyn LlmProvider>, config: BotConfig) -> Self {
        let BotConfig {
            dialogue,
            router,
            image,
        } = config;
        let context = ContextBuilder::new(dialogue.system_prompt);
        Self {
            store: SessionStore::new(dialogue.history_window),
            onboarding: OnboardingMachine::new(dialogue.ack_token, context.clone()),
            router: AiRouter::new(llm, context, router, image, dialogue.vision_prompt),
            request_timeout: dialogue.request_timeout,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Produce the reply for one inbound event.
    ///
    /// Events for the same user are processed one at a time; different
    /// users never wait on each other.
    pub async fn handle(&self, event: &InboundEvent) -> OutboundReply {
        let handle = self.store.get_or_create(&event.user_id).await;
        let mut session = handle.lock().await;

        let input = match &event.input {
            InboundInput::Start => OnboardingInput::Start,
            InboundInput::Text(text) => OnboardingInput::Text(text),
            InboundInput::Photo(_) | InboundInput::PendingPhoto(_) => OnboardingInput::Photo,
        };

        match self.onboarding.step(&mut session, input) {
            Handled::Reply(reply) => reply,
            Handled::Delegate => self.ask_backend(&mut session, &event.input).await,
        }
    }

    /// Progress notice to show before the reply, if the event warrants one.
    pub async fn interim_status(&self, event: &InboundEvent) -> Option<StatusUpdate> {
        if !event.input.is_photo() {
            return None;
        }
        (self.stage_of(&event.user_id).await == Some(Stage::Ready))
            .then(|| StatusUpdate::Notice(PHOTO_NOTICE.to_string()))
    }

    async fn stage_of(&self, user_id: &UserId) -> Option<Stage> {
        let handle = self.store.get(user_id).await?;
        let stage = handle.lock().await.stage;
        Some(stage)
    }

    async fn ask_backend(&self, session: &mut Session, input: &InboundInput) -> OutboundReply {
        let input = match input {
            InboundInput::Text(text) if text.trim().is_empty() => {
                return OutboundReply::text(EMPTY_QUESTION);
            }
            InboundInput::Text(text) => UserInput::Text(text.trim().to_string()),
            InboundInput::Photo(image) => UserInput::Image(image.clone()),
            InboundInput::PendingPhoto(_) => return OutboundReply::text(PHOTO_DOWNLOAD_APOLOGY),
            InboundInput::Start => return OutboundReply::text(EMPTY_QUESTION),
        };

        let checkpoint = session.checkpoint();
        let outcome =
            tokio::time::timeout(self.request_timeout, self.router.respond(session, &input)).await;

        let failure = match outcome {
            Ok(Ok(reply)) => return OutboundReply::text(reply.text),
            Ok(Err(failure)) => failure,
            Err(_) => {
                // The router future was dropped mid-call; undo its partial turn.
                session.restore(checkpoint);
                tracing::warn!(
                    user_id = %session.user_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "Backend call abandoned after request timeout"
                );
                BackendFailure::RemoteTimeout("request timeout elapsed".to_string())
            }
        };
        apology(&failure, input.has_image())
    }

    /// Process one event against a channel: status first, then the reply.
    ///
    /// A pending photo is downloaded here, once the user is past onboarding.
    /// Callers must not process two events of the same user concurrently.
    pub async fn process(&self, channel: &dyn Channel, mut event: InboundEvent) {
        if let Err(e) = channel.send_status(&event, StatusUpdate::Typing).await {
            tracing::debug!(error = %e, "Failed to send typing status");
        }
        if let Some(status) = self.interim_status(&event).await {
            if let Err(e) = channel.send_status(&event, status).await {
                tracing::debug!(error = %e, "Failed to send interim status");
            }
        }

        if let InboundInput::PendingPhoto(photo) = event.input.clone() {
            if self.stage_of(&event.user_id).await == Some(Stage::Ready) {
                let download = channel.fetch_photo(&photo);
                let fetched = tokio::time::timeout(self.request_timeout, download)
                    .await
                    .unwrap_or_else(|_| {
                        Err(ChannelError::DownloadFailed {
                            name: channel.name().to_string(),
                            reason: "download timed out".to_string(),
                        })
                    });
                match fetched {
                    Ok(image) => event.input = InboundInput::Photo(image),
                    Err(e) => {
                        tracing::warn!(
                            user_id = %event.user_id,
                            error = %e,
                            "Photo download failed"
                        );
                        let reply = OutboundReply::text(PHOTO_DOWNLOAD_APOLOGY);
                        return deliver(channel, &event, reply).await;
                    }
                }
            }
        }

        let reply = self.handle(&event).await;
        deliver(channel, &event, reply).await;
    }
}

async fn deliver(channel: &dyn Channel, event: &InboundEvent, reply: OutboundReply) {
    if let Err(e) = channel.respond(event, reply).await {
        tracing::warn!(user_id = %event.user_id, error = %e, "Failed to deliver reply");
    }
}

/// User-facing text for a failed backend call.
pub fn apology(failure: &BackendFailure, image: bool) -> OutboundReply {
    let text = match failure {
        BackendFailure::UnsupportedModality(_) => UNSUPPORTED_APOLOGY,
        BackendFailure::MalformedImage(_) => MALFORMED_IMAGE_APOLOGY,
        BackendFailure::QuotaExceeded(_) => QUOTA_APOLOGY,
        BackendFailure::RemoteTimeout(_)
        | BackendFailure::RemoteRejected(_)
        | BackendFailure::Unknown(_) => {
            if image {
                IMAGE_APOLOGY
            } else {
                TEXT_APOLOGY
            }
        }
    };
    OutboundReply::text(text)
}

/// Pump events from `channel` into `controller` until the stream ends or
/// Ctrl+C.
///
/// Each user gets an ordered queue drained by its own task, so a user's
/// events are answered in arrival order while users run concurrently.
/// When the stream ends, queued events are finished before returning;
/// Ctrl+C abandons them.
pub async fn serve(
    channel: Arc<dyn Channel>,
    controller: Arc<DialogueController>,
) -> Result<(), ChannelError> {
    let mut events = channel.start().await?;
    tracing::info!(channel = channel.name(), "Pet assistant ready and listening");

    let mut queues = UserQueues::new(Arc::clone(&channel), controller);
    let interrupted = loop {
        let event = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down...");
                break true;
            }
            event = events.next() => match event {
                Some(event) => event,
                None => {
                    tracing::info!("Channel stream ended, shutting down...");
                    break false;
                }
            }
        };
        queues.dispatch(event);
    };

    if interrupted {
        queues.abort().await;
    } else {
        queues.drain().await;
    }
    channel.shutdown().await
}

/// One FIFO queue per user, each drained by a dedicated task.
struct UserQueues {
    channel: Arc<dyn Channel>,
    controller: Arc<DialogueController>,
    senders: HashMap<UserId, mpsc::UnboundedSender<InboundEvent>>,
    workers: JoinSet<()>,
}

impl UserQueues {
    fn new(channel: Arc<dyn Channel>, controller: Arc<DialogueController>) -> Self {
        Self {
            channel,
            controller,
            senders: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    fn dispatch(&mut self, event: InboundEvent) {
        let event = match self.senders.get(&event.user_id) {
            Some(queue) => match queue.send(event) {
                Ok(()) => return,
                // The worker died with a panic; start a new one.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<InboundEvent>();
        let channel = Arc::clone(&self.channel);
        let controller = Arc::clone(&self.controller);
        self.workers.spawn(async move {
            while let Some(event) = rx.recv().await {
                controller.process(channel.as_ref(), event).await;
            }
        });

        let user_id = event.user_id.clone();
        if tx.send(event).is_err() {
            tracing::error!(user_id = %user_id, "User queue closed before first event");
        }
        self.senders.insert(user_id, tx);
    }

    /// Close every queue and wait until queued events are answered.
    async fn drain(mut self) {
        self.senders.clear();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "User queue task failed");
            }
        }
    }

    async fn abort(mut self) {
        self.workers.shutdown().await;
    }
}
