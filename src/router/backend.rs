//! AiRouter: strategy selection and the three call paths.

use std::sync::Arc;

use crate::channels::ImagePayload;
use crate::config::{ImageConfig, RouterConfig};
use crate::context::ContextBuilder;
use crate::error::{BackendFailure, LlmError};
use crate::llm::{
    ChatMessage, CompletionRequest, ImageSource, LlmProvider, PollOutcome, PollPolicy,
    RunStatus, VisionRequest, poll_until,
};
use crate::session::{Session, Turn};

use super::image::reencode;
use super::{BackendReply, BackendResult, Strategy, UserInput};

/// Caption used when a photo arrives without one.
pub const DEFAULT_PHOTO_CAPTION: &str = "Please take a look at this photo of my pet.";

/// Pick the strategy for one turn.
///
/// A photo always goes to vision. Otherwise an existing thread, or persistent
/// mode, selects the persistent strategy.
pub fn select_strategy(session: &Session, input: &UserInput, persistent_mode: bool) -> Strategy {
    if input.has_image() {
        Strategy::Vision
    } else if session.backend_session_token.is_some() || persistent_mode {
        Strategy::Persistent
    } else {
        Strategy::Stateless
    }
}

pub struct AiRouter {
    llm: Arc<dyn LlmProvider>,
    context: ContextBuilder,
    config: RouterConfig,
    image: ImageConfig,
    vision_prompt: Arc<str>,
}

impl AiRouter {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        context: ContextBuilder,
        config: RouterConfig,
        image: ImageConfig,
        vision_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            context,
            config,
            image,
            vision_prompt: Arc::from(vision_prompt.into()),
        }
    }

    pub fn strategy_for(&self, session: &Session, input: &UserInput) -> Strategy {
        select_strategy(session, input, self.config.persistent_threads)
    }

    /// Produce one reply for `input`.
    ///
    /// On success the user turn and the reply are in history. On failure the
    /// session's history and thread token are exactly as they were before
    /// the call.
    pub async fn respond(&self, session: &mut Session, input: &UserInput) -> BackendResult {
        let strategy = self.strategy_for(session, input);
        let turn = match input {
            UserInput::Text(text) => Turn::user_text(text.as_str()),
            UserInput::Image(image) => Turn::user_image(image.clone()),
        };
        let checkpoint = self.context.begin_user_turn(session, turn);

        tracing::debug!(user_id = %session.user_id, %strategy, "Routing turn");
        let outcome = match input {
            UserInput::Text(text) => match strategy {
                Strategy::Persistent => self.persistent(session, text).await,
                _ => self.stateless(session).await,
            },
            UserInput::Image(image) => self.vision(session, image).await,
        }
        .and_then(non_empty);

        match outcome {
            Ok(text) => {
                self.context.commit_reply(session, &text);
                tracing::info!(
                    user_id = %session.user_id,
                    %strategy,
                    reply_len = text.len(),
                    "Backend replied"
                );
                Ok(BackendReply { text, strategy })
            }
            Err(failure) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    %strategy,
                    error = %failure,
                    "Backend call failed, rolling back turn"
                );
                self.context.rollback(session, checkpoint);
                Err(failure)
            }
        }
    }

    async fn stateless(&self, session: &Session) -> Result<String, BackendFailure> {
        let request = CompletionRequest::new(self.context.build(session))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let response = self.llm.complete(request).await?;
        tracing::debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Stateless completion"
        );
        Ok(response.content)
    }

    async fn persistent(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<String, BackendFailure> {
        let thread = match &session.backend_session_token {
            Some(thread) => thread.clone(),
            None => {
                let thread = self.llm.create_thread().await?;
                tracing::info!(user_id = %session.user_id, thread_id = %thread, "Created thread");
                session.backend_session_token = Some(thread.clone());
                thread
            }
        };

        let instructions = self.context.run_instructions(session);
        let run = self
            .llm
            .append_and_run(&thread, &ChatMessage::user(text), instructions.as_deref())
            .await?;

        let policy = PollPolicy::new(self.config.poll_interval, self.config.poll_max_attempts);
        let llm = &self.llm;
        let handle = &run;
        let outcome = poll_until(policy, |attempt| async move {
            let status = llm.poll_run(handle).await?;
            tracing::debug!(run_id = %handle.run_id, attempt, %status, "Polled run");
            Ok::<_, LlmError>(status.is_terminal().then_some(status))
        })
        .await?;

        match outcome {
            PollOutcome::Ready(RunStatus::Completed) => {
                Ok(self.llm.fetch_latest_reply(&thread).await?)
            }
            PollOutcome::Ready(status @ (RunStatus::Failed | RunStatus::Cancelled)) => Err(
                BackendFailure::RemoteRejected(format!("run {} ended as {status}", run.run_id)),
            ),
            PollOutcome::Ready(RunStatus::Expired) => Err(BackendFailure::RemoteTimeout(format!(
                "run {} expired on the server",
                run.run_id
            ))),
            PollOutcome::Ready(status) => Err(BackendFailure::Unknown(format!(
                "run {} reported non-terminal status {status} as final",
                run.run_id
            ))),
            PollOutcome::Exhausted { attempts } => {
                // A still-active run blocks the next message on this thread.
                if let Err(e) = self.llm.cancel_run(&run).await {
                    tracing::warn!(
                        run_id = %run.run_id,
                        error = %e,
                        "Failed to cancel stalled run"
                    );
                }
                Err(BackendFailure::RemoteTimeout(format!(
                    "run {} still pending after {attempts} polls",
                    run.run_id
                )))
            }
        }
    }

    /// Remote URL first when the transport supplied one; on a payload
    /// failure retry once with the re-encoded bytes. Never falls back to a
    /// text strategy.
    async fn vision(
        &self,
        session: &Session,
        image: &ImagePayload,
    ) -> Result<String, BackendFailure> {
        if !self.llm.supports_vision() {
            return Err(BackendFailure::UnsupportedModality(format!(
                "model {} cannot read images",
                self.llm.model_name()
            )));
        }

        let text = self.vision_text(session, image.caption.as_deref());

        if let Some(url) = &image.remote_url {
            let request = self.vision_request(&text, ImageSource::Remote(url.clone()));
            match self.llm.complete_with_image(request).await {
                Ok(response) => return Ok(response.content),
                Err(err) if err.is_payload_related() => {
                    tracing::warn!(
                        user_id = %session.user_id,
                        error = %err,
                        "Remote image failed, retrying with inline copy"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        let encoded = reencode(Arc::clone(&image.bytes), self.image).await?;
        tracing::debug!(
            width = encoded.width,
            height = encoded.height,
            bytes = encoded.byte_len,
            "Sending inline image"
        );
        let request = self.vision_request(&text, ImageSource::Inline(encoded.data_url));
        Ok(self.llm.complete_with_image(request).await?.content)
    }

    fn vision_text(&self, session: &Session, caption: Option<&str>) -> String {
        let caption = caption
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_PHOTO_CAPTION);
        match self.context.run_instructions(session) {
            Some(profile) => format!("{caption}\n\n{profile}"),
            None => caption.to_string(),
        }
    }

    fn vision_request(&self, text: &str, image: ImageSource) -> VisionRequest {
        VisionRequest {
            system: self.vision_prompt.to_string(),
            text: text.to_string(),
            image,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        }
    }
}

fn non_empty(text: String) -> Result<String, BackendFailure> {
    if text.trim().is_empty() {
        Err(BackendFailure::Unknown("model returned an empty reply".to_string()))
    } else {
        Ok(text)
    }
}
