//! Context builder. Turns a session into the message sequence sent to the
//! model.
//!
//! The sequence is always `[System] + window`. The System turn is the one
//! pinned in history when onboarding finished; sessions without one get the
//! fixed instruction instead. Building never mutates anything; appending and
//! rolling back go through `begin_user_turn` / `commit_reply` / `rollback`
//! so a failed call leaves the session exactly as it was.

use std::sync::Arc;

use crate::llm::ChatMessage;
use crate::onboarding::PetProfile;
use crate::session::{Session, SessionCheckpoint, Turn, TurnContent};

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: Arc<str>,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Arc::from(system_prompt.into()),
        }
    }

    /// Leading System turn for a session with this profile.
    pub fn system_turn(&self, profile: &PetProfile) -> Turn {
        Turn::system(format!("{}\n\n{}", self.system_prompt, profile.summary()))
    }

    /// Messages for a stateless call, oldest first.
    pub fn build(&self, session: &Session) -> Vec<ChatMessage> {
        let history = session.history();
        let mut messages = Vec::with_capacity(history.len() + 1);

        match history.pinned_system() {
            Some(turn) => messages.push(render_turn(turn)),
            None => messages.push(ChatMessage::system(&*self.system_prompt)),
        }
        messages.extend(history.window_turns().iter().map(render_turn));
        messages
    }

    /// Extra per-run instructions for server-held threads: the profile, so
    /// the assistant knows whose pet it is talking about.
    pub fn run_instructions(&self, session: &Session) -> Option<String> {
        (!session.profile.is_empty()).then(|| session.profile.summary())
    }

    /// Append the user's turn and return the state to roll back to.
    pub fn begin_user_turn(&self, session: &mut Session, turn: Turn) -> SessionCheckpoint {
        let checkpoint = session.checkpoint();
        session.append_turn(turn);
        checkpoint
    }

    pub fn commit_reply(&self, session: &mut Session, reply: &str) {
        session.append_turn(Turn::assistant(reply));
    }

    pub fn rollback(&self, session: &mut Session, checkpoint: SessionCheckpoint) {
        session.restore(checkpoint);
    }
}

fn render_turn(turn: &Turn) -> ChatMessage {
    let content = match &turn.content {
        TurnContent::Text(text) => text.clone(),
        TurnContent::Image { caption, .. } => match caption {
            Some(caption) => format!("[Photo] {caption}"),
            None => "[Photo]".to_string(),
        },
    };
    ChatMessage {
        role: turn.role,
        content,
    }
}
