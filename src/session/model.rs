//! Per-user session data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::ImagePayload;
use crate::llm::{Role, ThreadId};
use crate::onboarding::{PetProfile, Stage};
use crate::session::history::ConversationWindow;

/// Opaque, non-empty user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Returns `None` for empty or whitespace-only identifiers.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnContent {
    Text(String),
    Image {
        image: ImagePayload,
        caption: Option<String>,
    },
}

/// One exchange unit in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: TurnContent) -> Self {
        Self {
            role,
            content,
            at: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, TurnContent::Text(text.into()))
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnContent::Text(text.into()))
    }

    pub fn user_image(image: ImagePayload) -> Self {
        let caption = image.caption.clone();
        Self::new(Role::User, TurnContent::Image { image, caption })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnContent::Text(text.into()))
    }

    /// Text content, if this is a text turn.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            TurnContent::Image { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.content, TurnContent::Image { .. })
    }
}

/// State restored when a backend call fails.
#[derive(Debug, Clone)]
pub struct SessionCheckpoint {
    history: ConversationWindow,
    backend_session_token: Option<ThreadId>,
}

/// Everything kept for one user for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub stage: Stage,
    pub profile: PetProfile,
    history: ConversationWindow,
    /// Server-held thread, created lazily by the router.
    pub backend_session_token: Option<ThreadId>,
}

impl Session {
    pub fn new(user_id: UserId, window: usize) -> Self {
        Self {
            user_id,
            stage: Stage::default(),
            profile: PetProfile::default(),
            history: ConversationWindow::new(window),
            backend_session_token: None,
        }
    }

    pub fn history(&self) -> &ConversationWindow {
        &self.history
    }

    /// Append a turn; the window is enforced before this returns.
    pub fn append_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    pub fn pin_system_turn(&mut self, turn: Turn) {
        self.history.pin_system(turn);
    }

    /// Back to a fresh `New` session with the same id and window.
    pub fn reset(&mut self) {
        *self = Self::new(self.user_id.clone(), self.history.window());
    }

    pub fn checkpoint(&self) -> SessionCheckpoint {
        SessionCheckpoint {
            history: self.history.clone(),
            backend_session_token: self.backend_session_token.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: SessionCheckpoint) {
        self.history = checkpoint.history;
        self.backend_session_token = checkpoint.backend_session_token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_blank() {
        assert!(UserId::new("").is_none());
        assert!(UserId::new("   ").is_none());
        assert_eq!(UserId::new(" 42 ").unwrap().as_str(), "42");
        assert_eq!(UserId::from(-100123_i64).to_string(), "-100123");
    }

    #[test]
    fn new_session_starts_at_new() {
        let session = Session::new(UserId::from(1), 20);
        assert_eq!(session.stage, Stage::New);
        assert!(session.history().is_empty());
        assert!(session.backend_session_token.is_none());
    }

    #[test]
    fn reset_clears_everything_but_identity() {
        let mut session = Session::new(UserId::from(7), 5);
        session.stage = Stage::Ready;
        session.append_turn(Turn::user_text("hi"));
        session.backend_session_token = Some(ThreadId("thread_1".into()));
        session.reset();
        assert_eq!(session.user_id, UserId::from(7));
        assert_eq!(session.stage, Stage::New);
        assert!(session.history().is_empty());
        assert_eq!(session.history().window(), 5);
        assert!(session.backend_session_token.is_none());
    }

    #[test]
    fn restore_rolls_back_history_and_token() {
        let mut session = Session::new(UserId::from(1), 5);
        session.append_turn(Turn::user_text("before"));
        let checkpoint = session.checkpoint();

        session.append_turn(Turn::user_text("during"));
        session.backend_session_token = Some(ThreadId("thread_x".into()));
        session.restore(checkpoint);

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().turns()[0].text(), Some("before"));
        assert!(session.backend_session_token.is_none());
    }

    #[test]
    fn image_turn_keeps_caption() {
        let turn = Turn::user_image(ImagePayload::new(vec![1, 2, 3]).with_caption("look"));
        assert!(turn.is_image());
        assert!(turn.text().is_none());
        match turn.content {
            TurnContent::Image { caption, .. } => assert_eq!(caption.as_deref(), Some("look")),
            TurnContent::Text(_) => panic!("expected image"),
        }
    }
}
