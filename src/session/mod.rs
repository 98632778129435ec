//! Per-user sessions: onboarding stage, profile, bounded history and the
//! backend thread handle. Everything lives in memory.

pub mod history;
pub mod model;
pub mod store;

pub use history::ConversationWindow;
pub use model::{Session, SessionCheckpoint, Turn, TurnContent, UserId};
pub use store::{SessionHandle, SessionStore};
