//! Pet Assist: dialogue engine for a pet-care chat bot.
//!
//! A short onboarding questionnaire builds a pet profile; after that every
//! message or photo is answered by a hosted model, with per-user history kept
//! in memory.

pub mod channels;
pub mod config;
pub mod context;
pub mod dialogue;
pub mod error;
pub mod llm;
pub mod onboarding;
pub mod router;
pub mod session;

pub use dialogue::{DialogueController, serve};
