//! AI backend router. One `(Session, input)` in, one `BackendResult` out.
//!
//! Three strategies sit behind `AiRouter::respond`:
//! - stateless: the whole context window in one completion request
//! - persistent: a server-held thread, polled until the run finishes
//! - vision: a single request carrying the photo
//!
//! Every model-service error is normalized into `BackendFailure` here.

pub mod backend;
pub mod image;

use crate::channels::ImagePayload;
use crate::error::BackendFailure;

pub use backend::{AiRouter, select_strategy};

/// How a turn is sent to the model service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Stateless,
    Persistent,
    Vision,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stateless => "stateless",
            Self::Persistent => "persistent",
            Self::Vision => "vision",
        };
        write!(f, "{s}")
    }
}

/// Input the router accepts once onboarding is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Text(String),
    Image(ImagePayload),
}

impl UserInput {
    pub fn has_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

/// A successful backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    pub strategy: Strategy,
}

pub type BackendResult = Result<BackendReply, BackendFailure>;
