//! Onboarding: the short questionnaire before free-form questions.
//!
//! The machine is a table (`state::TRANSITIONS`) walked by a pure
//! `transition` function; `OnboardingMachine` applies the chosen row to a
//! session. Once the user reaches `Stage::Ready`, the collected
//! `PetProfile` is pinned into history and every later input is delegated to
//! the AI backend router.

pub mod manager;
pub mod model;
pub mod prompts;
pub mod state;

pub use manager::{Handled, OnboardingMachine};
pub use model::{PetProfile, ProfileField};
pub use prompts::Prompt;
pub use state::{OnboardingInput, Stage, Step, TRANSITIONS, transition};
