//! Onboarding state machine as data.
//!
//! Stages form a linear chain: New → AwaitAck → AwaitPetKind →
//! AwaitPetDetails → AwaitHelpArea → Ready. Each non-terminal stage has
//! exactly one row in `TRANSITIONS`; inserting a stage means adding a variant
//! and a row, nothing else.

use serde::{Deserialize, Serialize};

use super::model::ProfileField;
use super::prompts::Prompt;

/// Where a user is in onboarding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    New,
    AwaitAck,
    AwaitPetKind,
    AwaitPetDetails,
    AwaitHelpArea,
    Ready,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::New,
        Self::AwaitAck,
        Self::AwaitPetKind,
        Self::AwaitPetDetails,
        Self::AwaitHelpArea,
        Self::Ready,
    ];

    /// Whether onboarding is done and input goes to the AI backend.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Next stage along the table, if any.
    pub fn next(&self) -> Option<Stage> {
        row_for(*self).map(|row| row.to)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::AwaitAck => "await_ack",
            Self::AwaitPetKind => "await_pet_kind",
            Self::AwaitPetDetails => "await_pet_details",
            Self::AwaitHelpArea => "await_help_area",
            Self::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

/// Onboarding's view of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingInput<'a> {
    Start,
    Text(&'a str),
    Photo,
}

/// Which inputs a row accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// Any start or text event.
    AnyContact,
    /// Only the configured acknowledgement token.
    AckToken,
    /// Any non-blank text.
    FreeText,
}

impl Accept {
    pub fn matches(&self, input: OnboardingInput<'_>, ack_token: &str) -> bool {
        match (self, input) {
            (Self::AnyContact, OnboardingInput::Start | OnboardingInput::Text(_)) => true,
            (Self::AckToken, OnboardingInput::Text(text)) => {
                text.trim().to_lowercase() == ack_token.trim().to_lowercase()
            }
            (Self::FreeText, OnboardingInput::Text(text)) => !text.trim().is_empty(),
            _ => false,
        }
    }
}

/// Side effect of taking a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start from an empty profile.
    InitProfile,
    Nothing,
    /// Store the input text under a profile key.
    Record(ProfileField),
    /// Store the input, then write the profile summary into history.
    RecordAndSummarize(ProfileField),
}

/// One row of the transition table.
#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: Stage,
    pub accepts: Accept,
    pub effect: Effect,
    pub to: Stage,
    pub reply: Prompt,
}

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: Stage::New,
        accepts: Accept::AnyContact,
        effect: Effect::InitProfile,
        to: Stage::AwaitAck,
        reply: Prompt::Welcome,
    },
    Transition {
        from: Stage::AwaitAck,
        accepts: Accept::AckToken,
        effect: Effect::Nothing,
        to: Stage::AwaitPetKind,
        reply: Prompt::AskPetKind,
    },
    Transition {
        from: Stage::AwaitPetKind,
        accepts: Accept::FreeText,
        effect: Effect::Record(ProfileField::PetKind),
        to: Stage::AwaitPetDetails,
        reply: Prompt::AskPetDetails,
    },
    Transition {
        from: Stage::AwaitPetDetails,
        accepts: Accept::FreeText,
        effect: Effect::Record(ProfileField::PetDetails),
        to: Stage::AwaitHelpArea,
        reply: Prompt::AskHelpArea,
    },
    Transition {
        from: Stage::AwaitHelpArea,
        accepts: Accept::FreeText,
        effect: Effect::RecordAndSummarize(ProfileField::HelpArea),
        to: Stage::Ready,
        reply: Prompt::Ready,
    },
];

/// Outcome of feeding one input to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Take the row.
    Advance(&'static Transition),
    /// Reset the session, then take the row (the `New` row).
    Restart(&'static Transition),
    /// Input rejected; show the stage's prompt again.
    Repeat(Prompt),
    /// Input makes no sense here; ask the user to start over.
    StartOver,
    /// Onboarding is complete; the AI backend handles this input.
    Delegate,
}

/// The row leaving `stage`, if any.
pub fn row_for(stage: Stage) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|row| row.from == stage)
}

/// The prompt a user sees while sitting in `stage`.
pub fn current_prompt(stage: Stage) -> Option<Prompt> {
    TRANSITIONS
        .iter()
        .find(|row| row.to == stage)
        .map(|row| row.reply)
}

/// Pure transition function. Same stage and input always give the same step.
pub fn transition(stage: Stage, input: OnboardingInput<'_>, ack_token: &str) -> Step {
    if input == OnboardingInput::Start && stage != Stage::New {
        return row_for(Stage::New).map_or(Step::StartOver, Step::Restart);
    }
    if stage.is_terminal() {
        return Step::Delegate;
    }

    let Some(row) = row_for(stage) else {
        return Step::StartOver;
    };
    if row.accepts.matches(input, ack_token) {
        return Step::Advance(row);
    }

    match input {
        OnboardingInput::Photo => Step::StartOver,
        _ => current_prompt(stage).map_or(Step::StartOver, Step::Repeat),
    }
}
