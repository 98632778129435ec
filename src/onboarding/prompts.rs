//! Texts and keyboards shown during onboarding.

use crate::channels::{KeyboardHint, OutboundReply};

/// Pet kinds offered as buttons. Free text is accepted too.
pub const PET_KIND_CHOICES: &[&[&str]] = &[&["Dog", "Cat"], &["Bird", "Rodent"], &["Other"]];

/// Help areas offered as buttons. Free text is accepted too.
pub const HELP_AREA_CHOICES: &[&[&str]] = &[
    &["Nutrition", "Behavior & health"],
    &["Training", "Grooming & care"],
];

/// Shown when input arrives that the current stage cannot use.
pub const START_OVER: &str = "Please finish setting up first. Send /start to begin again.";

/// Every prompt the machine can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Welcome,
    AskPetKind,
    AskPetDetails,
    AskHelpArea,
    Ready,
}

impl Prompt {
    /// Render the prompt. The welcome button carries the acknowledgement token.
    pub fn render(&self, ack_token: &str) -> OutboundReply {
        match self {
            Self::Welcome => OutboundReply::text(format!(
                "Hi! I'm your pet care assistant 🐾\n\n\
                 I can answer questions about feeding, behavior, health and grooming, \
                 and I can take a look at photos of your pet.\n\n\
                 Let's set up your pet's profile first. Press \"{ack_token}\" to start."
            ))
            .with_keyboard(KeyboardHint::choices([[ack_token]])),

            Self::AskPetKind => OutboundReply::text("Which animal do you have?")
                .with_keyboard(choice_rows(PET_KIND_CHOICES)),

            Self::AskPetDetails => OutboundReply::text(
                "Tell me about your pet: name, breed, age, weight and sex.\n\n\
                 For example: Rex, Labrador, 3 years, 25 kg, male.",
            )
            .with_keyboard(KeyboardHint::Remove),

            Self::AskHelpArea => OutboundReply::text("What do you need help with most?")
                .with_keyboard(choice_rows(HELP_AREA_CHOICES)),

            Self::Ready => OutboundReply::text(
                "All set, your pet's profile is saved! ✅\n\n\
                 Ask me anything, for example:\n\
                 - How much should I feed my dog per day?\n\
                 - Why does my cat scratch the furniture?\n\
                 - Send a photo and ask what I think of the coat.\n\n\
                 Send /start at any time to begin again.",
            )
            .with_keyboard(KeyboardHint::Remove),
        }
    }
}

fn choice_rows(rows: &[&[&str]]) -> KeyboardHint {
    KeyboardHint::choices(rows.iter().map(|row| row.iter().copied()))
}

/// Reply for input the current stage cannot use.
pub fn start_over() -> OutboundReply {
    OutboundReply::text(START_OVER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_offers_single_ack_button() {
        let reply = Prompt::Welcome.render("Continue");
        assert!(reply.text.contains("\"Continue\""));
        assert_eq!(
            reply.keyboard,
            Some(KeyboardHint::Choices(vec![vec!["Continue".to_string()]]))
        );
    }

    #[test]
    fn choice_prompts_render_all_buttons() {
        let Some(KeyboardHint::Choices(rows)) = Prompt::AskPetKind.render("ok").keyboard else {
            panic!("expected choices");
        };
        let flat: Vec<String> = rows.into_iter().flatten().collect();
        assert_eq!(flat, vec!["Dog", "Cat", "Bird", "Rodent", "Other"]);

        let Some(KeyboardHint::Choices(rows)) = Prompt::AskHelpArea.render("ok").keyboard else {
            panic!("expected choices");
        };
        assert!(rows.iter().flatten().any(|c| c == "Behavior & health"));
    }

    #[test]
    fn free_text_prompts_remove_keyboard() {
        assert_eq!(
            Prompt::AskPetDetails.render("ok").keyboard,
            Some(KeyboardHint::Remove)
        );
        assert_eq!(Prompt::Ready.render("ok").keyboard, Some(KeyboardHint::Remove));
    }

    #[test]
    fn start_over_has_no_keyboard() {
        let reply = start_over();
        assert!(reply.text.contains("/start"));
        assert!(reply.keyboard.is_none());
    }
}
