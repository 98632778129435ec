//! OnboardingMachine applies table steps to a session.

use crate::channels::OutboundReply;
use crate::context::ContextBuilder;
use crate::session::Session;

use super::model::PetProfile;
use super::prompts::start_over;
use super::state::{Effect, OnboardingInput, Step, Transition, transition};

/// What onboarding did with an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Reply(OutboundReply),
    /// Onboarding is complete; route the input to the AI backend.
    Delegate,
}

/// Drives a session through the transition table.
#[derive(Debug, Clone)]
pub struct OnboardingMachine {
    ack_token: String,
    context: ContextBuilder,
}

impl OnboardingMachine {
    pub fn new(ack_token: impl Into<String>, context: ContextBuilder) -> Self {
        Self {
            ack_token: ack_token.into(),
            context,
        }
    }

    /// Feed one input to the session's machine. Caller holds the session lock.
    pub fn step(&self, session: &mut Session, input: OnboardingInput<'_>) -> Handled {
        let stage = session.stage;
        match transition(stage, input, &self.ack_token) {
            Step::Advance(row) => Handled::Reply(self.apply(session, row, input)),
            Step::Restart(row) => {
                session.reset();
                Handled::Reply(self.apply(session, row, input))
            }
            Step::Repeat(prompt) => {
                tracing::debug!(user_id = %session.user_id, %stage, "Repeating onboarding prompt");
                Handled::Reply(prompt.render(&self.ack_token))
            }
            Step::StartOver => {
                tracing::debug!(user_id = %session.user_id, %stage, "Input not usable at this stage");
                Handled::Reply(start_over())
            }
            Step::Delegate => Handled::Delegate,
        }
    }

    fn apply(
        &self,
        session: &mut Session,
        row: &Transition,
        input: OnboardingInput<'_>,
    ) -> OutboundReply {
        let text = match input {
            OnboardingInput::Text(text) => text.trim(),
            OnboardingInput::Start | OnboardingInput::Photo => "",
        };

        match row.effect {
            Effect::InitProfile => session.profile = PetProfile::default(),
            Effect::Nothing => {}
            Effect::Record(field) => session.profile.set(field, text),
            Effect::RecordAndSummarize(field) => {
                session.profile.set(field, text);
                let turn = self.context.system_turn(&session.profile);
                session.pin_system_turn(turn);
            }
        }

        session.stage = row.to;
        tracing::info!(
            user_id = %session.user_id,
            from = %row.from,
            to = %row.to,
            "Onboarding advanced"
        );
        row.reply.render(&self.ack_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::KeyboardHint;
    use crate::llm::Role;
    use crate::onboarding::{Prompt, ProfileField, Stage};
    use crate::session::{Turn, UserId};

    fn machine() -> OnboardingMachine {
        OnboardingMachine::new("Continue", ContextBuilder::new("You help pet owners."))
    }

    fn reply(handled: Handled) -> OutboundReply {
        match handled {
            Handled::Reply(reply) => reply,
            Handled::Delegate => panic!("expected a reply"),
        }
    }

    #[test]
    fn first_contact_welcomes_with_ack_button() {
        let machine = machine();
        let mut session = Session::new(UserId::from(1), 20);
        let reply = reply(machine.step(&mut session, OnboardingInput::Start));
        assert_eq!(session.stage, Stage::AwaitAck);
        assert_eq!(reply, Prompt::Welcome.render("Continue"));
        assert_eq!(
            reply.keyboard,
            Some(KeyboardHint::Choices(vec![vec!["Continue".into()]]))
        );
    }

    #[test]
    fn wrong_ack_repeats_same_prompt_twice() {
        let machine = machine();
        let mut session = Session::new(UserId::from(1), 20);
        machine.step(&mut session, OnboardingInput::Start);

        let first = reply(machine.step(&mut session, OnboardingInput::Text("hmm")));
        let second = reply(machine.step(&mut session, OnboardingInput::Text("hmm")));
        assert_eq!(first, second);
        assert_eq!(session.stage, Stage::AwaitAck);
    }

    #[test]
    fn full_onboarding_pins_profile_summary() {
        let machine = machine();
        let mut session = Session::new(UserId::from(1), 20);
        let inputs = [
            OnboardingInput::Start,
            OnboardingInput::Text("Continue"),
            OnboardingInput::Text("Dog"),
            OnboardingInput::Text("Rex, Labrador, 3yo, 25kg, male"),
            OnboardingInput::Text("Behavior & health"),
        ];
        for input in inputs {
            machine.step(&mut session, input);
        }

        assert_eq!(session.stage, Stage::Ready);
        assert_eq!(session.profile.get(ProfileField::PetKind), Some("Dog"));
        assert_eq!(
            session.profile.get(ProfileField::PetDetails),
            Some("Rex, Labrador, 3yo, 25kg, male")
        );

        let summary = session.history().pinned_system().expect("summary turn");
        assert_eq!(summary.role, Role::System);
        let text = summary.text().unwrap();
        assert!(text.contains("Dog"));
        assert!(text.contains("Behavior & health"));
        assert_eq!(session.history().unpinned_len(), 0);
    }

    #[test]
    fn ready_delegates_everything() {
        let machine = machine();
        let mut session = Session::new(UserId::from(1), 20);
        session.stage = Stage::Ready;
        assert_eq!(
            machine.step(&mut session, OnboardingInput::Text("hello")),
            Handled::Delegate
        );
        assert_eq!(machine.step(&mut session, OnboardingInput::Photo), Handled::Delegate);
    }

    #[test]
    fn start_in_ready_resets_session() {
        let machine = machine();
        let mut session = Session::new(UserId::from(1), 20);
        session.stage = Stage::Ready;
        session.profile.set(ProfileField::PetKind, "Cat");
        session.append_turn(Turn::user_text("old question"));

        let reply = reply(machine.step(&mut session, OnboardingInput::Start));
        assert_eq!(session.stage, Stage::AwaitAck);
        assert!(session.profile.is_empty());
        assert!(session.history().is_empty());
        assert_eq!(reply, Prompt::Welcome.render("Continue"));
    }

    #[test]
    fn photo_during_onboarding_changes_nothing() {
        let machine = machine();
        let mut session = Session::new(UserId::from(1), 20);
        machine.step(&mut session, OnboardingInput::Start);
        machine.step(&mut session, OnboardingInput::Text("Continue"));

        let reply = reply(machine.step(&mut session, OnboardingInput::Photo));
        assert_eq!(reply, start_over());
        assert_eq!(session.stage, Stage::AwaitPetKind);
        assert!(session.profile.is_empty());
    }
}
