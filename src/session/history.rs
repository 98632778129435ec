//! Bounded conversation history.

use crate::llm::Role;
use crate::session::model::Turn;

/// Conversation history with a sliding window.
///
/// A single leading System turn is pinned: it is never evicted and does not
/// count toward the window. Every other turn, including later System turns,
/// counts, and the oldest of those is evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationWindow {
    turns: Vec<Turn>,
    window: usize,
}

impl ConversationWindow {
    pub fn new(window: usize) -> Self {
        Self {
            turns: Vec::new(),
            window,
        }
    }

    /// Append a turn, evicting the oldest unpinned turns past the window.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.enforce_window();
    }

    /// Install or replace the pinned leading System turn.
    pub fn pin_system(&mut self, turn: Turn) {
        debug_assert_eq!(turn.role, Role::System);
        if self.has_pinned_system() {
            self.turns[0] = turn;
        } else {
            self.turns.insert(0, turn);
        }
        self.enforce_window();
    }

    pub fn has_pinned_system(&self) -> bool {
        self.turns.first().map(|t| t.role) == Some(Role::System)
    }

    pub fn pinned_system(&self) -> Option<&Turn> {
        self.turns.first().filter(|t| t.role == Role::System)
    }

    /// Turns after the pinned System turn, oldest first.
    pub fn window_turns(&self) -> &[Turn] {
        &self.turns[self.pinned_offset()..]
    }

    /// All turns, pinned System turn included.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns counted against the window.
    pub fn unpinned_len(&self) -> usize {
        self.turns.len() - self.pinned_offset()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn pinned_offset(&self) -> usize {
        usize::from(self.has_pinned_system())
    }

    fn enforce_window(&mut self) {
        let offset = self.pinned_offset();
        let excess = self.unpinned_len().saturating_sub(self.window);
        if excess > 0 {
            self.turns.drain(offset..offset + excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(n: usize) -> Turn {
        Turn::user_text(format!("message {n}"))
    }

    fn text_of(turn: &Turn) -> &str {
        turn.text().unwrap_or_default()
    }

    #[test]
    fn window_holds_after_every_push() {
        let mut history = ConversationWindow::new(3);
        history.pin_system(Turn::system("instructions"));
        for n in 0..10 {
            history.push(user(n));
            assert!(history.unpinned_len() <= 3, "after push {n}");
        }
        assert_eq!(history.len(), 4);
        let texts: Vec<&str> = history.window_turns().iter().map(text_of).collect();
        assert_eq!(texts, vec!["message 7", "message 8", "message 9"]);
    }

    #[test]
    fn pinned_system_is_never_evicted() {
        let mut history = ConversationWindow::new(2);
        history.pin_system(Turn::system("instructions"));
        for n in 0..5 {
            history.push(user(n));
        }
        assert_eq!(text_of(history.pinned_system().unwrap()), "instructions");
    }

    #[test]
    fn later_system_turns_count_and_evict() {
        let mut history = ConversationWindow::new(2);
        history.pin_system(Turn::system("pinned"));
        history.push(Turn::system("note"));
        history.push(user(1));
        history.push(user(2));
        assert_eq!(history.unpinned_len(), 2);
        assert_eq!(text_of(&history.window_turns()[0]), "message 1");
    }

    #[test]
    fn without_pinned_system_all_turns_count() {
        let mut history = ConversationWindow::new(2);
        for n in 0..4 {
            history.push(user(n));
        }
        assert!(!history.has_pinned_system());
        assert_eq!(history.len(), 2);
        assert_eq!(text_of(&history.turns()[0]), "message 2");
    }

    #[test]
    fn pin_system_replaces_existing_pin() {
        let mut history = ConversationWindow::new(5);
        history.pin_system(Turn::system("v1"));
        history.push(user(0));
        history.pin_system(Turn::system("v2"));
        assert_eq!(history.len(), 2);
        assert_eq!(text_of(history.pinned_system().unwrap()), "v2");
    }

    #[test]
    fn pin_system_after_full_window_keeps_limit() {
        let mut history = ConversationWindow::new(2);
        history.push(user(0));
        history.push(user(1));
        history.pin_system(Turn::system("late"));
        assert_eq!(history.unpinned_len(), 2);
        assert_eq!(history.len(), 3);
    }
}
