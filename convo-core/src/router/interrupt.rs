//! Global interrupt commands, recognised before state-specific dispatch.

const RESTART_WORDS: &[&str] = &["hi", "hello", "hey", "start", "restart", "menu", "home"];
const BACK_WORDS: &[&str] = &["back", "previous", "prev"];
const CANCEL_WORDS: &[&str] = &["cancel", "stop", "quit", "exit"];

pub const CANNOT_GO_BACK: &str =
    "You can't go back from here. Reply 'menu' to start over or continue below.";

pub const CANCELLED_NOTICE: &str =
    "Okay, we've cancelled that. Say hi whenever you'd like to start again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Clear the session and show the welcome menu.
    Restart,
    /// Step back to the state's declared predecessor.
    Back,
    /// Clear the session and confirm the cancellation.
    Cancel,
}

impl Interrupt {
    /// Match a normalized input against the interrupt vocabulary.
    pub fn detect(normalized: &str) -> Option<Self> {
        if RESTART_WORDS.contains(&normalized) {
            Some(Self::Restart)
        } else if BACK_WORDS.contains(&normalized) {
            Some(Self::Back)
        } else if CANCEL_WORDS.contains(&normalized) {
            Some(Self::Cancel)
        } else {
            None
        }
    }
}

/// Trim, case-fold, and drop trailing punctuation ("Hi!" -> "hi").
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['!', '.', '?'])
        .trim()
        .to_lowercase()
}
