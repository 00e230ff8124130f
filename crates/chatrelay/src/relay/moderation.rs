//! Content moderation over streamed output
//!
//! Moderation is checked against the cumulative text of one attempt so that
//! a disallowed phrase split across fragment boundaries is still caught.

/// Moderation service consumed by the relay
pub trait Moderator: Send + Sync {
    /// Whether `text` contains anything from `wordlist`
    fn contains(&self, text: &str, wordlist: &[String]) -> bool;
}

/// Case-insensitive substring search over a wordlist
#[derive(Debug, Clone, Default)]
pub struct WordlistModerator;

impl WordlistModerator {
    pub fn new() -> Self {
        Self
    }
}

impl Moderator for WordlistModerator {
    fn contains(&self, text: &str, wordlist: &[String]) -> bool {
        let haystack = normalize(text);
        wordlist
            .iter()
            .map(|word| normalize(word))
            .filter(|word| !word.is_empty())
            .any(|word| haystack.contains(&word))
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_uppercase()
}

/// Append-only text accumulator for one streaming attempt
#[derive(Debug, Default)]
pub struct ModerationBuffer {
    text: String,
}

impl ModerationBuffer {
    pub fn new() -> Self {
        Self {
            text: String::with_capacity(512),
        }
    }

    /// Trim, case-fold and append a fragment
    pub fn append(&mut self, fragment: &str) {
        self.text.push_str(&normalize(fragment));
    }

    /// Run the moderator over the buffered text without mutating it
    pub fn check(&self, moderator: &dyn Moderator, wordlist: &[String]) -> bool {
        !self.text.is_empty() && moderator.contains(&self.text, wordlist)
    }

    /// Clear the buffer after a violation notice was sent
    pub fn reset(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
