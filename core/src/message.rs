//! Conversation message types and the priority lattice the context manager
//! compresses against. Grounded on the teacher's `ConversationHistory`
//! (role-tagged, insertion-ordered items) and the Python original's
//! `_calculate_message_priority`, collapsed here to a single ordered
//! enum rather than the several overlapping priority schemes the original
//! carried.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content segment. Most messages carry exactly one `Text`
/// segment; tool-enabled multimodal turns may interleave image references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSegment {
    Text { text: String },
    ImageRef { uri: String },
}

impl ContentSegment {
    pub fn text(s: impl Into<String>) -> Self {
        ContentSegment::Text { text: s.into() }
    }

    fn approx_tokens(&self) -> usize {
        match self {
            ContentSegment::Text { text } => estimate_tokens(text),
            ContentSegment::ImageRef { .. } => 85,
        }
    }

    fn as_str(&self) -> &str {
        match self {
            ContentSegment::Text { text } => text,
            ContentSegment::ImageRef { uri } => uri,
        }
    }
}

/// Ordered lattice the context manager compresses against, poorest-first.
/// `Protected` messages are never dropped or compressed; everything else is
/// fair game, cheapest (`Archival`) first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Archival,
    Relevant,
    Working,
    Recent,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentSegment>,
    pub priority: Priority,
    /// Set once a compression pass has replaced the original content.
    #[serde(default)]
    pub compressed: bool,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>, priority: Priority) -> Self {
        Self {
            role,
            content: vec![ContentSegment::text(text)],
            priority,
            compressed: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text, Priority::Protected)
    }

    pub fn user(text: impl Into<String>, priority: Priority) -> Self {
        Self::new(Role::User, text, priority)
    }

    pub fn assistant(text: impl Into<String>, priority: Priority) -> Self {
        Self::new(Role::Assistant, text, priority)
    }

    pub fn tool_result(text: impl Into<String>, priority: Priority) -> Self {
        Self::new(Role::Tool, text, priority)
    }

    pub fn approx_tokens(&self) -> usize {
        self.content.iter().map(ContentSegment::approx_tokens).sum()
    }

    pub fn text(&self) -> String {
        self.content.iter().map(ContentSegment::as_str).collect::<Vec<_>>().join("")
    }
}

/// Best-effort local token estimate. Mixed-script heuristic: plain ASCII
/// words count at roughly one token each, everything else (spacing aside)
/// is counted per-character at 1.5 tokens — cheap enough to run on every
/// message without a tokenizer dependency.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut ascii_words = 0usize;
    let mut other_chars = 0usize;
    for word in text.split_whitespace() {
        if word.is_ascii() {
            ascii_words += 1;
        } else {
            other_chars += word.chars().count();
        }
    }
    let ascii_tokens = ascii_words;
    let other_tokens = (other_chars as f64 * 1.5).ceil() as usize;
    (ascii_tokens + other_tokens).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_lattice_orders_protected_highest() {
        assert!(Priority::Protected > Priority::Recent);
        assert!(Priority::Recent > Priority::Working);
        assert!(Priority::Working > Priority::Relevant);
        assert!(Priority::Relevant > Priority::Archival);
    }

    #[test]
    fn estimate_tokens_counts_mixed_script_text() {
        assert_eq!(estimate_tokens(""), 0);
        assert!(estimate_tokens("hello world") >= 2);
        assert!(estimate_tokens("你好世界") >= 4);
    }
}
