//! Priority-tagged message window with budget-driven compression (spec
//! §4.E). Grounded on the teacher's `ConversationHistory::keep_last_messages`
//! for window mechanics and the Python original's `ContextCompressor` for
//! the compress-archival-then-working-then-drop algorithm, collapsed onto
//! the single [`crate::message::Priority`] lattice.

use serde::Serialize;

use crate::message::ContentSegment;
use crate::message::Message;
use crate::message::Priority;
use crate::message::Role;

/// Number of most-recent user/assistant exchanges (a user message plus the
/// assistant turns that follow it) that `add` automatically promotes to
/// `Recent`, per spec's default of 5.
pub const DEFAULT_PROTECTED_RECENT_EXCHANGES: usize = 5;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ContextStats {
    pub tokens: usize,
    pub items: usize,
    pub protected: usize,
    pub recent: usize,
    pub working: usize,
    pub relevant: usize,
    pub archival: usize,
}

pub struct ContextManager {
    messages: Vec<Message>,
    max_tokens: usize,
    reserved_output: usize,
    protected_recent_exchanges: usize,
}

impl ContextManager {
    pub fn new(max_tokens: usize, reserved_output: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_tokens,
            reserved_output,
            protected_recent_exchanges: DEFAULT_PROTECTED_RECENT_EXCHANGES,
        }
    }

    pub fn with_protected_recent_exchanges(mut self, n: usize) -> Self {
        self.protected_recent_exchanges = n;
        self
    }

    fn budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_output)
    }

    /// Append a message to the window, then run the compression pass so the
    /// invariant (never over budget) holds after every call. "Recency" is
    /// never written back onto a message's stored priority — every pass
    /// recomputes which messages currently fall within the trailing window
    /// from scratch (see [`Self::recent_flags`]), the way the Python
    /// original's `_compress_messages` walks the full list afresh on every
    /// compression rather than pinning a message's standing permanently.
    pub fn add(&mut self, mut message: Message, priority: Priority) {
        message.priority = priority;
        self.messages.push(message);
        self.compress_to_budget();
    }

    /// For each message currently in the window, whether it falls within the
    /// last `protected_recent_exchanges` user/assistant exchanges, counted
    /// from the newest message backwards. `Protected` messages don't count
    /// towards the exchange tally but don't break the scan either, matching
    /// the shape of the original's reversed walk. This is a transient,
    /// recomputed-every-call view, never stored back onto a `Message`.
    fn recent_flags(&self) -> Vec<bool> {
        let mut flags = vec![false; self.messages.len()];
        let mut user_exchanges_seen = 0usize;
        for (idx, msg) in self.messages.iter().enumerate().rev() {
            if msg.priority == Priority::Protected {
                continue;
            }
            if user_exchanges_seen < self.protected_recent_exchanges {
                flags[idx] = true;
                if msg.role == Role::User {
                    user_exchanges_seen += 1;
                }
            } else {
                break;
            }
        }
        flags
    }

    fn total_tokens(&self) -> usize {
        self.messages.iter().map(Message::approx_tokens).sum()
    }

    /// Step 2-6 of the budget algorithm: compress archival first, then
    /// working, never protected or within the trailing recent window; if
    /// still over budget drop the lowest-priority already-compressed
    /// entries, skipping the same two categories.
    fn compress_to_budget(&mut self) {
        let budget = self.budget();
        if self.total_tokens() <= budget {
            return;
        }

        for target in [Priority::Archival, Priority::Relevant, Priority::Working] {
            if self.total_tokens() <= budget {
                return;
            }
            let recent = self.recent_flags();
            for idx in 0..self.messages.len() {
                if self.total_tokens() <= budget {
                    break;
                }
                if recent[idx] {
                    continue;
                }
                let msg = &mut self.messages[idx];
                if msg.priority == target && !msg.compressed {
                    compress_message(msg);
                }
            }
        }

        if self.total_tokens() <= budget {
            return;
        }

        // Still over: drop compressed entries, lowest priority first, never
        // protected or within the recent window.
        loop {
            if self.total_tokens() <= budget {
                break;
            }
            let recent = self.recent_flags();
            let drop_index = self
                .messages
                .iter()
                .enumerate()
                .filter(|(i, m)| m.compressed && m.priority != Priority::Protected && !recent[*i])
                .min_by_key(|(_, m)| m.priority)
                .map(|(i, _)| i);
            match drop_index {
                Some(i) => {
                    self.messages.remove(i);
                }
                None => break,
            }
        }
    }

    /// The rendered message window, in strict insertion order.
    pub fn render(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn stats(&self) -> ContextStats {
        let mut stats = ContextStats {
            tokens: self.total_tokens(),
            items: self.messages.len(),
            protected: 0,
            recent: 0,
            working: 0,
            relevant: 0,
            archival: 0,
        };
        for msg in &self.messages {
            match msg.priority {
                Priority::Protected => stats.protected += 1,
                Priority::Recent => stats.recent += 1,
                Priority::Working => stats.working += 1,
                Priority::Relevant => stats.relevant += 1,
                Priority::Archival => stats.archival += 1,
            }
        }
        stats
    }

    /// Clear the window. When `keep_protected` is set, `Protected` messages
    /// survive (the system message invariant relies on callers passing
    /// `true` here).
    pub fn clear(&mut self, keep_protected: bool) {
        if keep_protected {
            self.messages.retain(|m| m.priority == Priority::Protected);
        } else {
            self.messages.clear();
        }
    }
}

fn compress_message(msg: &mut Message) {
    let text = msg.text();
    let summary = match msg.role {
        Role::Tool => summarize_tool_result(&text),
        Role::System => head_tail_slice(&text, 400, 0),
        Role::User | Role::Assistant => head_tail_slice(&text, 200, 120),
    };
    msg.content = vec![ContentSegment::text(summary)];
    msg.compressed = true;
}

fn summarize_tool_result(text: &str) -> String {
    let keys: Vec<&str> = text
        .lines()
        .take(6)
        .filter_map(|l| l.split(':').next())
        .map(str::trim)
        .collect();
    format!("[tool] done (keys={})", keys.join(","))
}

fn head_tail_slice(text: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= head + tail {
        return text.to_string();
    }
    let head_part: String = chars[..head].iter().collect();
    if tail == 0 {
        return format!("{head_part}…");
    }
    let tail_part: String = chars[chars.len() - tail..].iter().collect();
    format!("{head_part}…{tail_part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_is_never_dropped_after_repeated_trims() {
        let mut ctx = ContextManager::new(200, 20);
        ctx.add(Message::system("you are an agent"), Priority::Protected);
        for i in 0..200 {
            ctx.add(
                Message::user(format!("message number {i} with some padding text here"), Priority::Working),
                Priority::Working,
            );
        }
        let rendered = ctx.render();
        assert_eq!(rendered.first().unwrap().role, Role::System);
    }

    #[test]
    fn output_never_exceeds_budget_minus_reserved() {
        let mut ctx = ContextManager::new(300, 50);
        ctx.add(Message::system("sys"), Priority::Protected);
        for i in 0..500 {
            ctx.add(
                Message::user(format!("some fairly long user message number {i} to pad tokens out"), Priority::Archival),
                Priority::Archival,
            );
        }
        assert!(ctx.stats().tokens <= 250);
    }

    #[test]
    fn recency_window_is_recomputed_not_pinned_forever() {
        // A message within the trailing window when it's added must become
        // compressible again once later messages push it out of that window,
        // rather than staying immune to the budget for the rest of the run.
        let mut ctx = ContextManager::new(300, 50).with_protected_recent_exchanges(2);
        ctx.add(Message::system("sys"), Priority::Protected);
        ctx.add(
            Message::user("the one message that starts out inside the trailing window", Priority::Archival),
            Priority::Archival,
        );
        for i in 0..100 {
            ctx.add(
                Message::user(format!("filler message number {i} to push the window forward"), Priority::Archival),
                Priority::Archival,
            );
        }
        assert!(ctx.stats().tokens <= 250);
        let rendered = ctx.render();
        assert!(!rendered.iter().any(|m| m.text().contains("the one message that starts out")));
    }

    #[test]
    fn clear_keep_protected_drops_everything_else() {
        let mut ctx = ContextManager::new(1000, 0);
        ctx.add(Message::system("sys"), Priority::Protected);
        ctx.add(Message::user("hi", Priority::Working), Priority::Working);
        ctx.clear(true);
        let rendered = ctx.render();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].role, Role::System);
    }
}
