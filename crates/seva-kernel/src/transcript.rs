//! Session transcript and the history replayed to the classifier.

use seva_contracts::{Attachments, HistoryEntry, Message, Role};

pub const GREETING: &str = "🙏 Namaste! I'm **Seva**, your government services assistant.\n\nI can help you:\n• 📋 Apply for an Income Certificate\n• 👶 Apply for a Birth Certificate\n• 🗣️ File grievances with government departments\n• 🔍 Track your applications and grievances\n• 📑 Get reports on government schemes\n\nHow may I assist you today?";

/// Append-only message log of one session. Message ids keep counting across
/// [`Transcript::clear`], so an id is never reused within a session.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    next_seq: u64,
}

impl Transcript {
    pub fn new(timestamp: &str) -> Self {
        let mut transcript = Self {
            messages: Vec::new(),
            next_seq: 0,
        };
        transcript.append(Role::Assistant, GREETING, Attachments::default(), timestamp);
        transcript
    }

    pub fn append(
        &mut self,
        role: Role,
        text: &str,
        attachments: Attachments,
        timestamp: &str,
    ) -> &Message {
        let id = format!("msg-{}", self.next_seq);
        self.next_seq += 1;
        self.messages.push(Message {
            id,
            role,
            text: text.to_string(),
            timestamp: timestamp.to_string(),
            attachments,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages appended at or after position `index`.
    pub fn since(&self, index: usize) -> &[Message] {
        &self.messages[index.min(self.messages.len())..]
    }

    /// Conversation context for the classifier, oldest first. The greeting is
    /// part of it; the classifier sees what the user saw.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                text: m.text.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self, timestamp: &str) {
        self.messages.clear();
        self.append(Role::Assistant, GREETING, Attachments::default(), timestamp);
    }
}
