//! In-memory message log

use super::message::Message;

/// Ordered messages of one session, oldest first.
///
/// Insertion order is the conversation order; nothing is ever reordered or
/// deduplicated.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the end
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Copy of the full log. Later appends are not reflected in it.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// The last `max_messages` messages, in order
    pub fn recent(&self, max_messages: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max_messages);
        &self.messages[start..]
    }

    /// Most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drop all messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<Message> {
        self.messages.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = MessageLog::new();
        for i in 0..10 {
            log.append(Message::human(format!("Message {}", i)));
        }

        let contents: Vec<String> = log.snapshot().into_iter().map(|m| m.content).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("Message {}", i)).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_snapshot_is_not_live() {
        let mut log = MessageLog::new();
        log.append(Message::human("first"));
        let snapshot = log.snapshot();
        log.append(Message::assistant("second"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_recent() {
        let mut log = MessageLog::new();
        for i in 0..60 {
            log.append(Message::human(format!("Message {}", i)));
        }

        let recent = log.recent(50);
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].content, "Message 10");
        assert_eq!(log.recent(100).len(), 60);
    }

    #[test]
    fn test_clear() {
        let mut log = MessageLog::new();
        log.append(Message::system("You are a helpful AI assistant."));
        log.clear();
        assert!(log.is_empty());
        assert!(log.last().is_none());
    }
}
