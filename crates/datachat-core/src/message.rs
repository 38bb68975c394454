//! UI-agnostic transcript types
//!
//! These are shared between front-ends and don't depend on any specific UI
//! framework. Renderers only ever get shared access to a [`Transcript`];
//! appending goes through the session controller.

use serde::{Deserialize, Serialize};

/// Who a transcript entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// Locally synthesized notices (help text, mode switches, redirects)
    System,
    Ai,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::System => "System",
            Sender::Ai => "AI",
        }
    }
}

/// One entry in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    /// Display text, may contain line breaks
    pub text: String,
    /// Set only on messages reporting a downloadable transformed dataset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            download_url: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Sender::Ai, text)
    }

    pub fn download(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            sender: Sender::Ai,
            text: text.into(),
            download_url: Some(url.into()),
        }
    }
}

/// Ordered, append-only log of messages. Insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Messages appended at or after `start`, for callers diffing before/after an operation
    pub fn since(&self, start: usize) -> &[Message] {
        self.messages.get(start..).unwrap_or(&[])
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
