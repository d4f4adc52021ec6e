use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Who sent a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Sender {
    Customer,
    Agent,
    /// Any sender label the upload did not recognize
    Unknown,
}

impl Sender {
    /// Parse a sender label; unrecognized labels fold to `Unknown`
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "customer" => Sender::Customer,
            "agent" => Sender::Agent,
            _ => Sender::Unknown,
        }
    }

    /// Capitalized name used when rendering prompts and reports
    pub fn display(&self) -> &'static str {
        match self {
            Sender::Customer => "Customer",
            Sender::Agent => "Agent",
            Sender::Unknown => "Unknown",
        }
    }
}

impl From<String> for Sender {
    fn from(label: String) -> Self {
        Sender::parse(&label)
    }
}

/// A single message in a chat transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// When the message was sent, if the upload recorded it
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: None,
        }
    }
}

/// Uploads sometimes carry empty or malformed timestamp strings; treat
/// anything that is not RFC 3339 as absent rather than failing the parse.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}

/// An ordered customer service conversation.
///
/// Message order is conversation order and is never rearranged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Count messages from a given sender
    pub fn count_from(&self, sender: Sender) -> usize {
        self.messages.iter().filter(|m| m.sender == sender).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_parse_folds_unknown() {
        assert_eq!(Sender::parse("customer"), Sender::Customer);
        assert_eq!(Sender::parse(" Agent "), Sender::Agent);
        assert_eq!(Sender::parse("system"), Sender::Unknown);
        assert_eq!(Sender::parse(""), Sender::Unknown);
    }

    #[test]
    fn test_message_deserializes_bad_timestamp_as_none() {
        let json = r#"{"sender": "agent", "text": "hello", "timestamp": ""}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.sender, Sender::Agent);
        assert!(message.timestamp.is_none());
    }

    #[test]
    fn test_message_deserializes_rfc3339_timestamp() {
        let json = r#"{"sender": "customer", "text": "hi", "timestamp": "2024-05-01T10:22:00Z"}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert!(message.timestamp.is_some());
    }

    #[test]
    fn test_count_from() {
        let transcript = Transcript::new(vec![
            Message::new(Sender::Customer, "hi"),
            Message::new(Sender::Agent, "hello"),
            Message::new(Sender::Customer, "my order is late"),
        ]);
        assert_eq!(transcript.count_from(Sender::Customer), 2);
        assert_eq!(transcript.count_from(Sender::Agent), 1);
        assert_eq!(transcript.len(), 3);
    }
}
