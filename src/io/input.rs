use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::models::{Guideline, Message, Transcript};

/// Wrapper shape some exporters produce around the message list
#[derive(Deserialize)]
struct TranscriptFile {
    messages: Vec<Message>,
}

/// Parse a transcript JSON file
pub fn parse_transcript_file(path: &Path) -> Result<Transcript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_transcript_json(&content)
}

/// Parse transcript JSON: either a bare message array or a
/// `{"messages": [...]}` wrapper.
///
/// Messages with empty text are dropped with a warning; order is preserved.
pub fn parse_transcript_json(json: &str) -> Result<Transcript> {
    let messages: Vec<Message> = match serde_json::from_str::<Vec<Message>>(json) {
        Ok(messages) => messages,
        Err(_) => {
            serde_json::from_str::<TranscriptFile>(json)
                .context("Failed to parse transcript JSON")?
                .messages
        }
    };

    let mut kept = Vec::with_capacity(messages.len());
    let mut dropped = 0usize;
    for message in messages {
        if message.text.trim().is_empty() {
            dropped += 1;
            continue;
        }
        kept.push(message);
    }
    if dropped > 0 {
        warn!("Dropped {} empty message(s) from transcript", dropped);
    }

    Ok(Transcript::new(kept))
}

/// Parse a guideline override file: a JSON array of
/// `{"key": "...", "description": "..."}` objects
pub fn parse_guidelines_file(path: &Path) -> Result<Vec<Guideline>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {:?}", path))?;
    let guidelines: Vec<Guideline> =
        serde_json::from_str(&content).context("Failed to parse guidelines JSON")?;
    Ok(guidelines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;

    #[test]
    fn test_parse_bare_message_array() {
        let json = r#"[
            {"sender": "customer", "text": "Hi, my package is late."},
            {"sender": "agent", "text": "Let me check."},
            {"sender": "system", "text": "transferred"}
        ]"#;

        let transcript = parse_transcript_json(json).unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages[0].sender, Sender::Customer);
        assert_eq!(transcript.messages[2].sender, Sender::Unknown);
    }

    #[test]
    fn test_parse_wrapped_messages() {
        let json = r#"{"messages": [{"sender": "agent", "text": "Hello!"}]}"#;
        let transcript = parse_transcript_json(json).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages[0].text, "Hello!");
    }

    #[test]
    fn test_empty_messages_are_dropped_in_order() {
        let json = r#"[
            {"sender": "customer", "text": "first"},
            {"sender": "agent", "text": "   "},
            {"sender": "customer", "text": "second"}
        ]"#;

        let transcript = parse_transcript_json(json).unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages[0].text, "first");
        assert_eq!(transcript.messages[1].text, "second");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(parse_transcript_json("not json").is_err());
        assert!(parse_transcript_json(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn test_parse_transcript_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"sender": "customer", "text": "hello", "timestamp": "2024-05-01T10:22:00Z"}}]"#
        )
        .unwrap();

        let transcript = parse_transcript_file(file.path()).unwrap();
        assert_eq!(transcript.len(), 1);
        assert!(transcript.messages[0].timestamp.is_some());
    }

    #[test]
    fn test_parse_guidelines_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"key": "Be Kind", "description": "Stay friendly."}}]"#
        )
        .unwrap();

        let guidelines = parse_guidelines_file(file.path()).unwrap();
        assert_eq!(guidelines.len(), 1);
        assert_eq!(guidelines[0].key, "Be Kind");
    }
}
