use serde::{Deserialize, Serialize};

/// A named compliance criterion checked during the analysis stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guideline {
    /// Unique display name, e.g. "Acknowledge and Empathize"
    pub key: String,
    /// What an agent must do to satisfy the criterion
    pub description: String,
}

impl Guideline {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
        }
    }
}

/// Built-in guideline set used when the caller supplies no override.
///
/// Injected at pipeline construction and never mutated in place.
pub fn default_guidelines() -> Vec<Guideline> {
    vec![
        Guideline::new(
            "Acknowledge and Empathize",
            "Recognize the customer's problem and show empathy before moving to solutions.",
        ),
        Guideline::new(
            "Set Clear Expectations",
            "State what will happen next and when the customer can expect it.",
        ),
        Guideline::new(
            "Proactive Help",
            "Offer relevant assistance beyond the literal request instead of deflecting.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_guidelines_have_unique_keys() {
        let guidelines = default_guidelines();
        assert_eq!(guidelines.len(), 3);
        let mut keys: Vec<&str> = guidelines.iter().map(|g| g.key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 3);
    }
}
