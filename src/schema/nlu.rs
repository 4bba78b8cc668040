//! NLU results attached to a call
//!
//! Produced by the same external step as v3 markers and rolled up by the v3
//! aggregator.

use serde::{Deserialize, Serialize};

use super::Speaker;

/// Disclosures every call must contain for regulatory compliance
pub const REQUIRED_DISCLOSURES: [&str; 3] = [
    "recording_notice",
    "identity_verification",
    "rights_statement",
];

/// A detected customer intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDetection {
    pub intent: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Something a party agreed to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub party: Speaker,
    pub description: String,
    /// Free-form deadline as spoken ("by Friday")
    #[serde(default)]
    pub deadline: Option<String>,
}

/// Whether a disclosure was delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisclosureCheck {
    pub disclosure_type: String,
    pub present: bool,
}

/// A named entity mentioned in the call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub entity_type: String,
    pub text: String,
}

/// NLU output for one call (or one chunk before merging)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NluResults {
    pub intents: Vec<IntentDetection>,
    pub obligations: Vec<Obligation>,
    pub disclosures: Vec<DisclosureCheck>,
    pub entities: Vec<EntityMention>,
}

impl NluResults {
    /// Append another chunk's results
    pub fn merge(&mut self, other: NluResults) {
        self.intents.extend(other.intents);
        self.obligations.extend(other.obligations);
        self.disclosures.extend(other.disclosures);
        self.entities.extend(other.entities);
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
            && self.obligations.is_empty()
            && self.disclosures.is_empty()
            && self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_concatenates() {
        let mut a = NluResults {
            intents: vec![IntentDetection {
                intent: "cancel".to_string(),
                confidence: 0.8,
            }],
            ..Default::default()
        };
        let b = NluResults {
            entities: vec![EntityMention {
                entity_type: "amount".to_string(),
                text: "$40".to_string(),
            }],
            ..Default::default()
        };

        a.merge(b);
        assert_eq!(a.intents.len(), 1);
        assert_eq!(a.entities.len(), 1);
        assert!(!a.is_empty());
        assert!(NluResults::default().is_empty());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let nlu: NluResults = serde_json::from_str(r#"{"intents": [{"intent": "pay"}]}"#).unwrap();
        assert_eq!(nlu.intents[0].confidence, 0.0);
        assert!(nlu.obligations.is_empty());
    }
}
