//! Extracted exercise requirements
//!
//! Partially-populated fields pulled out of the teacher's free-text
//! prompt by the validation stage. Fields stay optional until validation
//! declares the set complete.

use serde::{Deserialize, Serialize};

/// Structured requirements extracted from the initial prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    /// Target language of the exercises (e.g. "German")
    pub language: Option<String>,

    /// Proficiency level (e.g. "B1", CEFR-style)
    pub level: Option<String>,

    /// Subject matter (e.g. "food")
    pub topic: Option<String>,

    /// Total intended duration in minutes
    pub duration_minutes: Option<u32>,

    /// Requested exercise types (e.g. "cloze", "multiple_choice")
    pub exercise_types: Vec<String>,

    /// Free-form context the teacher provided
    pub context: Option<String>,
}

impl Requirements {
    /// Required fields that are still unset
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.language.is_none() {
            missing.push("language");
        }
        if self.level.is_none() {
            missing.push("level");
        }
        if self.topic.is_none() {
            missing.push("topic");
        }
        missing
    }

    /// Check whether all required fields are present
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Merge newer values over this set, keeping existing values where
    /// the update leaves them unset
    pub fn merge(&mut self, update: Requirements) {
        if update.language.is_some() {
            self.language = update.language;
        }
        if update.level.is_some() {
            self.level = update.level;
        }
        if update.topic.is_some() {
            self.topic = update.topic;
        }
        if update.duration_minutes.is_some() {
            self.duration_minutes = update.duration_minutes;
        }
        if !update.exercise_types.is_empty() {
            self.exercise_types = update.exercise_types;
        }
        if update.context.is_some() {
            self.context = update.context;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Requirements {
        Requirements {
            language: Some("German".to_string()),
            level: Some("B1".to_string()),
            topic: Some("food".to_string()),
            duration_minutes: Some(30),
            exercise_types: vec!["cloze".to_string()],
            context: None,
        }
    }

    #[test]
    fn test_missing_fields() {
        let mut req = Requirements::default();
        assert_eq!(req.missing_fields(), vec!["language", "level", "topic"]);
        assert!(!req.is_complete());

        req.language = Some("German".to_string());
        assert_eq!(req.missing_fields(), vec!["level", "topic"]);

        assert!(complete().is_complete());
    }

    #[test]
    fn test_merge_keeps_existing() {
        let mut req = complete();
        req.merge(Requirements {
            topic: Some("travel".to_string()),
            ..Default::default()
        });

        assert_eq!(req.topic.as_deref(), Some("travel"));
        assert_eq!(req.language.as_deref(), Some("German"));
        assert_eq!(req.exercise_types, vec!["cloze".to_string()]);
    }
}
