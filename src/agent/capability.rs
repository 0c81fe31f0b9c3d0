//! Capabilities, lexical capability matching, and confidence updates.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A named, confidence-scored skill an agent declares it can perform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Name, unique within an agent
    pub name: String,

    /// Free-text description used for lexical matching
    pub description: String,

    /// Ordered required parameter names
    pub parameters: Vec<String>,

    /// Running confidence estimate in [0, 1]
    pub confidence: f64,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Scores declared capabilities against a task and selects the best
/// match.
///
/// The score is a lexical-overlap heuristic, not semantic matching:
/// the fraction of the capability's description tokens (lowercased,
/// whitespace-split) that appear as substrings of the serialized task,
/// multiplied by the capability's current confidence.
pub struct CapabilityMatcher;

impl CapabilityMatcher {
    /// Score one capability against a task
    pub fn score(capability: &Capability, task: &JsonValue) -> f64 {
        let task_text = task.to_string().to_lowercase();
        let description = capability.description.to_lowercase();

        let tokens: Vec<&str> = description.split_whitespace().collect();
        if tokens.is_empty() {
            return 0.0;
        }

        let matching = tokens.iter().filter(|t| task_text.contains(**t)).count();
        (matching as f64 / tokens.len() as f64) * capability.confidence
    }

    /// Select the strictly best-scoring capability for the task.
    ///
    /// Ties keep first-declared order. Returns `None` when every
    /// capability scores exactly zero.
    pub fn best_match<'a>(capabilities: &'a [Capability], task: &JsonValue) -> Option<&'a Capability> {
        let mut best: Option<(&Capability, f64)> = None;

        for capability in capabilities {
            let score = Self::score(capability, task);
            debug!("Capability '{}' scored {:.3}", capability.name, score);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ if score > 0.0 => best = Some((capability, score)),
                _ => {}
            }
        }

        best.map(|(c, _)| c)
    }
}

/// Adjusts a capability's confidence after each execution using a
/// first-order exponential moving average of the outcome signal.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceUpdater {
    learning_rate: f64,
}

impl ConfidenceUpdater {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// `new = clamp(old + rate * (signal - old), 0, 1)`. The clamp is
    /// mandatory: extreme signals must never push confidence outside
    /// [0, 1].
    pub fn update(&self, capability: &mut Capability, outcome_signal: f64) -> f64 {
        let updated = (capability.confidence
            + self.learning_rate * (outcome_signal - capability.confidence))
            .clamp(0.0, 1.0);
        capability.confidence = updated;
        updated
    }
}

impl Default for ConfidenceUpdater {
    fn default() -> Self {
        Self { learning_rate: 0.1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn text_analysis() -> Capability {
        Capability::new(
            "textAnalysis",
            "Analyze text content",
            vec!["content".to_string()],
            0.9,
        )
    }

    #[test]
    fn test_score_is_word_fraction_times_confidence() {
        let capability = text_analysis();
        let task = json!({"content": "please analyze this text"});

        // All 3 description tokens appear in the serialized task
        let score = CapabilityMatcher::score(&capability, &task);
        assert!((score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_score_partial_overlap() {
        let capability = Capability::new(
            "patternRecognition",
            "Identify patterns in data",
            vec!["data".to_string()],
            0.8,
        );
        let task = json!({"data": "find the patterns here"});

        // "patterns", "in" (substring of "find"), "data" match; "identify" does not
        let score = CapabilityMatcher::score(&capability, &task);
        assert!((score - (3.0 / 4.0) * 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_best_match_none_when_all_scores_zero() {
        let capabilities = vec![Capability::new(
            "unrelated",
            "quantum flux harmonizer",
            vec![],
            0.9,
        )];
        let task = json!({"content": "summarize the report"});
        assert!(CapabilityMatcher::best_match(&capabilities, &task).is_none());
    }

    #[test]
    fn test_best_match_ties_keep_declaration_order() {
        let capabilities = vec![
            Capability::new("first", "analyze text", vec![], 0.5),
            Capability::new("second", "analyze text", vec![], 0.5),
        ];
        let task = json!({"content": "analyze this text"});

        let best = CapabilityMatcher::best_match(&capabilities, &task).unwrap();
        assert_eq!(best.name, "first");
    }

    #[test]
    fn test_best_match_picks_strictly_higher_score() {
        let capabilities = vec![
            Capability::new("weak", "analyze text", vec![], 0.2),
            Capability::new("strong", "analyze text", vec![], 0.9),
        ];
        let task = json!({"content": "analyze this text"});

        let best = CapabilityMatcher::best_match(&capabilities, &task).unwrap();
        assert_eq!(best.name, "strong");
    }

    #[test]
    fn test_update_moves_toward_signal() {
        let updater = ConfidenceUpdater::new(0.1);
        let mut capability = text_analysis();

        let updated = updater.update(&mut capability, 1.0);
        assert!((updated - 0.91).abs() < 1e-12);

        let updated = updater.update(&mut capability, 0.0);
        assert!((updated - 0.819).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_confidence_stays_in_unit_interval(
            start in 0.0f64..=1.0,
            rate in 0.0f64..=1.0,
            signals in proptest::collection::vec(-10.0f64..10.0, 0..50)
        ) {
            let updater = ConfidenceUpdater::new(rate);
            let mut capability = Capability::new("c", "d", vec![], start);
            for signal in signals {
                let updated = updater.update(&mut capability, signal);
                prop_assert!((0.0..=1.0).contains(&updated));
            }
        }
    }
}
