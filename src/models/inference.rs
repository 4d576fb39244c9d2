use serde::{Deserialize, Serialize};

/// Number of technique classes the upstream model emits.
pub const CLASS_COUNT: usize = 4;

/// Output of one model inference over a window of readings. Replaced wholesale
/// by the next inference; never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceResult {
    pub class_index: u32,
    pub class_label: String,
    /// Per-class probabilities. Upstream rounding means these need not sum to
    /// exactly 1.
    pub probs: Vec<f64>,
}

impl InferenceResult {
    /// Probability assigned to the predicted class, if the index is in range.
    pub fn confidence(&self) -> Option<f64> {
        self.probs.get(self.class_index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(class_index: u32, probs: &[f64]) -> InferenceResult {
        InferenceResult {
            class_index,
            class_label: "Stable".into(),
            probs: probs.to_vec(),
        }
    }

    #[test]
    fn confidence_is_probability_of_predicted_class() {
        assert_eq!(result(2, &[0.1, 0.2, 0.6, 0.1]).confidence(), Some(0.6));
        assert_eq!(result(7, &[0.1, 0.2, 0.6, 0.1]).confidence(), None);
    }
}
