//! Pre-trained decision-tree ensemble.
//!
//! Models are stored as JSON:
//!
//! ```json
//! {
//!   "feature_names": ["hr_mean", "...", "eda_slope"],
//!   "trees": [
//!     { "nodes": [
//!       { "type": "split", "feature": 7, "threshold": 12.5, "left": 1, "right": 2 },
//!       { "type": "leaf", "value": [0.9, 0.1] },
//!       { "type": "leaf", "value": [0.2, 0.8] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A sample goes left when its feature value is `<= threshold`. Leaf values are
//! class weights `[no_stress, stress]` and are normalized on evaluation.

use super::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::error::ClassifierUnavailableError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A node of a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: [f64; 2],
    },
}

/// One tree, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Class probabilities `[no_stress, stress]` for one sample.
    pub fn evaluate(&self, features: &[f64; FEATURE_COUNT]) -> [f64; 2] {
        let mut index = 0;
        // Validation guarantees children come after their parent, so this
        // walk terminates within nodes.len() steps
        for _ in 0..self.nodes.len() {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => {
                    let total = value[0] + value[1];
                    return [value[0] / total, value[1] / total];
                }
            }
        }
        [0.5, 0.5]
    }

    fn validate(&self, tree: usize) -> Result<(), ClassifierUnavailableError> {
        let invalid = |msg: String| ClassifierUnavailableError::Invalid(format!("tree {tree}: {msg}"));

        if self.nodes.is_empty() {
            return Err(invalid("no nodes".to_string()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(invalid(format!("node {i} uses feature {feature}")));
                    }
                    if !threshold.is_finite() {
                        return Err(invalid(format!("node {i} has a non-finite threshold")));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(invalid(format!("node {i} has bad child {child}")));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    let ok = value.iter().all(|v| v.is_finite() && *v >= 0.0)
                        && value[0] + value[1] > 0.0;
                    if !ok {
                        return Err(invalid(format!("leaf {i} has invalid weights")));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Outcome of running the ensemble on one vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleVote {
    pub stress: bool,
    /// Averaged probability of the winning class
    pub confidence: f64,
    pub stress_votes: usize,
    pub trees: usize,
}

/// A random-forest style ensemble over the 15 features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModel {
    pub feature_names: Vec<String>,
    pub trees: Vec<DecisionTree>,
}

impl EnsembleModel {
    /// Load and validate a model file.
    pub fn load(path: &Path) -> Result<Self, ClassifierUnavailableError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ClassifierUnavailableError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let model: EnsembleModel =
            serde_json::from_str(&content).map_err(|e| ClassifierUnavailableError::Format {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        model.validate()?;
        Ok(model)
    }

    /// Check feature order and tree structure.
    pub fn validate(&self) -> Result<(), ClassifierUnavailableError> {
        let expected: Vec<&str> = FEATURE_NAMES.to_vec();
        let actual: Vec<&str> = self.feature_names.iter().map(String::as_str).collect();
        if actual != expected {
            return Err(ClassifierUnavailableError::Invalid(format!(
                "feature order mismatch: expected {expected:?}, got {actual:?}"
            )));
        }
        if self.trees.is_empty() {
            return Err(ClassifierUnavailableError::Invalid(
                "ensemble has no trees".to_string(),
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i)?;
        }
        Ok(())
    }

    /// Majority vote of the trees; ties go to the class with the higher
    /// averaged probability, then to no-stress.
    pub fn vote(&self, features: &FeatureVector) -> EnsembleVote {
        let x = features.as_array();
        let mut stress_votes = 0;
        let mut sums = [0.0, 0.0];

        for tree in &self.trees {
            let p = tree.evaluate(x);
            if p[1] > p[0] {
                stress_votes += 1;
            }
            sums[0] += p[0];
            sums[1] += p[1];
        }

        let trees = self.trees.len().max(1);
        let avg = [sums[0] / trees as f64, sums[1] / trees as f64];
        let no_stress_votes = self.trees.len() - stress_votes;

        let stress = match stress_votes.cmp(&no_stress_votes) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => avg[1] > avg[0],
        };
        let confidence = if stress { avg[1] } else { avg[0] };

        EnsembleVote {
            stress,
            confidence: confidence.clamp(0.0, 1.0),
            stress_votes,
            trees: self.trees.len(),
        }
    }
}
