/// Scoring models: the `predict(vector) -> scalar` capability used for CTR, CVR and bid price.
///
/// Trained models arrive as JSON artifacts tagged by `kind`. Three families are understood:
/// - `linear`: weighted sum plus intercept, optionally through a logistic link (logistic regression)
/// - `tree_ensemble`: sum of regression trees plus a base score (gradient boosting), optional link
/// - `constant`: a fixed score, for advertisers scored by a flat rate
///
/// Artifacts are validated once when converted into a model, so prediction never indexes out of
/// bounds or loops.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Trait for trained models that turn a feature vector into one score
pub trait ScoringModel: Send + Sync {
    /// Score one feature vector
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Get a string representation of the model family and shape
    fn model_type(&self) -> String;
}

/// Output transform applied to the raw margin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    #[default]
    Identity,
    Logistic,
}

impl Link {
    pub fn apply(self, margin: f64) -> f64 {
        match self {
            Link::Identity => margin,
            Link::Logistic => 1.0 / (1.0 + (-margin).exp()),
        }
    }
}

fn check_arity(expected: usize, features: &[f64]) -> Result<(), ModelError> {
    if features.len() != expected {
        return Err(ModelError::FeatureArity {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

fn check_finite(score: f64) -> Result<f64, ModelError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(ModelError::NonFiniteOutput(score))
    }
}

/// Linear model: link(intercept + Σ weight[i] × feature[i])
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub link: Link,
}

impl ScoringModel for LinearModel {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_arity(self.weights.len(), features)?;
        let margin = self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(weight, value)| weight * value)
                .sum::<f64>();
        check_finite(self.link.apply(margin))
    }

    fn model_type(&self) -> String {
        format!("Linear ({} features, {:?} link)", self.weights.len(), self.link)
    }
}

/// One node of a regression tree. Nodes are stored in an array, root first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// `features[feature] < threshold` goes to `left`, everything else (including NaN) to `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn validate(&self, num_features: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidArtifact("tree without nodes".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, threshold, left, right } = node {
                if *feature >= num_features {
                    return Err(ModelError::InvalidArtifact(format!(
                        "node {} splits on feature {} of {}",
                        index, feature, num_features
                    )));
                }
                if threshold.is_nan() {
                    return Err(ModelError::InvalidArtifact(format!("node {} has a NaN threshold", index)));
                }
                // children must come after their parent, which rules out cycles
                for child in [left, right] {
                    if *child <= index || *child >= self.nodes.len() {
                        return Err(ModelError::InvalidArtifact(format!(
                            "node {} points to invalid child {}",
                            index, child
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    index = if features[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Additive tree ensemble: link(base_score + Σ tree(features))
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub num_features: usize,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default)]
    pub link: Link,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn validate(&self) -> Result<(), ModelError> {
        for tree in &self.trees {
            tree.validate(self.num_features)?;
        }
        Ok(())
    }
}

impl ScoringModel for TreeEnsemble {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_arity(self.num_features, features)?;
        let margin = self.base_score + self.trees.iter().map(|tree| tree.evaluate(features)).sum::<f64>();
        check_finite(self.link.apply(margin))
    }

    fn model_type(&self) -> String {
        format!("Tree ensemble ({} trees, {:?} link)", self.trees.len(), self.link)
    }
}

/// Fixed score regardless of the features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantModel {
    pub value: f64,
}

impl ScoringModel for ConstantModel {
    fn predict(&self, _features: &[f64]) -> Result<f64, ModelError> {
        check_finite(self.value)
    }

    fn model_type(&self) -> String {
        format!("Constant ({})", self.value)
    }
}

/// Serialized model, as written by the training pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
    Constant(ConstantModel),
}

impl ModelArtifact {
    /// Validate the artifact and turn it into a boxed scoring model
    pub fn into_model(self) -> Result<Box<dyn ScoringModel>, ModelError> {
        match self {
            ModelArtifact::Linear(model) => {
                if !model.intercept.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
                    return Err(ModelError::InvalidArtifact("linear model has non-finite coefficients".to_string()));
                }
                Ok(Box::new(model))
            }
            ModelArtifact::TreeEnsemble(model) => {
                model.validate()?;
                Ok(Box::new(model))
            }
            ModelArtifact::Constant(model) => {
                check_finite(model.value)?;
                Ok(Box::new(model))
            }
        }
    }
}
