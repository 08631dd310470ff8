use serde::{Deserialize, Serialize};

use crate::classify::RuleClassifier;
use crate::compare::ComparisonSpec;
use crate::error::LinkageError;
use crate::keys::{BlockingKey, KeyFunction};
use crate::selection::{candidate_pool, SelectorParams};
use crate::similarity::SimilarityConfig;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LinkageConfig {
    pub name: String,
    pub datasets: DatasetsConfig,
    pub ground_truth: GroundTruthConfig,
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    pub comparisons: Vec<ComparisonSpec>,
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsConfig {
    pub a: DatasetConfig,
    pub b: DatasetConfig,
}

/// One CSV source.
///
/// Record values are the row's columns by position, so attribute indices in
/// the rest of the config are CSV column indices. Columns missing from
/// `attributes` load as empty values.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub file: String,
    #[serde(default)]
    pub id_column: usize,
    #[serde(default)]
    pub attributes: Option<Vec<usize>>,
    #[serde(default = "default_true")]
    pub has_header: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundTruthConfig {
    pub file: String,
    #[serde(default = "default_true")]
    pub has_header: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BlockingConfig {
    /// Compare every record of A with every record of B.
    None,
    /// One scheme: records share a block iff all keys agree.
    Conjunctive { keys: Vec<BlockingKey> },
    /// Several conjunctive schemes combined with OR.
    Disjunctive { schemes: Vec<Vec<BlockingKey>> },
    /// Learn a disjunctive scheme from the ground truth.
    Selected(SelectionConfig),
}

/// Candidate pool and parameters of the blocking-key selector.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Explicit candidates, evaluated before any generated ones.
    #[serde(default)]
    pub candidates: Vec<BlockingKey>,
    /// Generate `functions × attributes` candidates.
    #[serde(default)]
    pub pool: Option<PoolConfig>,
    #[serde(default = "default_training_size")]
    pub training_size: usize,
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_max_block_size_ratio")]
    pub max_block_size_ratio: f64,
    #[serde(default = "default_selection_seed")]
    pub seed: u64,
    #[serde(default)]
    pub max_feature_iterations: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub functions: Vec<KeyFunction>,
    pub attributes: Vec<usize>,
}

fn default_training_size() -> usize {
    SelectorParams::default().training_size
}

fn default_eps() -> f64 {
    SelectorParams::default().eps
}

fn default_max_block_size_ratio() -> f64 {
    SelectorParams::default().max_block_size_ratio
}

fn default_selection_seed() -> u64 {
    SelectorParams::default().seed
}

impl SelectionConfig {
    /// Explicit candidates followed by the generated pool.
    pub fn candidate_pool(&self) -> Vec<BlockingKey> {
        let mut pool = self.candidates.clone();
        if let Some(generated) = &self.pool {
            for key in candidate_pool(&generated.functions, &generated.attributes) {
                if !pool.contains(&key) {
                    pool.push(key);
                }
            }
        }
        pool
    }

    pub fn params(&self) -> SelectorParams {
        SelectorParams {
            training_size: self.training_size,
            eps: self.eps,
            max_block_size_ratio: self.max_block_size_ratio,
            seed: self.seed,
            max_feature_iterations: self.max_feature_iterations,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification + Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClassificationConfig {
    Exact,
    Threshold { threshold: f64 },
    MinThreshold { threshold: f64 },
    /// Weights default to [`crate::classify::automatic_weights`] when omitted.
    Weighted {
        threshold: f64,
        #[serde(default)]
        weights: Option<Vec<f64>>,
    },
    DecisionTree {
        #[serde(default)]
        max_depth: Option<u16>,
    },
}

impl ClassificationConfig {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Threshold { .. } => "threshold",
            Self::MinThreshold { .. } => "min_threshold",
            Self::Weighted { .. } => "weighted",
            Self::DecisionTree { .. } => "decision_tree",
        }
    }

    /// Rule classifier for this config, `None` for trainable methods.
    pub fn rule(&self, weights: Option<&[f64]>) -> Option<RuleClassifier> {
        match self {
            Self::Exact => Some(RuleClassifier::Exact),
            Self::Threshold { threshold } => Some(RuleClassifier::Threshold(*threshold)),
            Self::MinThreshold { threshold } => Some(RuleClassifier::MinThreshold(*threshold)),
            Self::Weighted { threshold, .. } => Some(RuleClassifier::Weighted {
                weights: weights.map(<[f64]>::to_vec).unwrap_or_default(),
                threshold: *threshold,
            }),
            Self::DecisionTree { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_fold_seed")]
    pub seed: u64,
}

fn default_folds() -> usize {
    5
}

fn default_fold_seed() -> u64 {
    37
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            seed: default_fold_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

fn check_threshold(threshold: f64) -> Result<(), LinkageError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(LinkageError::Config(format!(
            "classification threshold must be in [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

impl LinkageConfig {
    pub fn from_toml(input: &str) -> Result<Self, LinkageError> {
        let config: LinkageConfig =
            toml::from_str(input).map_err(|e| LinkageError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinkageError> {
        for (label, dataset) in [("a", &self.datasets.a), ("b", &self.datasets.b)] {
            if let Some(attributes) = &dataset.attributes {
                if attributes.contains(&dataset.id_column) {
                    return Err(LinkageError::Config(format!(
                        "dataset {label}: id column {} is also listed as an attribute",
                        dataset.id_column
                    )));
                }
            }
        }

        match &self.blocking {
            BlockingConfig::None => {}
            BlockingConfig::Conjunctive { keys } => {
                if keys.is_empty() {
                    return Err(LinkageError::Config("conjunctive blocking needs at least one key".into()));
                }
            }
            BlockingConfig::Disjunctive { schemes } => {
                if schemes.is_empty() || schemes.iter().any(Vec::is_empty) {
                    return Err(LinkageError::Config(
                        "disjunctive blocking needs non-empty schemes".into(),
                    ));
                }
            }
            BlockingConfig::Selected(selection) => {
                if selection.candidate_pool().is_empty() {
                    return Err(LinkageError::Config("blocking key candidate pool is empty".into()));
                }
                selection.params().validate()?;
            }
        }

        self.similarity.validate()?;
        if self.comparisons.is_empty() {
            return Err(LinkageError::Config("at least one comparison is required".into()));
        }

        match &self.classification {
            ClassificationConfig::Exact | ClassificationConfig::DecisionTree { .. } => {}
            ClassificationConfig::Threshold { threshold }
            | ClassificationConfig::MinThreshold { threshold } => check_threshold(*threshold)?,
            ClassificationConfig::Weighted { threshold, weights } => {
                check_threshold(*threshold)?;
                if let Some(weights) = weights {
                    if weights.len() != self.comparisons.len() {
                        return Err(LinkageError::Config(format!(
                            "{} weight(s) for {} comparison(s)",
                            weights.len(),
                            self.comparisons.len()
                        )));
                    }
                }
            }
        }

        if self.evaluation.folds < 2 {
            return Err(LinkageError::Config(format!(
                "evaluation.folds must be at least 2, got {}",
                self.evaluation.folds
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
