//! Trainable pair classification.
//!
//! The engine only exchanges plain feature rows and boolean labels with a
//! learner through [`PairModel`], so any algorithm can be plugged in. A
//! decision tree backed by `smartcore` ships as the default.

use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters,
};

use crate::error::LinkageError;
use crate::model::{ClassifiedPairs, GroundTruth, SimilarityVectors};

/// Fit/predict capability over similarity vectors.
pub trait PairModel {
    /// Train on `features` (one row per pair) with `labels` (true = match).
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool]) -> Result<(), LinkageError>;

    /// Predict match labels, one per row. Fails if the model is untrained.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<bool>, LinkageError>;
}

type Tree = DecisionTreeClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// CART decision tree.
#[derive(Default)]
pub struct DecisionTreeModel {
    max_depth: Option<u16>,
    tree: Option<Tree>,
}

impl std::fmt::Debug for DecisionTreeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionTreeModel")
            .field("max_depth", &self.max_depth)
            .field("trained", &self.tree.is_some())
            .finish()
    }
}

impl DecisionTreeModel {
    pub fn new(max_depth: Option<u16>) -> Self {
        Self { max_depth, tree: None }
    }

    pub fn is_trained(&self) -> bool {
        self.tree.is_some()
    }
}

fn check_rows(features: &[Vec<f64>]) -> Result<(), LinkageError> {
    let width = features.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(LinkageError::Computation("feature rows are empty".into()));
    }
    if features.iter().any(|row| row.len() != width) {
        return Err(LinkageError::Computation("feature rows differ in length".into()));
    }
    Ok(())
}

impl PairModel for DecisionTreeModel {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool]) -> Result<(), LinkageError> {
        if features.is_empty() {
            return Err(LinkageError::Computation("no training pairs".into()));
        }
        if features.len() != labels.len() {
            return Err(LinkageError::Computation(format!(
                "{} feature row(s) but {} label(s)",
                features.len(),
                labels.len()
            )));
        }
        check_rows(features)?;

        let positives = labels.iter().filter(|&&l| l).count();
        if positives == 0 || positives == labels.len() {
            return Err(LinkageError::Computation(format!(
                "training data holds a single class ({positives} match(es) in {} pair(s))",
                labels.len()
            )));
        }

        let x = DenseMatrix::from_2d_vec(&features.to_vec());
        let y: Vec<u32> = labels.iter().map(|&l| u32::from(l)).collect();
        let mut params = DecisionTreeClassifierParameters::default();
        if let Some(depth) = self.max_depth {
            params = params.with_max_depth(depth);
        }
        let tree = DecisionTreeClassifier::fit(&x, &y, params)
            .map_err(|e| LinkageError::Computation(format!("decision tree fit failed: {e}")))?;

        log::info!(
            "trained decision tree on {} pair(s) ({} match(es), {} feature(s))",
            features.len(),
            positives,
            features[0].len()
        );
        self.tree = Some(tree);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<bool>, LinkageError> {
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| LinkageError::Computation("decision tree is not trained".into()))?;
        if features.is_empty() {
            return Ok(Vec::new());
        }
        check_rows(features)?;

        let x = DenseMatrix::from_2d_vec(&features.to_vec());
        let predicted = tree
            .predict(&x)
            .map_err(|e| LinkageError::Computation(format!("decision tree predict failed: {e}")))?;
        Ok(predicted.into_iter().map(|c| c == 1).collect())
    }
}

/// Feature rows and labels for training, in pair order.
///
/// A pair is labeled a match when the ground truth holds it in either id order.
pub fn training_data(vectors: &SimilarityVectors, truth: &GroundTruth) -> (Vec<Vec<f64>>, Vec<bool>) {
    vectors
        .iter()
        .map(|((a, b), v)| (v.clone(), truth.contains_either(a, b)))
        .unzip()
}

/// Fit `model` on `train` and classify every pair of `test` with it.
pub fn fit_and_classify<M: PairModel + ?Sized>(
    model: &mut M,
    train: &SimilarityVectors,
    test: &SimilarityVectors,
    truth: &GroundTruth,
) -> Result<ClassifiedPairs, LinkageError> {
    let (features, labels) = training_data(train, truth);
    model.fit(&features, &labels)?;
    classify_with_model(&*model, test)
}

/// Classify every pair of `vectors` with a trained model.
pub fn classify_with_model<M: PairModel + ?Sized>(
    model: &M,
    vectors: &SimilarityVectors,
) -> Result<ClassifiedPairs, LinkageError> {
    let features: Vec<Vec<f64>> = vectors.values().cloned().collect();
    let labels = model.predict(&features)?;
    if labels.len() != vectors.len() {
        return Err(LinkageError::Computation(format!(
            "model returned {} label(s) for {} pair(s)",
            labels.len(),
            vectors.len()
        )));
    }

    let mut out = ClassifiedPairs::default();
    for (pair, is_match) in vectors.keys().zip(labels) {
        if is_match {
            out.matches.insert(pair.clone());
        } else {
            out.non_matches.insert(pair.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PairId;

    fn pair(a: &str, b: &str) -> PairId {
        (a.to_string(), b.to_string())
    }

    fn separable() -> (SimilarityVectors, GroundTruth) {
        let mut vectors = SimilarityVectors::new();
        let mut truth = Vec::new();
        for i in 0..8 {
            let id_a = format!("a{i}");
            let id_b = format!("b{i}");
            let is_match = i % 2 == 0;
            let sim = if is_match { 0.9 } else { 0.1 };
            vectors.insert((id_a.clone(), id_b.clone()), vec![sim, sim]);
            if is_match {
                // stored in B, A order to exercise either-order labeling
                truth.push((id_b, id_a));
            }
        }
        (vectors, GroundTruth::new(truth))
    }

    #[test]
    fn labels_check_both_orders() {
        let (vectors, truth) = separable();
        let (features, labels) = training_data(&vectors, &truth);
        assert_eq!(features.len(), 8);
        assert_eq!(labels.iter().filter(|&&l| l).count(), 4);
    }

    #[test]
    fn tree_learns_separable_data() {
        let (vectors, truth) = separable();
        let mut model = DecisionTreeModel::new(Some(3));
        let out = fit_and_classify(&mut model, &vectors, &vectors, &truth).unwrap();
        assert!(model.is_trained());
        assert_eq!(out.matches.len(), 4);
        assert!(out.matches.contains(&pair("a0", "b0")));
        assert!(out.non_matches.contains(&pair("a1", "b1")));
    }

    #[test]
    fn single_class_is_degenerate() {
        let mut model = DecisionTreeModel::default();
        let err = model.fit(&[vec![0.5], vec![0.7]], &[false, false]).unwrap_err();
        assert!(matches!(err, LinkageError::Computation(_)));
        let err = model.fit(&[], &[]).unwrap_err();
        assert!(matches!(err, LinkageError::Computation(_)));
    }

    #[test]
    fn predict_requires_training() {
        let model = DecisionTreeModel::default();
        assert!(model.predict(&[vec![0.5]]).is_err());
    }

    /// Any model honoring the trait plugs in.
    struct AlwaysMatch;

    impl PairModel for AlwaysMatch {
        fn fit(&mut self, _: &[Vec<f64>], _: &[bool]) -> Result<(), LinkageError> {
            Ok(())
        }

        fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<bool>, LinkageError> {
            Ok(vec![true; features.len()])
        }
    }

    #[test]
    fn custom_model() {
        let (vectors, truth) = separable();
        let out = fit_and_classify(&mut AlwaysMatch, &vectors, &vectors, &truth).unwrap();
        assert_eq!(out.matches.len(), vectors.len());
        assert!(out.non_matches.is_empty());
    }
}
