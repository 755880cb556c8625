//! Classifier strategies
//!
//! Each strategy wraps one `smartcore` classifier family behind the
//! [`Predictor`] trait, so the recommendation pipeline can split, encode and
//! rank without knowing which model scores the events.

use serde::Deserialize;
use smartcore::{
    ensemble::random_forest_classifier::{
        RandomForestClassifier, RandomForestClassifierParameters,
    },
    linalg::basic::matrix::DenseMatrix,
    linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters},
    metrics::distance::euclidian::Euclidian,
    neighbors::knn_classifier::{KNNClassifier, KNNClassifierParameters},
    tree::decision_tree_classifier::{DecisionTreeClassifier, DecisionTreeClassifierParameters},
};
use std::sync::Arc;

use super::{encoder::FeatureRow, pipeline::PipelineError};

const FOREST_TREES: u16 = 100;
const FOREST_SEED: u64 = 42;
const NEIGHBORS: usize = 5;

/// Encoded feature rows with one label per row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<FeatureRow>,
    pub labels: Vec<i32>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn push(&mut self, row: FeatureRow, label: i32) {
        self.features.push(row);
        self.labels.push(label);
    }

    /// Copies the rows at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// The label shared by every row, when there is exactly one distinct label
    pub fn single_label(&self) -> Option<i32> {
        let (first, rest) = self.labels.split_first()?;
        rest.iter().all(|label| label == first).then_some(*first)
    }

    fn matrix(&self) -> Result<DenseMatrix<f64>, PipelineError> {
        to_matrix(&self.features)
    }
}

fn to_matrix(rows: &[FeatureRow]) -> Result<DenseMatrix<f64>, PipelineError> {
    if rows.is_empty() {
        return Err(PipelineError::Model("cannot build a matrix from zero rows".to_string()));
    }
    Ok(DenseMatrix::from_2d_vec(&rows.to_vec()))
}

/// A fitted model that assigns one label per feature row
pub trait Classifier {
    fn classify(&self, rows: &[FeatureRow]) -> Result<Vec<i32>, PipelineError>;
}

/// A classifier family that can be trained on a [`Dataset`]
pub trait Predictor: Send + Sync {
    fn fit(&self, data: &Dataset) -> Result<Box<dyn Classifier>, PipelineError>;

    /// Short name used in logs and reports
    fn name(&self) -> &'static str;
}

/// Strategy used to score upcoming events, selectable per request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RandomForest,
    NearestNeighbors,
}

impl Strategy {
    pub fn predictor(self) -> Arc<dyn Predictor> {
        match self {
            Strategy::RandomForest => Arc::new(ForestPredictor),
            Strategy::NearestNeighbors => Arc::new(NeighborsPredictor),
        }
    }
}

fn model_error(e: smartcore::error::Failed) -> PipelineError {
    PipelineError::Model(e.to_string())
}

/// Predicts the only label seen in training; `smartcore` will not fit most
/// families on a single class
struct ConstantClassifier(i32);

impl Classifier for ConstantClassifier {
    fn classify(&self, rows: &[FeatureRow]) -> Result<Vec<i32>, PipelineError> {
        Ok(vec![self.0; rows.len()])
    }
}

fn constant(data: &Dataset) -> Option<Box<dyn Classifier>> {
    data.single_label()
        .map(|label| Box::new(ConstantClassifier(label)) as Box<dyn Classifier>)
}

/// Ensemble of 100 seeded decision trees
pub struct ForestPredictor;

impl Predictor for ForestPredictor {
    fn fit(&self, data: &Dataset) -> Result<Box<dyn Classifier>, PipelineError> {
        if let Some(classifier) = constant(data) {
            return Ok(classifier);
        }
        let params = RandomForestClassifierParameters::default()
            .with_n_trees(FOREST_TREES)
            .with_seed(FOREST_SEED);
        let model = RandomForestClassifier::fit(&data.matrix()?, &data.labels, params)
            .map_err(model_error)?;
        Ok(Box::new(model))
    }

    fn name(&self) -> &'static str {
        "RF"
    }
}

impl Classifier for RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>> {
    fn classify(&self, rows: &[FeatureRow]) -> Result<Vec<i32>, PipelineError> {
        self.predict(&to_matrix(rows)?).map_err(model_error)
    }
}

/// k-nearest-neighbours with `k` capped at the training size
pub struct NeighborsPredictor;

impl Predictor for NeighborsPredictor {
    fn fit(&self, data: &Dataset) -> Result<Box<dyn Classifier>, PipelineError> {
        if let Some(classifier) = constant(data) {
            return Ok(classifier);
        }
        let k = NEIGHBORS.min(data.len()).max(1);
        let params = KNNClassifierParameters::default().with_k(k);
        let model =
            KNNClassifier::fit(&data.matrix()?, &data.labels, params).map_err(model_error)?;
        Ok(Box::new(model))
    }

    fn name(&self) -> &'static str {
        "KNN"
    }
}

impl Classifier for KNNClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>, Euclidian<f64>> {
    fn classify(&self, rows: &[FeatureRow]) -> Result<Vec<i32>, PipelineError> {
        self.predict(&to_matrix(rows)?).map_err(model_error)
    }
}

/// Multinomial logistic regression, only used in the cross-validation report
pub struct LogisticPredictor;

impl Predictor for LogisticPredictor {
    fn fit(&self, data: &Dataset) -> Result<Box<dyn Classifier>, PipelineError> {
        if let Some(classifier) = constant(data) {
            return Ok(classifier);
        }
        let model = LogisticRegression::fit(
            &data.matrix()?,
            &data.labels,
            LogisticRegressionParameters::default(),
        )
        .map_err(model_error)?;
        Ok(Box::new(model))
    }

    fn name(&self) -> &'static str {
        "LR"
    }
}

impl Classifier for LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>> {
    fn classify(&self, rows: &[FeatureRow]) -> Result<Vec<i32>, PipelineError> {
        self.predict(&to_matrix(rows)?).map_err(model_error)
    }
}

/// Single decision tree
pub struct TreePredictor;

impl Predictor for TreePredictor {
    fn fit(&self, data: &Dataset) -> Result<Box<dyn Classifier>, PipelineError> {
        if let Some(classifier) = constant(data) {
            return Ok(classifier);
        }
        let model = DecisionTreeClassifier::fit(
            &data.matrix()?,
            &data.labels,
            DecisionTreeClassifierParameters::default(),
        )
        .map_err(model_error)?;
        Ok(Box::new(model))
    }

    fn name(&self) -> &'static str {
        "DT"
    }
}

impl Classifier for DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>> {
    fn classify(&self, rows: &[FeatureRow]) -> Result<Vec<i32>, PipelineError> {
        self.predict(&to_matrix(rows)?).map_err(model_error)
    }
}

/// Families compared by the cross-validation report, in report order
pub fn model_families() -> Vec<Box<dyn Predictor>> {
    vec![
        Box::new(LogisticPredictor),
        Box::new(NeighborsPredictor),
        Box::new(ForestPredictor),
        Box::new(TreePredictor),
    ]
}
