use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::BTreeMap;

use crate::models::{Domain, RatingRecord, ScoredEvent, UpcomingEvent};

use super::{
    classifiers::{model_families, Classifier, Dataset, Predictor},
    encoder::{EncodingError, FeatureEncoder},
};

/// Share of rows held out from training
pub const TEST_RATIO: f64 = 0.2;
pub const SPLIT_SEED: u64 = 42;
pub const CV_FOLDS: usize = 10;
pub const CV_SEED: u64 = 7;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("No {domain} ratings left to train on")]
    EmptyTrainingSet { domain: Domain },

    #[error("Need at least {needed} samples, got {available}")]
    NotEnoughSamples { needed: usize, available: usize },

    #[error("Classifier error: {0}")]
    Model(String),
}

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffles `0..n` with `seed` and holds out the first `ceil(n * test_ratio)` indices
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let test_len = ((n as f64) * test_ratio).ceil() as usize;
    let train = indices.split_off(test_len.min(n));

    Split {
        train,
        test: indices,
    }
}

/// Encodes every rating of the domain into a dataset
pub fn encode_ratings(
    encoder: &FeatureEncoder,
    ratings: &[RatingRecord],
) -> Result<Dataset, EncodingError> {
    let mut data = Dataset::default();
    for rating in ratings {
        let (row, label) = encoder.encode_rating(rating)?;
        data.push(row, label);
    }
    Ok(data)
}

/// Classifier trained for one domain, ready to score that domain's events
pub struct TrainedModel {
    encoder: FeatureEncoder,
    classifier: Box<dyn Classifier>,
    split: Split,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("domain", &self.encoder.domain())
            .field("split", &self.split)
            .finish_non_exhaustive()
    }
}

/// Trains `predictor` on the 80% training partition of `ratings`
pub fn train(
    predictor: &dyn Predictor,
    domain: Domain,
    ratings: &[RatingRecord],
) -> Result<TrainedModel, PipelineError> {
    let encoder = FeatureEncoder::new(domain);
    let data = encode_ratings(&encoder, ratings)?;

    let split = train_test_split(data.len(), TEST_RATIO, SPLIT_SEED);
    let training = data.subset(&split.train);
    if training.is_empty() {
        return Err(PipelineError::EmptyTrainingSet { domain });
    }

    tracing::debug!(
        domain = %domain,
        model = predictor.name(),
        train = split.train.len(),
        held_out = split.test.len(),
        "Fitting classifier"
    );

    let classifier = predictor.fit(&training)?;

    Ok(TrainedModel {
        encoder,
        classifier,
        split,
    })
}

impl TrainedModel {
    pub fn domain(&self) -> Domain {
        self.encoder.domain()
    }

    /// Indices of the ratings held out from training
    pub fn held_out(&self) -> &[usize] {
        &self.split.test
    }

    /// Predicts a rate for each event and ranks them, highest prediction first
    pub fn score(&self, events: Vec<UpcomingEvent>) -> Result<Vec<ScoredEvent>, PipelineError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let rows = events
            .iter()
            .map(|event| self.encoder.encode_event(event))
            .collect::<Result<Vec<_>, _>>()?;

        let predictions = self.classifier.classify(&rows)?;
        if predictions.len() != events.len() {
            return Err(PipelineError::Model(format!(
                "expected {} predictions, got {}",
                events.len(),
                predictions.len()
            )));
        }

        let mut scored: Vec<ScoredEvent> = events
            .into_iter()
            .zip(predictions)
            .map(|(event, prediction)| ScoredEvent::new(event, prediction))
            .collect();
        rank(&mut scored);

        Ok(scored)
    }
}

/// Sorts by prediction, descending. Equal predictions keep their relative order.
pub fn rank(scored: &mut [ScoredEvent]) {
    scored.sort_by(|a, b| b.prediction.cmp(&a.prediction));
}

/// Partitions `0..n` into `folds` shuffled folds
///
/// Returns one `(train, test)` pair per fold. The first `n % folds` folds get
/// one extra row.
pub fn k_fold(
    n: usize,
    folds: usize,
    seed: u64,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>, PipelineError> {
    if folds < 2 || n < folds {
        return Err(PipelineError::NotEnoughSamples {
            needed: folds.max(2),
            available: n,
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let base = n / folds;
    let extra = n % folds;
    let mut start = 0;
    let mut pairs = Vec::with_capacity(folds);

    for fold in 0..folds {
        let len = base + usize::from(fold < extra);
        let test = indices[start..start + len].to_vec();
        let train = indices[..start]
            .iter()
            .chain(&indices[start + len..])
            .copied()
            .collect();
        pairs.push((train, test));
        start += len;
    }

    Ok(pairs)
}

fn accuracy(expected: &[i32], predicted: &[i32]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let hits = expected
        .iter()
        .zip(predicted)
        .filter(|(a, b)| a == b)
        .count();
    hits as f64 / expected.len() as f64
}

/// Mean k-fold accuracy of `predictor` over `data`
pub fn cross_val_accuracy(
    predictor: &dyn Predictor,
    data: &Dataset,
    folds: usize,
    seed: u64,
) -> Result<f64, PipelineError> {
    let pairs = k_fold(data.len(), folds, seed)?;
    let mut total = 0.0;

    for (train_idx, test_idx) in &pairs {
        let training = data.subset(train_idx);
        let testing = data.subset(test_idx);
        let classifier = predictor.fit(&training)?;
        let predicted = classifier.classify(&testing.features)?;
        total += accuracy(&testing.labels, &predicted);
    }

    Ok(total / pairs.len() as f64)
}

/// Compares classifier families on the training partition of `ratings`
///
/// Returns mean 10-fold accuracy per family name.
pub fn cross_validate(
    domain: Domain,
    ratings: &[RatingRecord],
) -> Result<BTreeMap<&'static str, f64>, PipelineError> {
    let encoder = FeatureEncoder::new(domain);
    let data = encode_ratings(&encoder, ratings)?;
    let split = train_test_split(data.len(), TEST_RATIO, SPLIT_SEED);
    let training = data.subset(&split.train);

    let mut results = BTreeMap::new();
    for predictor in model_families() {
        let mean = cross_val_accuracy(predictor.as_ref(), &training, CV_FOLDS, CV_SEED)?;
        tracing::info!(
            domain = %domain,
            model = predictor.name(),
            accuracy = mean,
            "Cross-validated model family"
        );
        results.insert(predictor.name(), mean);
    }

    Ok(results)
}
