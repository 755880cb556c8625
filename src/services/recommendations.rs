use std::{collections::BTreeMap, sync::Arc};

use crate::{
    config::Config,
    db::EventStore,
    error::{AppError, AppResult},
    models::{Domain, RatingRecord, ScoredEvent, UpcomingEvent},
    services::{
        classifiers::{Predictor, Strategy},
        pipeline::{self, PipelineError},
    },
};

/// Tunables for [`Recommender`]
#[derive(Debug, Clone, Copy)]
pub struct RecommenderSettings {
    pub single_strategy: Strategy,
    pub group_strategy: Strategy,
    pub population_limit: i64,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            single_strategy: Strategy::RandomForest,
            group_strategy: Strategy::RandomForest,
            population_limit: 1500,
        }
    }
}

impl From<&Config> for RecommenderSettings {
    fn from(config: &Config) -> Self {
        Self {
            single_strategy: config.single_strategy,
            group_strategy: config.group_strategy,
            population_limit: i64::from(config.population_sample_size.get()),
        }
    }
}

/// Predicts ratings of upcoming events for a user or a group of users
///
/// Trains on the users' own ratings when they are available and falls back
/// to a population-wide sample otherwise. Nothing is cached: every call
/// reads fresh data and trains a new model.
pub struct Recommender {
    store: Arc<dyn EventStore>,
    single: Arc<dyn Predictor>,
    group: Arc<dyn Predictor>,
    population_limit: i64,
}

impl Recommender {
    pub fn new(store: Arc<dyn EventStore>, settings: RecommenderSettings) -> Self {
        Self {
            store,
            single: settings.single_strategy.predictor(),
            group: settings.group_strategy.predictor(),
            population_limit: settings.population_limit,
        }
    }

    /// Ranks upcoming events of `event_type` for one user
    pub async fn make_recommendation(
        &self,
        event_type: &str,
        user_id: i64,
    ) -> AppResult<Vec<ScoredEvent>> {
        let domain: Domain = event_type.parse()?;
        self.recommend(domain, &[user_id], self.single.clone()).await
    }

    /// Ranks upcoming events of `event_type` for a group of users
    pub async fn make_group_recommendation(
        &self,
        event_type: &str,
        user_ids: &[i64],
    ) -> AppResult<Vec<ScoredEvent>> {
        let domain: Domain = event_type.parse()?;
        self.recommend(domain, user_ids, self.group.clone()).await
    }

    /// Mean cross-validated accuracy per classifier family on the Musical sample
    pub async fn cross_validate(&self) -> AppResult<BTreeMap<&'static str, f64>> {
        let domain = Domain::Musical;
        let ratings = self
            .store
            .fetch_population_ratings(domain, self.population_limit)
            .await?;

        tracing::info!(domain = %domain, rows = ratings.len(), "Running cross-validation");

        let report = tokio::task::spawn_blocking(move || pipeline::cross_validate(domain, &ratings))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

        Ok(report)
    }

    async fn recommend(
        &self,
        domain: Domain,
        user_ids: &[i64],
        predictor: Arc<dyn Predictor>,
    ) -> AppResult<Vec<ScoredEvent>> {
        let upcoming = self.store.fetch_upcoming(domain).await?;

        if let Some(ratings) = self.user_history(domain, user_ids).await {
            match train_and_score(predictor.clone(), domain, ratings, upcoming.clone()).await {
                // Encoding failures are fatal
                Err(AppError::Pipeline(e)) if !matches!(e, PipelineError::Encoding(_)) => {
                    tracing::warn!(
                        domain = %domain,
                        users = user_ids.len(),
                        error = %e,
                        "Could not train on user ratings, falling back to population sample"
                    );
                }
                scored => return scored,
            }
        }

        let ratings = self
            .store
            .fetch_population_ratings(domain, self.population_limit)
            .await?;

        tracing::info!(
            domain = %domain,
            rows = ratings.len(),
            model = predictor.name(),
            "Training on population sample"
        );

        train_and_score(predictor, domain, ratings, upcoming).await
    }

    /// Ratings of `user_ids`, or `None` when the population sample should be used instead
    async fn user_history(&self, domain: Domain, user_ids: &[i64]) -> Option<Vec<RatingRecord>> {
        if user_ids.is_empty() {
            tracing::info!(domain = %domain, "No users given, using population sample");
            return None;
        }

        match self.store.fetch_user_ratings(domain, user_ids).await {
            Ok(ratings) if ratings.is_empty() => {
                tracing::info!(
                    domain = %domain,
                    users = user_ids.len(),
                    "No rating history for users, falling back to population sample"
                );
                None
            }
            Ok(ratings) => Some(ratings),
            Err(e) => {
                tracing::warn!(
                    domain = %domain,
                    users = user_ids.len(),
                    error = %e,
                    "User ratings unavailable, falling back to population sample"
                );
                None
            }
        }
    }
}

/// Trains and scores on the blocking pool
async fn train_and_score(
    predictor: Arc<dyn Predictor>,
    domain: Domain,
    ratings: Vec<RatingRecord>,
    upcoming: Vec<UpcomingEvent>,
) -> AppResult<Vec<ScoredEvent>> {
    let scored = tokio::task::spawn_blocking(move || {
        let model = pipeline::train(predictor.as_ref(), domain, &ratings)?;
        model.score(upcoming)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    tracing::info!(domain = %domain, scored = scored.len(), "Scored upcoming events");

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{events::MockEventStore, DataAccessError},
        services::classifiers::{Classifier, Dataset, ForestPredictor},
    };

    fn rating(category: &str, free: bool, rate: i32) -> RatingRecord {
        RatingRecord {
            category: category.to_string(),
            free,
            start_hour: 19,
            end_hour: 22,
            is_private: false,
            rate,
        }
    }

    // Every rating is 5, so any trained model predicts 5
    fn user_ratings() -> Vec<RatingRecord> {
        (0..10).map(|i| rating("Concert", i % 2 == 0, 5)).collect()
    }

    // Every rating is 1, so any trained model predicts 1
    fn population_ratings() -> Vec<RatingRecord> {
        (0..10).map(|i| rating("Festival", i % 2 == 0, 1)).collect()
    }

    fn upcoming() -> Vec<UpcomingEvent> {
        vec![
            UpcomingEvent {
                id: 1,
                event_type: "Musical".to_string(),
                category: "Concert".to_string(),
                free: true,
                start_hour: 20,
                end_hour: 23,
                is_private: false,
            },
            UpcomingEvent {
                id: 2,
                event_type: "Musical".to_string(),
                category: "Festival".to_string(),
                free: false,
                start_hour: 12,
                end_hour: 23,
                is_private: true,
            },
        ]
    }

    fn query_error(what: &'static str) -> DataAccessError {
        DataAccessError::Query {
            domain: Domain::Musical,
            what,
            source: sqlx::Error::PoolTimedOut,
        }
    }

    fn recommender(store: MockEventStore) -> Recommender {
        Recommender::new(Arc::new(store), RecommenderSettings::default())
    }

    fn predictions(scored: &[ScoredEvent]) -> Vec<i32> {
        scored.iter().map(|s| s.prediction).collect()
    }

    #[tokio::test]
    async fn test_uses_user_history_when_available() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .withf(|domain, ids| *domain == Domain::Musical && ids == [42].as_slice())
            .times(1)
            .returning(|_, _| Ok(user_ratings()));
        store.expect_fetch_population_ratings().never();

        let scored = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap();

        assert_eq!(scored.len(), 2);
        assert_eq!(predictions(&scored), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_falls_back_when_user_fetch_fails() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Err(query_error("user ratings")));
        store
            .expect_fetch_population_ratings()
            .withf(|domain, limit| *domain == Domain::Musical && *limit == 1500)
            .times(1)
            .returning(|_, _| Ok(population_ratings()));

        let scored = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap();

        assert_eq!(predictions(&scored), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_falls_back_when_user_has_no_history() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Ok(vec![]));
        store
            .expect_fetch_population_ratings()
            .times(1)
            .returning(|_, _| Ok(population_ratings()));

        let scored = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap();

        assert_eq!(predictions(&scored), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_falls_back_when_user_history_is_too_small_to_train() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Ok(vec![rating("Concert", true, 5)]));
        store
            .expect_fetch_population_ratings()
            .times(1)
            .returning(|_, _| Ok(population_ratings()));

        let scored = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap();

        assert_eq!(predictions(&scored), vec![1, 1]);
    }

    /// Refuses to fit on the user fixture (all 5s), delegates otherwise
    struct RejectsUserRatings;

    impl Predictor for RejectsUserRatings {
        fn fit(&self, data: &Dataset) -> Result<Box<dyn Classifier>, PipelineError> {
            if data.single_label() == Some(5) {
                return Err(PipelineError::Model("Fit failed".to_string()));
            }
            ForestPredictor.fit(data)
        }

        fn name(&self) -> &'static str {
            "RF"
        }
    }

    #[tokio::test]
    async fn test_falls_back_when_user_model_fails_to_train() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .times(1)
            .returning(|_, _| Ok(user_ratings()));
        store
            .expect_fetch_population_ratings()
            .times(1)
            .returning(|_, _| Ok(population_ratings()));

        let predictor: Arc<dyn Predictor> = Arc::new(RejectsUserRatings);
        let recommender = Recommender {
            store: Arc::new(store),
            single: predictor.clone(),
            group: predictor,
            population_limit: 1500,
        };

        let scored = recommender.make_recommendation("Musical", 42).await.unwrap();
        assert_eq!(predictions(&scored), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_uniform_user_ratings_are_served_without_fallback() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Ok(vec![rating("Concert", true, 4); 6]));
        store.expect_fetch_population_ratings().never();

        let scored = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap();

        assert_eq!(predictions(&scored), vec![4, 4]);
    }

    #[tokio::test]
    async fn test_population_failure_propagates() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Err(query_error("user ratings")));
        store
            .expect_fetch_population_ratings()
            .returning(|_, _| Err(query_error("population ratings")));

        let err = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap_err();

        match err {
            AppError::DataAccess(DataAccessError::Query { what, .. }) => {
                assert_eq!(what, "population ratings")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_event_type_touches_no_data() {
        let mut store = MockEventStore::new();
        store.expect_fetch_upcoming().never();
        store.expect_fetch_user_ratings().never();
        store.expect_fetch_population_ratings().never();

        let err = recommender(store)
            .make_recommendation("Unknown", 1)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnknownDomain(_)));
    }

    #[tokio::test]
    async fn test_encoding_error_is_not_recovered() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Ok(vec![rating("Jogging", true, 3); 5]));
        store.expect_fetch_population_ratings().never();

        let err = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Pipeline(PipelineError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_group_recommendation_queries_all_users() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store
            .expect_fetch_user_ratings()
            .withf(|_, ids| ids == [1, 2, 3].as_slice())
            .times(1)
            .returning(|_, _| Ok(user_ratings()));
        store.expect_fetch_population_ratings().never();

        let scored = recommender(store)
            .make_group_recommendation("Musical", &[1, 2, 3])
            .await
            .unwrap();

        assert_eq!(predictions(&scored), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_empty_group_uses_population_sample() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_upcoming()
            .returning(|_| Ok(upcoming()));
        store.expect_fetch_user_ratings().never();
        store
            .expect_fetch_population_ratings()
            .times(1)
            .returning(|_, _| Ok(population_ratings()));

        let scored = recommender(store)
            .make_group_recommendation("Musical", &[])
            .await
            .unwrap();

        assert_eq!(predictions(&scored), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_no_upcoming_events_yields_empty_list() {
        let mut store = MockEventStore::new();
        store.expect_fetch_upcoming().returning(|_| Ok(vec![]));
        store
            .expect_fetch_user_ratings()
            .returning(|_, _| Ok(user_ratings()));

        let scored = recommender(store)
            .make_recommendation("Musical", 42)
            .await
            .unwrap();

        assert!(scored.is_empty());
    }

    #[tokio::test]
    async fn test_cross_validate_uses_musical_population() {
        let mut store = MockEventStore::new();
        store
            .expect_fetch_population_ratings()
            .withf(|domain, _| *domain == Domain::Musical)
            .times(1)
            .returning(|_, _| {
                Ok((0..40)
                    .map(|i| {
                        if i % 2 == 0 {
                            rating("Concert", true, 5)
                        } else {
                            rating("Festival", false, 2)
                        }
                    })
                    .collect())
            });

        let report = recommender(store).cross_validate().await.unwrap();
        assert_eq!(report.len(), 4);
        assert!(report.contains_key("RF"));
    }
}
