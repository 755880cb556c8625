use sqlx::PgPool;

use crate::models::{Domain, RatingRecord, UpcomingEvent};

/// Failure while reading ratings or events from the store
#[derive(thiserror::Error, Debug)]
pub enum DataAccessError {
    #[error("Failed to load {what} for {domain}: {source}")]
    Query {
        domain: Domain,
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Read access to historical ratings and upcoming events, per domain
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Ratings given by any of `user_ids`, in random order
    async fn fetch_user_ratings(
        &self,
        domain: Domain,
        user_ids: &[i64],
    ) -> Result<Vec<RatingRecord>, DataAccessError>;

    /// Random sample of at most `limit` ratings across all users
    async fn fetch_population_ratings(
        &self,
        domain: Domain,
        limit: i64,
    ) -> Result<Vec<RatingRecord>, DataAccessError>;

    /// Events of the domain starting after now
    async fn fetch_upcoming(&self, domain: Domain) -> Result<Vec<UpcomingEvent>, DataAccessError>;
}

/// Columns shared by the rating queries. `{table}` is always a `Domain::table()` name.
fn ratings_query(domain: Domain, filter: &str, tail: &str) -> String {
    format!(
        r#"
        SELECT e.category::text                           AS category,
               (e.price IS NULL)                          AS free,
               EXTRACT(HOUR FROM e.start_date)::int4      AS start_hour,
               EXTRACT(HOUR FROM e.end_date)::int4        AS end_hour,
               COALESCE(e.private, false)                 AS is_private,
               er.rate::int4                              AS rate
        FROM event_rate er
                 INNER JOIN {table} e ON er.event_type = e.event_type AND er.event_id = e.id
        {filter}
        ORDER BY random()
        {tail}
        "#,
        table = domain.table(),
    )
}

fn upcoming_query(domain: Domain) -> String {
    format!(
        r#"
        SELECT e.id::int8                                 AS id,
               e.event_type::text                         AS event_type,
               e.category::text                           AS category,
               (e.price IS NULL)                          AS free,
               EXTRACT(HOUR FROM e.start_date)::int4      AS start_hour,
               EXTRACT(HOUR FROM e.end_date)::int4        AS end_hour,
               COALESCE(e.private, false)                 AS is_private
        FROM {table} e
        WHERE e.start_date > now()
        "#,
        table = domain.table(),
    )
}

/// PostgreSQL-backed event store
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventStore for PgEventStore {
    async fn fetch_user_ratings(
        &self,
        domain: Domain,
        user_ids: &[i64],
    ) -> Result<Vec<RatingRecord>, DataAccessError> {
        let sql = ratings_query(domain, "WHERE er.user_id = ANY($1)", "");
        let ratings = sqlx::query_as::<_, RatingRecord>(&sql)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataAccessError::Query {
                domain,
                what: "user ratings",
                source,
            })?;

        tracing::debug!(
            domain = %domain,
            users = user_ids.len(),
            rows = ratings.len(),
            "Loaded user ratings"
        );

        Ok(ratings)
    }

    async fn fetch_population_ratings(
        &self,
        domain: Domain,
        limit: i64,
    ) -> Result<Vec<RatingRecord>, DataAccessError> {
        let sql = ratings_query(domain, "", "LIMIT $1");
        let ratings = sqlx::query_as::<_, RatingRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataAccessError::Query {
                domain,
                what: "population ratings",
                source,
            })?;

        tracing::debug!(domain = %domain, limit, rows = ratings.len(), "Loaded population ratings");

        Ok(ratings)
    }

    async fn fetch_upcoming(&self, domain: Domain) -> Result<Vec<UpcomingEvent>, DataAccessError> {
        let sql = upcoming_query(domain);
        let events = sqlx::query_as::<_, UpcomingEvent>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataAccessError::Query {
                domain,
                what: "upcoming events",
                source,
            })?;

        tracing::debug!(domain = %domain, rows = events.len(), "Loaded upcoming events");

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratings_query_targets_domain_table() {
        let sql = ratings_query(Domain::StagePlay, "WHERE er.user_id = ANY($1)", "");
        assert!(sql.contains("INNER JOIN event_stage_play e"));
        assert!(sql.contains("WHERE er.user_id = ANY($1)"));
        assert!(sql.contains("ORDER BY random()"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_population_query_is_bounded() {
        let sql = ratings_query(Domain::Sport, "", "LIMIT $1");
        assert!(sql.contains("INNER JOIN event_sport e"));
        assert!(sql.contains("LIMIT $1"));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_upcoming_query_filters_future_events() {
        let sql = upcoming_query(Domain::Nature);
        assert!(sql.contains("FROM event_nature e"));
        assert!(sql.contains("WHERE e.start_date > now()"));
    }

    #[test]
    fn test_data_access_error_message() {
        let err = DataAccessError::Query {
            domain: Domain::Musical,
            what: "user ratings",
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(err
            .to_string()
            .starts_with("Failed to load user ratings for Musical:"));
    }
}
