use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::ScoredEvent,
    routes::AppState,
};

/// Handler for single-user recommendations
pub async fn single(
    State(state): State<Arc<AppState>>,
    Path((event_type, user_id)): Path<(String, i64)>,
) -> AppResult<Json<Vec<ScoredEvent>>> {
    tracing::info!(event_type = %event_type, user_id, "Processing recommendation request");

    let scored = state
        .recommender
        .make_recommendation(&event_type, user_id)
        .await?;

    Ok(Json(scored))
}

/// Handler for group recommendations, users given as repeated `users` parameters
pub async fn group(
    State(state): State<Arc<AppState>>,
    Path(event_type): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<Vec<ScoredEvent>>> {
    let user_ids = parse_user_ids(&params)?;

    tracing::info!(
        event_type = %event_type,
        users = ?user_ids,
        "Processing group recommendation request"
    );

    let scored = state
        .recommender
        .make_group_recommendation(&event_type, &user_ids)
        .await?;

    Ok(Json(scored))
}

fn parse_user_ids(params: &[(String, String)]) -> AppResult<Vec<i64>> {
    params
        .iter()
        .filter(|(key, _)| key == "users")
        .map(|(_, value)| {
            value.parse::<i64>().map_err(|_| {
                AppError::InvalidInput(format!("users must be integers, got {value:?}"))
            })
        })
        .collect()
}
