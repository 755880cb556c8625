use axum::{extract::State, Json};
use std::{collections::BTreeMap, sync::Arc};

use crate::{error::AppResult, routes::AppState};

/// Mean cross-validated accuracy per classifier family
pub async fn cross_validation(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<BTreeMap<&'static str, f64>>> {
    let report = state.recommender.cross_validate().await?;
    Ok(Json(report))
}
