use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use vendra_core::models::{CoverageArea, CreateCoverageAreaRequest};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CoverageListQuery {
    pub province: String,
}

pub async fn create_area(
    State(state): State<AppState>,
    Json(request): Json<CreateCoverageAreaRequest>,
) -> ApiResult<(StatusCode, Json<CoverageArea>)> {
    let area = state.coverage.create_area(request).await?;
    Ok((StatusCode::CREATED, Json(area)))
}

pub async fn list_areas(
    State(state): State<AppState>,
    Query(query): Query<CoverageListQuery>,
) -> ApiResult<Json<Vec<CoverageArea>>> {
    let areas = state.coverage.list_areas(&query.province).await?;
    Ok(Json(areas))
}
