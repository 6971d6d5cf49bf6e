//! `GET /indexers`, `GET /indexers/{id}/health`.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use foliofox_model::ids::IndexerId;
use foliofox_model::indexer::{Indexer, IndexerHealth};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn list_indexers_handler(State(state): State<AppState>) -> AppResult<Json<Vec<Indexer>>> {
    let indexers = state.indexers.list_all().await?;
    Ok(Json(indexers))
}

pub async fn indexer_health_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<IndexerHealth>> {
    let indexer_id = IndexerId::from_uuid(id);
    match state.health.current(indexer_id).await {
        Some(health) => Ok(Json(health)),
        None => Err(AppError::not_found("no health record for this indexer")),
    }
}
