//! `POST /search`.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use foliofox_model::ids::{IndexerId, UserId};
use foliofox_model::search::{SearchFilters, SearchRequest, SearchResponse};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub user_id: Uuid,
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub indexers: Vec<Uuid>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

pub async fn search_handler(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> AppResult<Json<SearchResponse>> {
    let user_id = UserId::from_uuid(body.user_id);
    let request = SearchRequest {
        query: body.query,
        filters: body.filters,
        indexer_subset: body.indexers.into_iter().map(IndexerId::from_uuid).collect(),
        use_cache: body.use_cache,
    };
    let response = state.search.search(user_id, request).await?;
    Ok(Json(response))
}
