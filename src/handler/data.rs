use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use sensor_bus::persist::{SampleStore, StoredSample};

use crate::{api::AppState, handler::ApiJsonResult};

pub fn data_router<S: SampleStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/data", get(list_samples::<S>))
        .route("/data/{id}", get(get_sample::<S>))
}

async fn list_samples<S: SampleStore>(
    State(state): State<AppState<S>>,
) -> ApiJsonResult<Vec<StoredSample>> {
    let samples = state.gateway.read_all().await?;
    Ok(Json(samples))
}

async fn get_sample<S: SampleStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiJsonResult<Option<StoredSample>> {
    let sample = state.gateway.read_by_id(id).await?;
    Ok(Json(sample))
}
