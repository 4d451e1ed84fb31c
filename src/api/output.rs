//! Output host stream-control API
//!
//! `ip` and `port` are validated before any socket work; starting and
//! stopping receivers blocks, so it runs on the blocking pool.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::api::{reply, ApiResponse, ApiResult};
use crate::error::{Error, NetworkError};
use crate::hosts::OutputHost;
use crate::protocol::{OutputStreamStatus, StreamControlQuery, StreamTarget};

pub fn router(host: Arc<OutputHost>) -> Router {
    Router::new()
        .route("/api/streamingoutput/ping", get(ping))
        .route("/api/streamingoutput/start", get(start_stream))
        .route("/api/streamingoutput/stop", get(stop_stream))
        .route("/api/streamingoutput/streams", get(list_streams))
        .with_state(host)
}

async fn ping() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("pong"))
}

async fn list_streams(State(host): State<Arc<OutputHost>>) -> Json<ApiResponse<Vec<OutputStreamStatus>>> {
    Json(ApiResponse::ok(host.streams()))
}

async fn start_stream(
    State(host): State<Arc<OutputHost>>,
    Query(query): Query<StreamControlQuery>,
) -> ApiResult<()> {
    reply(run_blocking(query, move |target| host.start(target)).await)
}

async fn stop_stream(
    State(host): State<Arc<OutputHost>>,
    Query(query): Query<StreamControlQuery>,
) -> ApiResult<()> {
    reply(run_blocking(query, move |target| host.stop(target)).await)
}

async fn run_blocking<F>(query: StreamControlQuery, op: F) -> Result<(), Error>
where
    F: FnOnce(StreamTarget) -> Result<(), Error> + Send + 'static,
{
    let target = StreamTarget::from_query(&query)?;
    tokio::task::spawn_blocking(move || op(target))
        .await
        .map_err(|e| NetworkError::SpawnFailed(e.to_string()))?
}
