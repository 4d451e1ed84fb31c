//! Directory service API

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;

use crate::api::{ApiResponse, ApiResult};
use crate::directory::InputRegistry;
use crate::protocol::{InputAnnouncement, InputStatus, RegistrationResult};

pub fn router(registry: Arc<InputRegistry>) -> Router {
    Router::new()
        .route("/api/streamingcontrol/ping", get(ping))
        .route("/api/streamingcontrol/info/outputs", get(list_outputs))
        .route("/api/streamingcontrol/info/inputs", get(list_inputs))
        .route("/api/streamingcontrol/input", post(register_inputs))
        .with_state(registry)
}

async fn ping() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("pong"))
}

async fn list_outputs(State(registry): State<Arc<InputRegistry>>) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::ok(registry.list_outputs()))
}

async fn list_inputs(State(registry): State<Arc<InputRegistry>>) -> Json<ApiResponse<Vec<InputStatus>>> {
    Json(ApiResponse::ok(registry.list(Instant::now())))
}

/// Upsert a registration batch; each entry gets its own result
async fn register_inputs(
    State(registry): State<Arc<InputRegistry>>,
    Json(batch): Json<Vec<InputAnnouncement>>,
) -> ApiResult<Vec<RegistrationResult>> {
    let results = registry
        .register(&batch, Instant::now())
        .into_iter()
        .zip(&batch)
        .map(|(result, announcement)| match result {
            Ok(key) => RegistrationResult {
                key: Some(key.to_string()),
                error: None,
            },
            Err(e) => {
                tracing::warn!("Rejected registration of {}: {}", announcement.endpoint, e);
                RegistrationResult {
                    key: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    (StatusCode::OK, Json(ApiResponse::ok(results)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::call;
    use crate::directory::OutputDirectory;
    use crate::protocol::StreamEndpoint;
    use axum::http::Method;
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> Arc<InputRegistry> {
        let mut outputs = OutputDirectory::new();
        outputs.insert("stage", vec![StreamEndpoint::new("10.0.0.20", 5000)]);
        outputs.insert("hall", vec![StreamEndpoint::new("10.0.0.21", 5000)]);
        Arc::new(InputRegistry::new(Arc::new(outputs), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_outputs_are_ordered() {
        let (status, body) = call::<Vec<String>>(
            router(registry()),
            Method::GET,
            "/api/streamingcontrol/info/outputs",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.data.unwrap(), vec!["hall".to_string(), "stage".to_string()]);
    }

    #[tokio::test]
    async fn test_register_reports_each_entry() {
        let registry = registry();
        let batch = json!([
            {"endpoint": {"host": "10.0.0.5", "port": 40100}, "outputs": ["hall"]},
            {"endpoint": {"host": "10.0.0.6", "port": 40100}, "outputs": ["lobby"]},
        ]);

        let (status, body) = call::<Vec<RegistrationResult>>(
            router(registry.clone()),
            Method::POST,
            "/api/streamingcontrol/input",
            Some(batch),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body.data.unwrap();
        assert_eq!(results[0].key.as_deref(), Some("10.0.0.5:40100"));
        assert!(results[1].error.as_deref().unwrap().contains("lobby"));

        let (_, inputs) = call::<Vec<InputStatus>>(
            router(registry),
            Method::GET,
            "/api/streamingcontrol/info/inputs",
            None,
        )
        .await;
        let inputs = inputs.data.unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].outputs, vec!["hall".to_string()]);
        assert!(!inputs[0].activated);
    }
}
