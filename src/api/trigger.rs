//! Trigger API

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::{reply, ApiResponse, ApiResult};
use crate::trigger::{FireReport, TriggerHandler, TriggerStatus};

pub fn router(handler: Arc<TriggerHandler>) -> Router {
    Router::new()
        .route("/trigger/api/get_triggers", get(get_triggers))
        .route("/trigger/:id", get(fire_trigger))
        .with_state(handler)
}

async fn get_triggers(
    State(handler): State<Arc<TriggerHandler>>,
) -> Json<ApiResponse<BTreeMap<String, TriggerStatus>>> {
    Json(ApiResponse::ok(handler.statuses()))
}

async fn fire_trigger(
    State(handler): State<Arc<TriggerHandler>>,
    Path(id): Path<String>,
) -> ApiResult<FireReport> {
    reply(handler.fire(&id).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::call;
    use crate::trigger::{action, TriggerState};
    use axum::http::{Method, StatusCode};
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_then_status() {
        let handler = Arc::new(TriggerHandler::new(Duration::from_secs(5)));
        handler.add("doorbell").unwrap();
        handler
            .add_action("doorbell", "noop", action(|| async { Ok(()) }))
            .unwrap();

        let (status, body) = call::<FireReport>(router(handler.clone()), Method::GET, "/trigger/doorbell", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.data.unwrap().ran, 1);

        let (_, body) = call::<BTreeMap<String, serde_json::Value>>(
            router(handler.clone()),
            Method::GET,
            "/trigger/api/get_triggers",
            None,
        )
        .await;
        assert_eq!(body.data.unwrap()["doorbell"]["state"], "fired");
        assert_eq!(handler.statuses()["doorbell"].state, TriggerState::Fired);

        let (status, _) = call::<FireReport>(router(handler), Method::GET, "/trigger/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
