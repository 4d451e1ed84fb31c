//! HTTP control surfaces
//!
//! Every handler answers with an [`ApiResponse`] envelope and a status code
//! derived from the error kind.

pub mod directory;
pub mod output;
pub mod trigger;

use axum::http::StatusCode;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use crate::error::{ControlError, Error, RegistryError, TriggerError};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

pub type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// HTTP status for a failed operation
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Control(ControlError::MissingParameter(_) | ControlError::InvalidTarget(_))
        | Error::Registry(RegistryError::UnknownOutput(_)) => StatusCode::BAD_REQUEST,
        Error::Control(ControlError::NotFound(_))
        | Error::Trigger(TriggerError::NotFound(_) | TriggerError::ActionNotFound { .. }) => {
            StatusCode::NOT_FOUND
        }
        Error::Control(ControlError::AlreadyRunning(_) | ControlError::AlreadyExists(_))
        | Error::Registry(RegistryError::EndpointConflict { .. })
        | Error::Trigger(TriggerError::AlreadyExists(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wrap an operation result in the response envelope
pub fn reply<T, E: Into<Error>>(result: Result<T, E>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => {
            let error = e.into();
            (status_for(&error), Json(ApiResponse::error(error.to_string())))
        }
    }
}

/// Serve `app` on `bind` until `shutdown` resolves
pub async fn serve<F>(bind: SocketAddr, app: Router, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("HTTP API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.layer(CorsLayer::permissive()))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::from(ControlError::InvalidTarget("x".into())), StatusCode::BAD_REQUEST),
            (Error::from(ControlError::AlreadyRunning("x".into())), StatusCode::CONFLICT),
            (Error::from(ControlError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (Error::from(TriggerError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(status_for(&error), status, "{}", error);
        }
    }
}
