//! Remote stream control of output hosts

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::ControlError;
use crate::protocol::StreamEndpoint;

/// Starts and stops receivers on output hosts
#[async_trait]
pub trait OutputControl: Send + Sync {
    /// Make the host at `host` play the stream sent from `input`
    async fn start(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError>;

    async fn stop(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError>;
}

/// Calls the output host HTTP API
pub struct HttpOutputControl {
    client: Client,
}

impl HttpOutputControl {
    pub fn new(timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::Unreachable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn call(
        &self,
        action: &str,
        host: &StreamEndpoint,
        input: &StreamEndpoint,
    ) -> Result<StatusCode, ControlError> {
        let url = format!("http://{}/api/streamingoutput/{}", host, action);
        let port = input.port.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("ip", input.host.as_str()), ("port", port.as_str())])
            .send()
            .await
            .map_err(|e| ControlError::Unreachable(format!("{}: {}", host, e)))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT || status == StatusCode::NOT_FOUND {
            return Ok(status);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ControlError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl OutputControl for HttpOutputControl {
    async fn start(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError> {
        match self.call("start", host, input).await? {
            StatusCode::CONFLICT => {
                tracing::debug!("{} already streams from {}", host, input);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(ControlError::Rejected {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("{} has no stream control API", host),
            }),
            _ => Ok(()),
        }
    }

    async fn stop(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError> {
        match self.call("stop", host, input).await? {
            StatusCode::CONFLICT => Err(ControlError::Rejected {
                status: StatusCode::CONFLICT.as_u16(),
                message: format!("{} refused to stop {}", host, input),
            }),
            StatusCode::NOT_FOUND => {
                tracing::debug!("{} was not streaming from {}", host, input);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::audio::testing::counting_null_sink;
    use crate::config::NetworkConfig;
    use crate::hosts::OutputHost;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;
    use axum::Router;
    use std::net::UdpSocket;
    use std::sync::Arc;

    async fn serve(app: Router) -> (StreamEndpoint, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (StreamEndpoint::from(addr), server)
    }

    fn control() -> HttpOutputControl {
        HttpOutputControl::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_repeated_start_and_stop_succeed() {
        let network = NetworkConfig {
            recv_timeout_ms: 20,
            ..NetworkConfig::default()
        };
        let output = Arc::new(OutputHost::new(counting_null_sink(Arc::default()), network));
        let (host, server) = serve(api::output::router(output.clone())).await;

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let input = StreamEndpoint::from(sender.local_addr().unwrap());
        let control = control();

        control.start(&host, &input).await.unwrap();
        let streams = output.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].input, input);

        // 409 from the host: already streaming
        control.start(&host, &input).await.unwrap();
        assert_eq!(output.streams().len(), 1);

        control.stop(&host, &input).await.unwrap();
        assert!(output.streams().is_empty());
        // 404 from the host: nothing to stop
        control.stop(&host, &input).await.unwrap();

        server.abort();
    }

    #[tokio::test]
    async fn test_missing_api_and_refused_stop_are_errors() {
        let refusing = Router::new().route("/api/streamingoutput/stop", get(|| async { HttpStatus::CONFLICT }));
        let (host, server) = serve(refusing).await;
        let input = StreamEndpoint::new("127.0.0.1", 40100);
        let control = control();

        assert!(matches!(
            control.start(&host, &input).await,
            Err(ControlError::Rejected { status: 404, .. })
        ));
        assert!(matches!(
            control.stop(&host, &input).await,
            Err(ControlError::Rejected { status: 409, .. })
        ));

        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let host = StreamEndpoint::from(closed.local_addr().unwrap());
        drop(closed);

        let result = control().start(&host, &StreamEndpoint::new("127.0.0.1", 40100)).await;
        assert!(matches!(result, Err(ControlError::Unreachable(_))));
    }
}
