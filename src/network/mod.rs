//! Network subsystem for UDP audio transport
//!
//! Each stream runs on its own OS thread. The owning [`StreamSender`] or
//! [`StreamReceiver`] keeps a [`StreamWorker`] handle and stops it through a
//! [`StopToken`]; the worker polls the token once per loop iteration.

pub mod membership;
pub mod receiver;
pub mod sender;
pub mod udp;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::NetworkError;

pub use membership::MembershipTracker;
pub use receiver::StreamReceiver;
pub use sender::StreamSender;

/// Lifecycle of a sender or receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Stopped,
    Running,
}

/// Cooperative cancellation flag shared with one worker
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A spawned stream thread together with its stop token
pub struct StreamWorker {
    token: StopToken,
    handle: JoinHandle<()>,
}

impl StreamWorker {
    pub fn spawn<F>(name: String, body: F) -> Result<Self, NetworkError>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let token = StopToken::new();
        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(worker_token))
            .map_err(|e| NetworkError::SpawnFailed(e.to_string()))?;

        Ok(Self { token, handle })
    }

    /// The thread exited on its own or after a stop request
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation and wait until the thread has exited
    pub fn stop(self) {
        self.token.cancel();
        if self.handle.join().is_err() {
            tracing::error!("Stream worker panicked");
        }
    }
}
