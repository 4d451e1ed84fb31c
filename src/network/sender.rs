//! UDP stream sender
//!
//! Owns one socket and one capture source. Every capture tick it admits new
//! receivers from inbound datagrams, drops silent ones, and fans the encoded
//! chunk out to the remaining members.

use bytes::BytesMut;
use crossbeam_channel::bounded;
use parking_lot::{Mutex, RwLock};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioSource, SourceFactory};
use crate::codec::frame;
use crate::config::NetworkConfig;
use crate::error::{AudioError, Error, NetworkError};
use crate::network::membership::MembershipTracker;
use crate::network::udp::{self, create_socket};
use crate::network::{StopToken, StreamState, StreamWorker};

/// Largest inbound datagram inspected; receivers only send short keep-alives
const ANNOUNCE_BUFFER_SIZE: usize = 1024;

/// Sender statistics
#[derive(Debug, Default)]
pub struct SenderStats {
    pub frames_sent: AtomicU64,
    pub datagrams_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
}

/// Point-in-time copy of [`SenderStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SenderStatsSnapshot {
    pub frames_sent: u64,
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

/// Fans captured audio out to every live receiver
///
/// Lifecycle calls take `&self`: `start` and `stop` are serialised among
/// themselves, while the read accessors never wait on a device opening.
pub struct StreamSender {
    name: String,
    /// Bind address, held across `start`/`stop`; the port is pinned to the
    /// OS-assigned one after the first successful start
    lifecycle: Mutex<SocketAddr>,
    source: Arc<dyn SourceFactory>,
    config: NetworkConfig,
    local_addr: RwLock<Option<SocketAddr>>,
    /// Membership as last published by the worker
    members: Arc<RwLock<Vec<SocketAddr>>>,
    stats: Arc<SenderStats>,
    worker: Mutex<Option<StreamWorker>>,
}

impl StreamSender {
    pub fn new(
        name: impl Into<String>,
        bind_addr: SocketAddr,
        source: Arc<dyn SourceFactory>,
        config: NetworkConfig,
    ) -> Self {
        Self {
            name: name.into(),
            lifecycle: Mutex::new(bind_addr),
            source,
            config,
            local_addr: RwLock::new(None),
            members: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(SenderStats::default()),
            worker: Mutex::new(None),
        }
    }

    /// Bind, open the capture source and start streaming.
    ///
    /// Returns the bound address. A no-op when already running. The address
    /// is published only once the capture source is open.
    pub fn start(&self) -> Result<SocketAddr, Error> {
        let mut bind_addr = self.lifecycle.lock();
        if let (StreamState::Running, Some(addr)) = (self.state(), self.local_addr()) {
            return Ok(addr);
        }
        // reap a worker that ended on its own
        let finished = self.worker.lock().take();
        if let Some(worker) = finished {
            worker.stop();
        }

        let socket = create_socket(*bind_addr, &self.config)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        self.members.write().clear();

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let source = self.source.clone();
        let members = self.members.clone();
        let stats = self.stats.clone();
        let window = self.config.liveness_window();
        let max_datagram = self.config.max_datagram_size;
        let name = self.name.clone();

        let worker = StreamWorker::spawn(format!("sender-{}", self.name), move |token| {
            let source = match source.open() {
                Ok(source) => {
                    let _ = ready_tx.send(Ok(()));
                    source
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let mut fan_out = FanOut {
                socket,
                tracker: MembershipTracker::new(),
                members,
                stats,
                window,
                max_datagram,
            };
            fan_out.run(source, &token, &name);
        })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                bind_addr.set_port(local_addr.port());
                *self.local_addr.write() = Some(local_addr);
                *self.worker.lock() = Some(worker);
                tracing::info!("Sender {} streaming on {}", self.name, local_addr);
                Ok(local_addr)
            }
            Ok(Err(e)) => {
                worker.stop();
                Err(e.into())
            }
            Err(_) => {
                worker.stop();
                Err(AudioError::StreamError("capture worker exited during startup".into()).into())
            }
        }
    }

    /// Stop streaming and wait for the worker to exit. A no-op when stopped.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
            self.members.write().clear();
            tracing::info!("Sender {} stopped", self.name);
        }
    }

    pub fn state(&self) -> StreamState {
        match &*self.worker.lock() {
            Some(worker) if !worker.is_finished() => StreamState::Running,
            _ => StreamState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == StreamState::Running
    }

    /// Address of the socket, known after the first successful `start`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Receivers currently in the fan-out set
    pub fn members(&self) -> Vec<SocketAddr> {
        self.members.read().clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> SenderStatsSnapshot {
        SenderStatsSnapshot {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            datagrams_sent: self.stats.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.stats.send_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for StreamSender {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker-side state of a running sender
struct FanOut {
    socket: UdpSocket,
    tracker: MembershipTracker,
    members: Arc<RwLock<Vec<SocketAddr>>>,
    stats: Arc<SenderStats>,
    window: Duration,
    max_datagram: usize,
}

impl FanOut {
    fn run(&mut self, mut source: Box<dyn AudioSource>, token: &StopToken, name: &str) {
        let mut wire = BytesMut::new();

        while !token.is_cancelled() {
            let mut changed = self.admit_pending();
            changed |= !self.tracker.expire_stale(Instant::now(), self.window).is_empty();
            if changed {
                *self.members.write() = self.tracker.snapshot();
            }

            let chunk = match source.read_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Sender {} capture failed: {}", name, e);
                    break;
                }
            };

            if self.tracker.is_empty() {
                continue;
            }

            wire.clear();
            frame::encode_into(&chunk, &mut wire);
            self.send_to_members(&wire);
        }

        // drop order: capture device first, socket with self
        drop(source);
        tracing::debug!("Sender {} worker exited", name);
    }

    /// Drain inbound datagrams; every source address counts as alive
    fn admit_pending(&mut self) -> bool {
        let mut buf = [0u8; ANNOUNCE_BUFFER_SIZE];
        let mut joined = false;

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((_, addr)) => joined |= self.tracker.observe(addr, Instant::now()),
                Err(e) if udp::is_would_block(&e) => break,
                Err(e) if udp::is_peer_unreachable(&e) => {
                    tracing::debug!("ICMP unreachable reported on sender socket: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Sender receive error: {}", NetworkError::ReceiveFailed(e.to_string()));
                    break;
                }
            }
        }

        joined
    }

    fn send_to_members(&self, wire: &[u8]) {
        for addr in self.tracker.iter() {
            let mut ok = true;
            for datagram in wire.chunks(self.max_datagram) {
                match self.socket.send_to(datagram, addr) {
                    Ok(n) => {
                        self.stats.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                        self.stats.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        // one bad destination must not hold up the others
                        tracing::warn!("Send to {} failed: {}", addr, e);
                        self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
