//! UDP stream receiver
//!
//! Keeps one sender's membership alive with a keep-alive datagram per loop
//! iteration and reassembles length-prefixed frames into a playback sink.
//! Any reassembly or transport fault ends the session; restarting is up to
//! the owner.

use crossbeam_channel::bounded;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::{AudioSink, SinkFactory};
use crate::codec::FrameDecoder;
use crate::config::NetworkConfig;
use crate::constants::ANNOUNCE_MESSAGE;
use crate::error::{AudioError, Error, NetworkError};
use crate::network::udp::{self, create_socket};
use crate::network::{StopToken, StreamState, StreamWorker};

/// Receiver statistics
#[derive(Debug, Default)]
pub struct ReceiverStats {
    pub frames_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub announcements_sent: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReceiverStatsSnapshot {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub announcements_sent: u64,
}

/// Why a receive session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Faulted,
}

/// Plays one sender's stream through a sink
pub struct StreamReceiver {
    sender: SocketAddr,
    sink: Arc<dyn SinkFactory>,
    config: NetworkConfig,
    local_addr: Option<SocketAddr>,
    stats: Arc<ReceiverStats>,
    worker: Option<StreamWorker>,
}

impl StreamReceiver {
    pub fn new(sender: SocketAddr, sink: Arc<dyn SinkFactory>, config: NetworkConfig) -> Self {
        Self {
            sender,
            sink,
            config,
            local_addr: None,
            stats: Arc::new(ReceiverStats::default()),
            worker: None,
        }
    }

    /// Bind a fresh socket, open the sink and start receiving.
    ///
    /// A no-op when already running.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.is_running() {
            return Ok(());
        }
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }

        let bind_ip = match self.sender.ip() {
            ip if ip.is_loopback() => ip,
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        };
        let socket = create_socket(SocketAddr::new(bind_ip, 0), &self.config)?;
        socket
            .connect(self.sender)
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", self.sender, e)))?;
        socket.set_read_timeout(Some(self.config.recv_timeout()))?;
        self.local_addr = Some(socket.local_addr()?);

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let sink = self.sink.clone();
        let stats = self.stats.clone();
        let sender = self.sender;
        let recv_buffer_size = self.config.recv_buffer_size;
        let max_frame_bytes = self.config.max_frame_bytes;

        let worker = StreamWorker::spawn(format!("receiver-{}", sender), move |token| {
            let mut sink = match sink.open() {
                Ok(sink) => {
                    let _ = ready_tx.send(Ok(()));
                    sink
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let mut session = Session {
                socket: &socket,
                decoder: FrameDecoder::with_max_frame_len(max_frame_bytes),
                buf: vec![0u8; recv_buffer_size],
                stats: &stats,
            };
            let end = session.run(sink.as_mut(), &token);
            if end == SessionEnd::Faulted {
                tracing::warn!("Stream from {} ended", sender);
            }

            // playback device first, then the socket
            drop(sink);
            drop(socket);
        })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("Receiving from {}", self.sender);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                worker.stop();
                Err(e.into())
            }
            Err(_) => {
                worker.stop();
                Err(AudioError::StreamError("playback worker exited during startup".into()).into())
            }
        }
    }

    /// Stop receiving and wait for the worker to exit. A no-op when stopped.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            tracing::info!("Stopped receiving from {}", self.sender);
        }
    }

    /// `Stopped` also covers a session that ended on its own after a fault
    pub fn state(&self) -> StreamState {
        match &self.worker {
            Some(worker) if !worker.is_finished() => StreamState::Running,
            _ => StreamState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == StreamState::Running
    }

    pub fn sender(&self) -> SocketAddr {
        self.sender
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            frames_received: self.stats.frames_received.load(Ordering::Relaxed),
            bytes_received: self.stats.bytes_received.load(Ordering::Relaxed),
            announcements_sent: self.stats.announcements_sent.load(Ordering::Relaxed),
        }
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Session<'a> {
    socket: &'a UdpSocket,
    decoder: FrameDecoder,
    buf: Vec<u8>,
    stats: &'a ReceiverStats,
}

impl Session<'_> {
    fn run(&mut self, sink: &mut dyn AudioSink, token: &StopToken) -> SessionEnd {
        while !token.is_cancelled() {
            match self.socket.send(ANNOUNCE_MESSAGE) {
                Ok(_) => {
                    self.stats.announcements_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => tracing::warn!("Keep-alive send failed: {}", e),
            }

            match self.socket.recv(&mut self.buf) {
                Ok(n) => {
                    self.stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                    self.decoder.extend(&self.buf[..n]);
                }
                Err(e) if udp::is_would_block(&e) => continue,
                // sender not bound yet or restarting; keep announcing
                Err(e) if udp::is_peer_unreachable(&e) => continue,
                Err(e) => {
                    tracing::error!("{}", NetworkError::ReceiveFailed(e.to_string()));
                    return SessionEnd::Faulted;
                }
            }

            loop {
                match self.decoder.decode() {
                    Ok(Some(frame)) => {
                        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = sink.write_chunk(&frame) {
                            tracing::error!("Playback failed: {}", e);
                            return SessionEnd::Faulted;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Frame reassembly failed: {}", e);
                        return SessionEnd::Faulted;
                    }
                }
            }
        }

        SessionEnd::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{channel_sink, counting_null_sink, counting_source};
    use crate::codec::frame;
    use crate::network::StreamSender;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            recv_timeout_ms: 20,
            ..NetworkConfig::default()
        }
    }

    fn fake_sender() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_reassembles_frames_split_across_datagrams() {
        let (sender, sender_addr) = fake_sender();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut receiver = StreamReceiver::new(sender_addr, channel_sink(tx), test_config());
        receiver.start().unwrap();

        let mut buf = [0u8; 64];
        let (n, peer) = sender.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], ANNOUNCE_MESSAGE);
        assert_eq!(Some(peer), receiver.local_addr());

        // two frames across three datagrams, the middle one holding a boundary
        let mut wire = frame::encode(&[1u8; 100]).to_vec();
        wire.extend_from_slice(&frame::encode(&[2u8; 50]));
        sender.send_to(&wire[..30], peer).unwrap();
        sender.send_to(&wire[30..120], peer).unwrap();
        sender.send_to(&wire[120..], peer).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(&first[..], &[1u8; 100][..]);
        assert_eq!(&second[..], &[2u8; 50][..]);

        receiver.stop();
        assert_eq!(receiver.stats().frames_received, 2);
    }

    #[test]
    fn test_oversized_frame_ends_session() {
        let (sender, sender_addr) = fake_sender();
        let config = NetworkConfig {
            max_frame_bytes: 1024,
            ..test_config()
        };
        let mut receiver = StreamReceiver::new(sender_addr, counting_null_sink(Arc::default()), config);
        receiver.start().unwrap();

        let mut buf = [0u8; 64];
        let (_, peer) = sender.recv_from(&mut buf).unwrap();
        sender.send_to(&u64::MAX.to_be_bytes(), peer).unwrap();

        assert!(wait_until(Duration::from_secs(2), || !receiver.is_running()));
        assert_eq!(receiver.state(), StreamState::Stopped);

        // the owner may restart a faulted receiver
        receiver.start().unwrap();
        assert!(receiver.is_running());
        receiver.stop();
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (_sender, sender_addr) = fake_sender();
        let opened = Arc::new(AtomicUsize::new(0));
        let mut receiver = StreamReceiver::new(sender_addr, counting_null_sink(opened.clone()), test_config());

        receiver.start().unwrap();
        receiver.start().unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(receiver.is_running());

        receiver.stop();
        receiver.stop();
        assert_eq!(receiver.state(), StreamState::Stopped);
    }

    #[test]
    fn test_keeps_announcing_while_sender_is_absent() {
        // nothing listens on this port; ICMP errors must not end the session
        let (probe, addr) = fake_sender();
        drop(probe);

        let mut receiver = StreamReceiver::new(addr, counting_null_sink(Arc::default()), test_config());
        receiver.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || receiver.stats().announcements_sent >= 5));
        assert!(receiver.is_running());
        receiver.stop();
    }

    #[test]
    fn test_sender_to_receiver_end_to_end() {
        let sender = StreamSender::new(
            "e2e",
            "127.0.0.1:0".parse().unwrap(),
            counting_source(2048, Duration::from_millis(5)),
            test_config(),
        );
        let sender_addr = sender.start().unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut receiver = StreamReceiver::new(sender_addr, channel_sink(tx), test_config());
        receiver.start().unwrap();

        let chunk = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(chunk.len(), 2048);
        assert!(chunk.iter().all(|b| *b == chunk[0]));

        let receiver_addr = receiver.local_addr().unwrap();
        assert!(sender.members().contains(&receiver_addr));

        receiver.stop();
        sender.stop();
    }
}
