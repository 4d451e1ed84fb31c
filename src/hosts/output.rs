//! Output host: one stream receiver per input endpoint

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::audio::SinkFactory;
use crate::config::NetworkConfig;
use crate::error::{ControlError, Error};
use crate::network::StreamReceiver;
use crate::protocol::{OutputStreamStatus, StreamEndpoint, StreamTarget};

pub struct OutputHost {
    streams: DashMap<SocketAddr, StreamReceiver>,
    sink: Arc<dyn SinkFactory>,
    network: NetworkConfig,
}

impl OutputHost {
    pub fn new(sink: Arc<dyn SinkFactory>, network: NetworkConfig) -> Self {
        Self {
            streams: DashMap::new(),
            sink,
            network,
        }
    }

    /// Start playing the stream of `target`.
    ///
    /// A running stream is a conflict; one that ended on its own is restarted.
    pub fn start(&self, target: StreamTarget) -> Result<(), Error> {
        match self.streams.entry(target.socket_addr()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_running() {
                    return Err(ControlError::AlreadyRunning(target.to_string()).into());
                }
                tracing::info!("Restarting stream from {}", target);
                entry.get_mut().start()
            }
            Entry::Vacant(entry) => {
                let mut receiver = StreamReceiver::new(target.socket_addr(), self.sink.clone(), self.network.clone());
                receiver.start()?;
                entry.insert(receiver);
                Ok(())
            }
        }
    }

    pub fn stop(&self, target: StreamTarget) -> Result<(), Error> {
        let (_, mut receiver) = self
            .streams
            .remove(&target.socket_addr())
            .ok_or_else(|| ControlError::NotFound(target.to_string()))?;
        receiver.stop();
        Ok(())
    }

    pub fn streams(&self) -> Vec<OutputStreamStatus> {
        let mut streams: Vec<_> = self
            .streams
            .iter()
            .map(|entry| OutputStreamStatus {
                input: StreamEndpoint::from(*entry.key()),
                running: entry.value().is_running(),
                frames_received: entry.value().stats().frames_received,
            })
            .collect();
        streams.sort_by(|a, b| a.input.cmp(&b.input));
        streams
    }

    /// Stop every receiver
    pub fn shutdown(&self) {
        let addrs: Vec<SocketAddr> = self.streams.iter().map(|entry| *entry.key()).collect();
        for addr in addrs {
            if let Some((_, mut receiver)) = self.streams.remove(&addr) {
                receiver.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::counting_null_sink;
    use std::net::UdpSocket;

    fn host() -> OutputHost {
        let network = NetworkConfig {
            recv_timeout_ms: 20,
            ..NetworkConfig::default()
        };
        OutputHost::new(counting_null_sink(Arc::default()), network)
    }

    fn target(socket: &UdpSocket) -> StreamTarget {
        let addr = socket.local_addr().unwrap();
        StreamTarget::parse(&addr.ip().to_string(), &addr.port().to_string()).unwrap()
    }

    #[test]
    fn test_duplicate_start_conflicts() {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let host = host();

        host.start(target(&sender)).unwrap();
        let again = host.start(target(&sender));
        assert!(matches!(again, Err(Error::Control(ControlError::AlreadyRunning(_)))));
        assert_eq!(host.streams().len(), 1);
        assert!(host.streams()[0].running);

        host.shutdown();
        assert!(host.streams().is_empty());
    }

    #[test]
    fn test_stop_unknown_is_not_found() {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let host = host();
        let result = host.stop(target(&sender));
        assert!(matches!(result, Err(Error::Control(ControlError::NotFound(_)))));
    }

    #[test]
    fn test_finished_stream_is_restarted() {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
        let host = host();
        host.start(target(&sender)).unwrap();

        // an absurd frame header ends the session
        let mut buf = [0u8; 64];
        let (_, peer) = sender.recv_from(&mut buf).unwrap();
        sender.send_to(&u64::MAX.to_be_bytes(), peer).unwrap();
        for _ in 0..200 {
            if !host.streams()[0].running {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(!host.streams()[0].running);

        host.start(target(&sender)).unwrap();
        assert!(host.streams()[0].running);
        host.stop(target(&sender)).unwrap();
    }
}
