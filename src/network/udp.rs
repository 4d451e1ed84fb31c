//! UDP socket helpers

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::config::NetworkConfig;
use crate::error::NetworkError;

/// Create a UDP socket bound to `addr`.
///
/// Port 0 asks the OS for an ephemeral port; read it back with `local_addr`.
pub fn create_socket(addr: SocketAddr, config: &NetworkConfig) -> Result<UdpSocket, NetworkError> {
    let bind_err = |e: io::Error| NetworkError::BindFailed(format!("{}: {}", addr, e));

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;

    if config.socket_buffer_size > 0 {
        // Best effort: some platforms cap the buffer sizes
        if let Err(e) = socket.set_recv_buffer_size(config.socket_buffer_size) {
            tracing::debug!("Could not set receive buffer size: {}", e);
        }
        if let Err(e) = socket.set_send_buffer_size(config.socket_buffer_size) {
            tracing::debug!("Could not set send buffer size: {}", e);
        }
    }

    socket.bind(&addr.into()).map_err(bind_err)?;
    Ok(socket.into())
}

/// IP of the interface used to reach other hosts, or loopback when offline.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ip() -> IpAddr {
    let probe = || -> io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// No datagram was pending on a non-blocking or timed read
pub fn is_would_block(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// ICMP feedback from a peer that is not (yet) listening.
///
/// Reported on a later call of an unrelated send or receive; it does not
/// affect the socket itself.
pub fn is_peer_unreachable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}
