//! Wire and control-plane types shared by inputs, outputs and the directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use crate::error::{ControlError, NetworkError};

/// Address of a UDP socket as advertised between hosts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamEndpoint {
    pub host: String,
    pub port: u16,
}

impl StreamEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to a concrete socket address.
    ///
    /// Literal IPs are used as-is; anything else goes through the system resolver.
    pub fn to_socket_addr(&self) -> Result<SocketAddr, NetworkError> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", self, e)))?
            .next()
            .ok_or_else(|| NetworkError::InvalidAddress(self.to_string()))
    }
}

impl From<SocketAddr> for StreamEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One entry of a registration push from an input host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAnnouncement {
    /// Stable input identifier; when absent the endpoint is the identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub endpoint: StreamEndpoint,
    /// Names of the outputs this input wants to reach
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl InputAnnouncement {
    pub fn new(endpoint: StreamEndpoint, outputs: Vec<String>) -> Self {
        Self {
            id: None,
            name: None,
            endpoint,
            outputs,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Directory view of one live input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputStatus {
    pub key: String,
    pub name: Option<String>,
    pub endpoint: StreamEndpoint,
    pub outputs: Vec<String>,
    pub activated: bool,
    pub first_seen: DateTime<Utc>,
    pub age_ms: u64,
}

/// Per-entry answer to a registration push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    /// Registry key of an accepted entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One receiver on an output host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputStreamStatus {
    pub input: StreamEndpoint,
    pub running: bool,
    pub frames_received: u64,
}

/// Query string of the output host's start/stop routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamControlQuery {
    pub ip: Option<String>,
    pub port: Option<String>,
}

/// A validated input endpoint that an output host may stream from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget(SocketAddrV4);

impl StreamTarget {
    /// Validate a dotted-quad IPv4 address and a port in `[0, 65535]`.
    pub fn parse(ip: &str, port: &str) -> Result<Self, ControlError> {
        let ip = parse_dotted_quad(ip)
            .ok_or_else(|| ControlError::InvalidTarget(format!("invalid ip '{}'", ip)))?;

        let port = port
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| ControlError::InvalidTarget(format!("invalid port '{}'", port)))?;

        Ok(Self(SocketAddrV4::new(ip, port)))
    }

    /// Validate both query parameters, reporting whichever is missing first.
    pub fn from_query(query: &StreamControlQuery) -> Result<Self, ControlError> {
        let ip = query
            .ip
            .as_deref()
            .ok_or(ControlError::MissingParameter("ip"))?;
        let port = query
            .port
            .as_deref()
            .ok_or(ControlError::MissingParameter("port"))?;
        Self::parse(ip, port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }

    pub fn endpoint(&self) -> StreamEndpoint {
        StreamEndpoint::from(self.socket_addr())
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Four groups of one to three digits, each at most 255. Leading zeros are accepted.
fn parse_dotted_quad(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');

    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())?;
    }

    if parts.next().is_some() {
        return None;
    }

    Some(Ipv4Addr::from(octets))
}
