//! Application configuration
//!
//! Every host role reads the same `AppConfig`; each binary only looks at the
//! sections it needs. Durations are stored in milliseconds.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::Error;
use crate::protocol::StreamEndpoint;

/// PCM sample encoding carried in a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Shape of every chunk in a stream; senders and receivers must agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_frames: u32,
    pub sample_format: SampleFormat,
}

impl StreamFormat {
    /// Size of one chunk in bytes
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames as usize * self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Wall-clock length of one chunk, i.e. one capture tick
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_frames as f64 / self.sample_rate as f64)
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            sample_format: SampleFormat::I16,
        }
    }
}

/// Transport tuning shared by senders and receivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Largest datagram a sender emits; frames above this are split
    pub max_datagram_size: usize,
    /// Receive buffer per `recv` call on the receiver
    pub recv_buffer_size: usize,
    /// Kernel socket buffer sizes (bytes), 0 keeps the OS default
    pub socket_buffer_size: usize,
    /// Silence after which a receiver leaves a sender's fan-out set
    pub liveness_window_ms: u64,
    /// Receiver read timeout; bounds stop latency
    pub recv_timeout_ms: u64,
    /// Upper bound for a declared frame length
    pub max_frame_bytes: usize,
}

impl NetworkConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_DATAGRAM_SIZE,
            recv_buffer_size: RECV_BUFFER_SIZE,
            socket_buffer_size: 256 * 1024,
            liveness_window_ms: DEFAULT_LIVENESS_WINDOW.as_millis() as u64,
            recv_timeout_ms: 100,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// One capture point served by an input host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputStreamConfig {
    /// Stable id; a random one is generated when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Capture device id (`input:<name>`), bare device name, or `tone:<hz>`
    pub device: String,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Input host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputHostConfig {
    /// Directory service control address
    pub directory: StreamEndpoint,
    /// IP advertised to the directory; auto-detected when absent
    pub advertise_ip: Option<String>,
    pub registration_interval_ms: u64,
    pub registration_timeout_ms: u64,
    pub streams: Vec<InputStreamConfig>,
}

impl InputHostConfig {
    pub fn registration_interval(&self) -> Duration {
        Duration::from_millis(self.registration_interval_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }
}

impl Default for InputHostConfig {
    fn default() -> Self {
        Self {
            directory: StreamEndpoint::new("127.0.0.1", DEFAULT_DIRECTORY_PORT),
            advertise_ip: None,
            registration_interval_ms: DEFAULT_REGISTRATION_INTERVAL.as_millis() as u64,
            registration_timeout_ms: DEFAULT_REGISTRATION_TIMEOUT.as_millis() as u64,
            streams: Vec::new(),
        }
    }
}

/// Output host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputHostConfig {
    /// Bind address of the stream-control HTTP API
    pub control_bind: SocketAddr,
    /// Playback device id, `null`, or the default output when absent
    pub device: Option<String>,
    /// Playback ring buffer capacity in chunks
    pub buffer_chunks: usize,
}

impl Default for OutputHostConfig {
    fn default() -> Self {
        Self {
            control_bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_OUTPUT_CONTROL_PORT)),
            device: None,
            buffer_chunks: PLAYBACK_BUFFER_CHUNKS,
        }
    }
}

/// A named output; more than one host makes it a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    /// Control endpoints of the output hosts behind this name
    pub hosts: Vec<StreamEndpoint>,
}

/// Command run when a trigger fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerCommand {
    /// Issue a GET request and require a success status
    HttpGet { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActionConfig {
    pub id: String,
    #[serde(flatten)]
    pub command: TriggerCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub id: String,
    #[serde(default)]
    pub actions: Vec<TriggerActionConfig>,
}

/// Directory service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub bind: SocketAddr,
    pub input_timeout_ms: u64,
    pub prune_interval_ms: u64,
    pub reconcile_interval_ms: u64,
    /// Timeout of each remote start/stop call
    pub control_timeout_ms: u64,
    pub outputs: Vec<OutputConfig>,
    pub triggers: Vec<TriggerConfig>,
}

impl DirectoryConfig {
    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_DIRECTORY_PORT)),
            input_timeout_ms: DEFAULT_INPUT_TIMEOUT.as_millis() as u64,
            prune_interval_ms: DEFAULT_PRUNE_INTERVAL.as_millis() as u64,
            reconcile_interval_ms: DEFAULT_RECONCILE_INTERVAL.as_millis() as u64,
            control_timeout_ms: 2_000,
            outputs: Vec::new(),
            triggers: Vec::new(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamFormat,
    pub network: NetworkConfig,
    pub input: InputHostConfig,
    pub output: OutputHostConfig,
    pub directory: DirectoryConfig,
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load from `path` if given, else the platform config file, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `config.toml` in the platform configuration directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-audio-relay").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), Error> {
        let checks = [
            (self.stream.sample_rate == 0, "stream.sample_rate must be positive"),
            (self.stream.channels == 0, "stream.channels must be positive"),
            (self.stream.chunk_frames == 0, "stream.chunk_frames must be positive"),
            (self.network.max_datagram_size == 0, "network.max_datagram_size must be positive"),
            (self.network.recv_buffer_size < self.network.max_datagram_size,
                "network.recv_buffer_size must hold a full datagram"),
            (self.network.liveness_window_ms == 0, "network.liveness_window_ms must be positive"),
            (self.network.recv_timeout_ms == 0, "network.recv_timeout_ms must be positive"),
            (self.network.max_frame_bytes < self.stream.chunk_bytes(),
                "network.max_frame_bytes is smaller than one chunk"),
            (self.input.registration_interval_ms == 0, "input.registration_interval_ms must be positive"),
            (self.output.buffer_chunks == 0, "output.buffer_chunks must be positive"),
            (self.directory.input_timeout_ms == 0, "directory.input_timeout_ms must be positive"),
            (self.directory.prune_interval_ms == 0, "directory.prune_interval_ms must be positive"),
            (self.directory.reconcile_interval_ms == 0, "directory.reconcile_interval_ms must be positive"),
        ];

        if let Some((_, msg)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(Error::Config(msg.to_string()));
        }

        let mut names = std::collections::HashSet::new();
        for output in &self.directory.outputs {
            if output.hosts.is_empty() {
                return Err(Error::Config(format!("output '{}' has no hosts", output.name)));
            }
            if !names.insert(output.name.as_str()) {
                return Err(Error::Config(format!("duplicate output '{}'", output.name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.chunk_bytes(), 2048);
        assert_eq!(config.network.liveness_window(), Duration::from_secs(3));
        assert_eq!(config.directory.input_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_chunk_duration() {
        let format = StreamFormat::default();
        let tick = format.chunk_duration();
        assert!(tick > Duration::from_millis(23) && tick < Duration::from_millis(24));
    }

    #[test]
    fn test_parse_full_document() {
        let text = r#"
            [stream]
            channels = 2
            sample_format = "f32"

            [network]
            liveness_window_ms = 1500

            [input]
            directory = { host = "192.168.1.50", port = 7000 }

            [[input.streams]]
            name = "Stage mic"
            device = "tone:440"
            outputs = ["hall"]

            [directory]
            bind = "0.0.0.0:7100"

            [[directory.outputs]]
            name = "hall"
            hosts = [{ host = "192.168.1.110", port = 5000 }, { host = "192.168.1.111", port = 5000 }]

            [[directory.triggers]]
            id = "doorbell"
            actions = [{ id = "chime", kind = "http_get", url = "http://192.168.1.120/chime" }]
        "#;

        let config = AppConfig::from_toml(text).unwrap();
        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.stream.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.stream.chunk_bytes(), 1024 * 2 * 4);
        assert_eq!(config.network.liveness_window(), Duration::from_millis(1500));
        assert_eq!(config.input.directory, StreamEndpoint::new("192.168.1.50", 7000));
        assert_eq!(config.input.streams[0].outputs, vec!["hall".to_string()]);
        assert_eq!(config.directory.outputs[0].hosts.len(), 2);
        assert_eq!(
            config.directory.triggers[0].actions[0].command,
            TriggerCommand::HttpGet {
                url: "http://192.168.1.120/chime".into()
            }
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.network.liveness_window_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.directory.outputs = vec![
            OutputConfig { name: "a".into(), hosts: vec![StreamEndpoint::new("10.0.0.1", 5000)] },
            OutputConfig { name: "a".into(), hosts: vec![StreamEndpoint::new("10.0.0.2", 5000)] },
        ];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
