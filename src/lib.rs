//! # LAN Audio Relay
//!
//! Live audio distribution over a local network without central mixing.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐        registration push (HTTP, every 3s)
//! │        INPUT HOST        │ ───────────────────────────────────────────┐
//! │  capture ─► StreamSender │                                            ▼
//! │     (hosts::input)       │                          ┌──────────────────────────────┐
//! └────────────┬─────────────┘                          │      DIRECTORY SERVICE       │
//!              │ UDP fan-out                            │  InputRegistry ─► Routing    │
//!              │ [u64 len | PCM chunk]                  │   (prune 5s)     Orchestrator│
//!              │ ◄── keep-alive datagrams               └──────────────┬───────────────┘
//!              ▼                                                       │ start/stop (HTTP)
//! ┌──────────────────────────┐                                         │
//! │       OUTPUT HOST        │ ◄───────────────────────────────────────┘
//! │  StreamReceiver ─► sink  │
//! │     (hosts::output)      │
//! └──────────────────────────┘
//! ```
//!
//! Senders learn their receivers purely from traffic: a receiver joins by
//! sending any datagram and stays a member while it keeps sending
//! (`network::membership`). The directory learns inputs the same way, from
//! periodic registration pushes (`directory::registry`).

pub mod api;
pub mod audio;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod hosts;
pub mod network;
pub mod protocol;
pub mod trigger;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default sample rate for captured audio
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Default number of sample frames per capture chunk
    pub const DEFAULT_CHUNK_FRAMES: u32 = 1024;

    /// Silence after which a receiver is dropped from a sender's fan-out set
    pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(3);

    /// Age after which an unrefreshed input registration is pruned
    pub const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Interval between registration pushes from an input host
    pub const DEFAULT_REGISTRATION_INTERVAL: Duration = Duration::from_secs(3);

    /// Timeout applied to every registration push
    pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(2);

    /// Interval between routing reconciliation passes
    pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(2);

    /// Interval between registry pruning passes
    pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(1);

    /// Default control port of the directory service
    pub const DEFAULT_DIRECTORY_PORT: u16 = 7000;

    /// Default control port of an output host
    pub const DEFAULT_OUTPUT_CONTROL_PORT: u16 = 5000;

    /// Receive buffer used by stream receivers
    pub const RECV_BUFFER_SIZE: usize = 4096;

    /// Maximum UDP payload per datagram sent by a stream sender
    pub const MAX_DATAGRAM_SIZE: usize = 1472; // MTU - IP/UDP headers

    /// Upper bound on a declared wire frame length
    pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 20;

    /// Payload of the receiver keep-alive datagram (content is ignored)
    pub const ANNOUNCE_MESSAGE: &[u8] = b"relay: client alive";

    /// Playback ring buffer capacity (in chunks)
    pub const PLAYBACK_BUFFER_CHUNKS: usize = 32;

    /// How long a fired trigger is reported as recently fired
    pub const TRIGGER_DISPLAY_WINDOW: Duration = Duration::from_secs(5);
}
