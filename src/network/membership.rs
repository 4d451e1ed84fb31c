//! Traffic-inferred receiver membership for one sender
//!
//! A receiver joins by sending any datagram and stays while it keeps sending.
//! There is no leave message: a member silent for longer than the liveness
//! window is dropped on the next `expire_stale` call.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Live receiver set, owned by the sender worker
#[derive(Debug, Default)]
pub struct MembershipTracker {
    last_seen: HashMap<SocketAddr, Instant>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record traffic from `addr`. Returns true if it just joined.
    pub fn observe(&mut self, addr: SocketAddr, now: Instant) -> bool {
        match self.last_seen.insert(addr, now) {
            Some(_) => false,
            None => {
                tracing::info!("Receiver {} joined", addr);
                true
            }
        }
    }

    /// Remove and return members silent for longer than `window`
    pub fn expire_stale(&mut self, now: Instant, window: Duration) -> Vec<SocketAddr> {
        let mut expired = Vec::new();
        self.last_seen.retain(|addr, seen| {
            let alive = now.saturating_duration_since(*seen) <= window;
            if !alive {
                expired.push(*addr);
            }
            alive
        });

        for addr in &expired {
            tracing::info!("Receiver {} left (silent for more than {:?})", addr, window);
        }
        expired
    }

    /// Current members in address order
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        let mut members: Vec<_> = self.last_seen.keys().copied().collect();
        members.sort();
        members
    }

    pub fn iter(&self) -> impl Iterator<Item = &SocketAddr> {
        self.last_seen.keys()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.last_seen.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
