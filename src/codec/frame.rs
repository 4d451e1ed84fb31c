//! Length-prefixed wire frames
//!
//! A wire frame is an 8-byte big-endian length followed by exactly that many
//! payload bytes. There is no sync marker: the decoder trusts the declared
//! length, so a lost fragment desynchronises the stream for good.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::DEFAULT_MAX_FRAME_BYTES;
use crate::error::FrameError;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Encode a payload into a single wire frame.
pub fn encode(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    encode_into(payload, &mut out);
    out.freeze()
}

/// Append the wire frame for `payload` to `out`.
pub fn encode_into(payload: &[u8], out: &mut BytesMut) {
    out.reserve(LENGTH_PREFIX_LEN + payload.len());
    out.put_u64(payload.len() as u64);
    out.put_slice(payload);
}

/// Incremental wire frame decoder
///
/// Bytes are fed in whatever pieces the transport delivers; `decode` yields a
/// frame once all of its bytes are buffered and keeps any surplus for the next
/// one.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Payload length of the frame being assembled, once its prefix was read
    pending_len: Option<usize>,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            pending_len: None,
            max_frame_len,
        }
    }

    /// Append received bytes to the reassembly buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one complete frame out of the buffer.
    ///
    /// `Ok(None)` means more bytes are needed.
    pub fn decode(&mut self) -> Result<Option<Bytes>, FrameError> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if self.buffer.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let declared = self.buffer.get_u64();
                let len = usize::try_from(declared)
                    .ok()
                    .filter(|len| *len <= self.max_frame_len)
                    .ok_or(FrameError::TooLarge {
                        declared,
                        max: self.max_frame_len,
                    })?;
                self.pending_len = Some(len);
                len
            }
        };

        if self.buffer.len() < len {
            return Ok(None);
        }

        self.pending_len = None;
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Bytes buffered but not yet returned, excluding a consumed length prefix
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a length prefix has been read and its payload is still incomplete
    pub fn is_mid_frame(&self) -> bool {
        self.pending_len.is_some()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
