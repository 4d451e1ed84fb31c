//! Wire codec for audio chunks
//!
//! Chunks travel as raw PCM; the codec only adds the length prefix the
//! receiver needs to reassemble frames that span several datagrams.

pub mod frame;

pub use frame::{encode, encode_into, FrameDecoder, LENGTH_PREFIX_LEN};
