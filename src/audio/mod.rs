//! Audio subsystem module
//!
//! Stream workers only see the [`AudioSource`] and [`AudioSink`] traits. The
//! cpal-backed implementations are opened on the worker thread through a
//! factory, because cpal streams may not cross threads.

pub mod buffer;
pub mod capture;
pub mod device;
pub mod playback;
pub mod synth;

use bytes::Bytes;

use crate::error::AudioError;

pub use buffer::RingBuffer;
pub use capture::CpalCaptureFactory;
pub use device::{list_devices, AudioDevice, AudioDeviceInfo};
pub use playback::CpalPlaybackFactory;
pub use synth::{NullSink, ToneSource};

/// Produces fixed-size PCM chunks for a stream sender
pub trait AudioSource {
    /// Wait a bounded time for the next chunk.
    ///
    /// `Ok(None)` means no chunk was ready yet; errors end the stream.
    fn read_chunk(&mut self) -> Result<Option<Bytes>, AudioError>;
}

/// Consumes PCM chunks delivered by a stream receiver
pub trait AudioSink {
    fn write_chunk(&mut self, pcm: &[u8]) -> Result<(), AudioError>;
}

/// Opens a capture source on the calling thread
pub trait SourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSource>, AudioError>;
}

/// Opens a playback sink on the calling thread
pub trait SinkFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSink>, AudioError>;
}

impl<F> SourceFactory for F
where
    F: Fn() -> Result<Box<dyn AudioSource>, AudioError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        self()
    }
}

impl<F> SinkFactory for F
where
    F: Fn() -> Result<Box<dyn AudioSink>, AudioError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn AudioSink>, AudioError> {
        self()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sources and sinks for stream tests

    use super::*;
    use crossbeam_channel::Sender;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Emits numbered chunks of `len` bytes every `tick`
    pub struct CountingSource {
        pub len: usize,
        pub tick: Duration,
        pub next: u8,
    }

    impl AudioSource for CountingSource {
        fn read_chunk(&mut self) -> Result<Option<Bytes>, AudioError> {
            std::thread::sleep(self.tick);
            let chunk = Bytes::from(vec![self.next; self.len]);
            self.next = self.next.wrapping_add(1);
            Ok(Some(chunk))
        }
    }

    pub fn counting_source(len: usize, tick: Duration) -> Arc<dyn SourceFactory> {
        Arc::new(move || -> Result<Box<dyn AudioSource>, AudioError> {
            Ok(Box::new(CountingSource { len, tick, next: 0 }))
        })
    }

    /// Like [`counting_source`], but opening takes `delay`
    pub fn slow_source(delay: Duration) -> Arc<dyn SourceFactory> {
        Arc::new(move || -> Result<Box<dyn AudioSource>, AudioError> {
            std::thread::sleep(delay);
            Ok(Box::new(CountingSource {
                len: 16,
                tick: Duration::from_millis(5),
                next: 0,
            }))
        })
    }

    pub fn failing_source() -> Arc<dyn SourceFactory> {
        Arc::new(|| -> Result<Box<dyn AudioSource>, AudioError> {
            Err(AudioError::DeviceNotFound("input:missing".into()))
        })
    }

    /// Forwards every chunk into a channel
    pub struct ChannelSink(pub Sender<Bytes>);

    impl AudioSink for ChannelSink {
        fn write_chunk(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
            let _ = self.0.send(Bytes::copy_from_slice(pcm));
            Ok(())
        }
    }

    pub fn channel_sink(tx: Sender<Bytes>) -> Arc<dyn SinkFactory> {
        Arc::new(move || -> Result<Box<dyn AudioSink>, AudioError> {
            Ok(Box::new(ChannelSink(tx.clone())))
        })
    }

    /// Counts how many sinks were opened
    pub fn counting_null_sink(opened: Arc<AtomicUsize>) -> Arc<dyn SinkFactory> {
        Arc::new(move || -> Result<Box<dyn AudioSink>, AudioError> {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullSink))
        })
    }
}
