//! Audio playback to output devices

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;

use crate::audio::buffer::{create_shared_buffer, ChunkReader, SharedRingBuffer};
use crate::audio::device::{get_default_output_device, get_device_by_id, DeviceKind};
use crate::audio::{AudioSink, SinkFactory};
use crate::config::{SampleFormat, StreamFormat};
use crate::error::AudioError;

/// Opens a cpal output stream for one playback device
pub struct CpalPlaybackFactory {
    /// Device identifier; the default output when `None`
    device_id: Option<String>,
    format: StreamFormat,
    buffer_chunks: usize,
}

impl CpalPlaybackFactory {
    pub fn new(device_id: Option<String>, format: StreamFormat, buffer_chunks: usize) -> Self {
        Self {
            device_id,
            format,
            buffer_chunks,
        }
    }
}

impl SinkFactory for CpalPlaybackFactory {
    fn open(&self) -> Result<Box<dyn AudioSink>, AudioError> {
        let device = match &self.device_id {
            Some(id) => get_device_by_id(id, DeviceKind::Output)?,
            None => get_default_output_device()?,
        };

        let config = StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = create_shared_buffer(self.buffer_chunks);
        let mut reader = ChunkReader::new(buffer.clone());
        let on_error = |err: cpal::StreamError| tracing::warn!("Playback stream error: {}", err);

        let inner = device.into_inner();
        let stream = match self.format.sample_format {
            SampleFormat::I16 => inner.build_output_stream(
                &config,
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    for sample in out.iter_mut() {
                        *sample = reader.next_i16().unwrap_or(0);
                    }
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => inner.build_output_stream(
                &config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in out.iter_mut() {
                        *sample = reader.next_f32().unwrap_or(0.0);
                    }
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!(
            "Playback opened on {}: {}Hz, {} channels",
            self.device_id.as_deref().unwrap_or("default output"),
            self.format.sample_rate,
            self.format.channels
        );

        Ok(Box::new(CpalPlayback {
            _stream: stream,
            buffer,
        }))
    }
}

/// Live playback stream; dropping it releases the device
struct CpalPlayback {
    _stream: cpal::Stream,
    buffer: SharedRingBuffer,
}

impl AudioSink for CpalPlayback {
    fn write_chunk(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        if !self.buffer.push(bytes::Bytes::copy_from_slice(pcm)) {
            tracing::debug!(
                "Playback buffer full, dropped chunk ({} overflows)",
                self.buffer.overflow_count()
            );
        }
        Ok(())
    }
}
