//! Audio capture from input devices
//!
//! The cpal callback slices device buffers into a channel; the stream sender
//! reassembles them into fixed-size chunks on its own thread.

use bytes::{Bytes, BytesMut};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::device::{get_default_input_device, get_device_by_id, DeviceKind};
use crate::audio::{AudioSource, SourceFactory};
use crate::config::{SampleFormat, StreamFormat};
use crate::error::AudioError;

/// Device buffers queued between the callback and the sender
const CAPTURE_QUEUE_DEPTH: usize = 64;

/// Opens a cpal input stream for one capture device
pub struct CpalCaptureFactory {
    /// Device identifier; the default input when `None`
    device_id: Option<String>,
    format: StreamFormat,
}

impl CpalCaptureFactory {
    pub fn new(device_id: Option<String>, format: StreamFormat) -> Self {
        Self { device_id, format }
    }

    fn build<T: SizedSample + Send + 'static>(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        data_tx: Sender<Vec<u8>>,
        error_tx: Sender<AudioError>,
        overflows: Arc<AtomicU64>,
        encode: fn(&[T], &mut Vec<u8>),
    ) -> Result<cpal::Stream, AudioError> {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let mut bytes = Vec::with_capacity(data.len() * std::mem::size_of::<T>());
                    encode(data, &mut bytes);
                    if data_tx.try_send(bytes).is_err() {
                        overflows.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))
    }
}

impl SourceFactory for CpalCaptureFactory {
    fn open(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        let device = match &self.device_id {
            Some(id) => get_device_by_id(id, DeviceKind::Input)?,
            None => get_default_input_device()?,
        };

        let config = StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.format.chunk_frames),
        };

        let (data_tx, data_rx) = bounded::<Vec<u8>>(CAPTURE_QUEUE_DEPTH);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let overflows = Arc::new(AtomicU64::new(0));

        let inner = device.into_inner();
        let stream = match self.format.sample_format {
            SampleFormat::I16 => self.build::<i16>(&inner, &config, data_tx, error_tx, overflows.clone(), |data, out| {
                data.iter().for_each(|s| out.extend_from_slice(&s.to_le_bytes()))
            })?,
            SampleFormat::F32 => self.build::<f32>(&inner, &config, data_tx, error_tx, overflows.clone(), |data, out| {
                data.iter().for_each(|s| out.extend_from_slice(&s.to_le_bytes()))
            })?,
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!(
            "Capture opened on {}: {}Hz, {} channels, {} frames/chunk",
            self.device_id.as_deref().unwrap_or("default input"),
            self.format.sample_rate,
            self.format.channels,
            self.format.chunk_frames
        );

        Ok(Box::new(CpalCapture {
            _stream: stream,
            device: self.device_id.clone().unwrap_or_else(|| "default input".into()),
            overflows,
            data_rx,
            error_rx,
            pending: BytesMut::with_capacity(self.format.chunk_bytes() * 2),
            chunk_bytes: self.format.chunk_bytes(),
            // Twice a tick: long enough for one device buffer, short enough for a prompt stop
            wait: self.format.chunk_duration() * 2,
        }))
    }
}

/// Live capture stream; dropping it stops the device
struct CpalCapture {
    _stream: cpal::Stream,
    device: String,
    /// Device buffers dropped because the sender fell behind
    overflows: Arc<AtomicU64>,
    data_rx: Receiver<Vec<u8>>,
    error_rx: Receiver<AudioError>,
    pending: BytesMut,
    chunk_bytes: usize,
    wait: Duration,
}

impl AudioSource for CpalCapture {
    fn read_chunk(&mut self) -> Result<Option<Bytes>, AudioError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        while self.pending.len() < self.chunk_bytes {
            match self.data_rx.recv_timeout(self.wait) {
                Ok(data) => self.pending.extend_from_slice(&data),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(AudioError::CaptureClosed),
            }
        }

        Ok(Some(self.pending.split_to(self.chunk_bytes).freeze()))
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        let overflows = self.overflows.load(Ordering::Relaxed);
        if overflows > 0 {
            tracing::warn!("Capture on {} closed after dropping {} device buffers", self.device, overflows);
        } else {
            tracing::debug!("Capture on {} closed", self.device);
        }
    }
}
