//! Hardware-free audio endpoints
//!
//! `tone:<hz>` inputs and `null` outputs let a relay run on machines without
//! sound cards.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Instant;

use crate::audio::{AudioSink, AudioSource};
use crate::config::{SampleFormat, StreamFormat};
use crate::error::AudioError;

/// Parse a `tone:<hz>` device id
pub fn parse_tone_device(id: &str) -> Option<f32> {
    id.strip_prefix("tone:")?
        .parse::<f32>()
        .ok()
        .filter(|hz| hz.is_finite() && *hz > 0.0)
}

/// Sine generator paced at the real-time chunk rate
pub struct ToneSource {
    format: StreamFormat,
    frequency: f32,
    amplitude: f32,
    phase: f32,
    next_due: Option<Instant>,
}

impl ToneSource {
    pub fn new(format: StreamFormat, frequency: f32) -> Self {
        Self {
            format,
            frequency,
            amplitude: 0.25,
            phase: 0.0,
            next_due: None,
        }
    }

    fn render(&mut self) -> Bytes {
        let frames = self.format.chunk_frames as usize;
        let channels = self.format.channels as usize;
        let step = std::f32::consts::TAU * self.frequency / self.format.sample_rate as f32;
        let mut out = BytesMut::with_capacity(self.format.chunk_bytes());

        for _ in 0..frames {
            let value = self.phase.sin() * self.amplitude;
            self.phase = (self.phase + step) % std::f32::consts::TAU;
            for _ in 0..channels {
                match self.format.sample_format {
                    SampleFormat::I16 => out.put_i16_le((value * i16::MAX as f32) as i16),
                    SampleFormat::F32 => out.put_f32_le(value),
                }
            }
        }

        out.freeze()
    }
}

impl AudioSource for ToneSource {
    fn read_chunk(&mut self) -> Result<Option<Bytes>, AudioError> {
        let tick = self.format.chunk_duration();
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);

        if due > now {
            std::thread::sleep(due - now);
        }
        // after a long stall, resume from now instead of bursting to catch up
        let next = due + tick;
        self.next_due = Some(if next + tick < Instant::now() { Instant::now() } else { next });

        Ok(Some(self.render()))
    }
}

/// Discards everything written to it
pub struct NullSink;

impl AudioSink for NullSink {
    fn write_chunk(&mut self, _pcm: &[u8]) -> Result<(), AudioError> {
        Ok(())
    }
}
