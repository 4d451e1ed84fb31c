//! Input and output host roles

pub mod input;
pub mod output;

use std::sync::Arc;

use crate::audio::synth::parse_tone_device;
use crate::audio::{
    AudioSink, AudioSource, CpalCaptureFactory, CpalPlaybackFactory, NullSink, SinkFactory, SourceFactory,
    ToneSource,
};
use crate::config::StreamFormat;
use crate::error::AudioError;

pub use input::InputHost;
pub use output::OutputHost;

/// Capture source for a configured device id.
///
/// `tone:<hz>` is a test tone, `default` or an empty id the default input.
pub fn source_factory(device: &str, format: StreamFormat) -> Arc<dyn SourceFactory> {
    if let Some(frequency) = parse_tone_device(device) {
        return Arc::new(move || -> Result<Box<dyn AudioSource>, AudioError> {
            Ok(Box::new(ToneSource::new(format, frequency)))
        });
    }

    let device_id = match device {
        "" | "default" => None,
        id => Some(id.to_string()),
    };
    Arc::new(CpalCaptureFactory::new(device_id, format))
}

/// Playback sink for a configured device id; `null` discards audio
pub fn sink_factory(device: Option<&str>, format: StreamFormat, buffer_chunks: usize) -> Arc<dyn SinkFactory> {
    match device {
        Some("null") => Arc::new(|| -> Result<Box<dyn AudioSink>, AudioError> { Ok(Box::new(NullSink)) }),
        Some("") | Some("default") | None => Arc::new(CpalPlaybackFactory::new(None, format, buffer_chunks)),
        Some(id) => Arc::new(CpalPlaybackFactory::new(Some(id.to_string()), format, buffer_chunks)),
    }
}
