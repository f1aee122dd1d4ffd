//! Speech playback through a rodio output stream.

use crate::audio::AudioAsset;
use crate::error::SynthesisError;
use rodio::{Decoder, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

/// Turns encoded audio bytes into a playable asset.
pub trait AudioOutput: Send + Sync {
    fn load(&self, bytes: Vec<u8>) -> Result<Box<dyn AudioAsset>, SynthesisError>;
}

/// Plays assets on an open rodio output stream.
///
/// The `OutputStream` itself must outlive this handle; keep it on the thread
/// that opened it.
#[derive(Clone)]
pub struct RodioOutput {
    handle: OutputStreamHandle,
}

impl RodioOutput {
    pub fn new(handle: OutputStreamHandle) -> Self {
        Self { handle }
    }
}

impl AudioOutput for RodioOutput {
    fn load(&self, bytes: Vec<u8>) -> Result<Box<dyn AudioAsset>, SynthesisError> {
        let duration = measure_duration(&bytes)?;
        let source = decode(&bytes)?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|err| SynthesisError::Provider(format!("audio output: {err}")))?;
        sink.pause();
        sink.append(source);
        debug!(duration_ms = duration.as_millis() as u64, "Loaded speech into sink");
        Ok(Box::new(RodioAsset {
            sink,
            bytes,
            duration,
        }))
    }
}

fn decode(bytes: &[u8]) -> Result<Decoder<Cursor<Vec<u8>>>, SynthesisError> {
    Decoder::new(Cursor::new(bytes.to_vec())).map_err(|err| SynthesisError::Decode(err.to_string()))
}

/// Decoder-reported duration, else counted from the decoded samples.
pub(crate) fn measure_duration(bytes: &[u8]) -> Result<Duration, SynthesisError> {
    let decoder = decode(bytes)?;
    if let Some(duration) = decoder.total_duration() {
        return Ok(duration);
    }
    let channels = u64::from(decoder.channels().max(1));
    let rate = u64::from(decoder.sample_rate().max(1));
    let samples = decoder.count() as u64;
    Ok(Duration::from_secs_f64(samples as f64 / (channels * rate) as f64))
}

/// A decoded clip queued on its own paused sink.
///
/// The encoded bytes are kept so a drained sink can be refilled.
pub struct RodioAsset {
    sink: Sink,
    bytes: Vec<u8>,
    duration: Duration,
}

impl AudioAsset for RodioAsset {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn set_playback_rate(&self, rate: f32) {
        self.sink.set_speed(rate);
    }

    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn restart(&self) {
        match decode(&self.bytes) {
            Ok(source) => {
                self.sink.clear();
                self.sink.append(source);
                self.sink.play();
            }
            Err(err) => warn!("Failed to rewind speech: {err}"),
        }
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}
