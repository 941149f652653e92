//! Microphone capture and utterance segmentation
//!
//! One continuous cpal input stream feeds a shared sample buffer. The
//! conversation loop drains it while listening; the barge-in monitor drains
//! it while a response is playing. The two consumers never overlap because
//! the monitor gates itself on the shared responding flag.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Minimum accumulated speech for a valid utterance (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.5s at 16kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Hard cap on a single utterance so a listen is never indefinite
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// Interval between buffer drains while listening
const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Cloneable handle onto the shared capture buffer
///
/// The cpal stream itself is not `Send`; the barge-in monitor task only ever
/// needs this handle.
#[derive(Clone, Debug, Default)]
pub struct CaptureBuffer {
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl CaptureBuffer {
    /// Take all samples captured since the last drain
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Discard any pending samples
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Append captured samples (fed from the input stream callback)
    pub fn push(&self, data: &[f32]) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.extend_from_slice(data);
        }
    }
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: CaptureBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if no input device offers a mono 16kHz configuration
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: CaptureBuffer::default(),
            stream: None,
        })
    }

    /// Start the input stream
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let stream = self
            .device
            .build_input_stream(
                &self.config.clone(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.push(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop the input stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take all samples captured since the last drain
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer.take()
    }

    /// Discard any pending samples
    pub fn clear_buffer(&self) {
        self.buffer.clear();
    }

    /// Handle onto the shared capture buffer for a concurrent consumer
    #[must_use]
    pub fn handle(&self) -> CaptureBuffer {
        self.buffer.clone()
    }

    /// Wait for one complete utterance
    ///
    /// Returns `None` if speech does not begin within `timeout`. Once speech
    /// starts, the utterance runs until trailing silence (or a hard length
    /// cap) regardless of the onset deadline.
    pub async fn listen(&self, energy_threshold: f32, timeout: Duration) -> Option<Vec<f32>> {
        self.clear_buffer();
        let mut detector = UtteranceDetector::new(energy_threshold);
        let started = Instant::now();

        loop {
            tokio::time::sleep(DRAIN_INTERVAL).await;

            let frame = self.take_buffer();
            if let Some(utterance) = detector.feed(&frame) {
                return Some(utterance);
            }

            if !detector.speech_started() && started.elapsed() > timeout {
                tracing::trace!("listen timed out before speech onset");
                return None;
            }

            if detector.speech_started() && started.elapsed() > timeout + MAX_UTTERANCE {
                tracing::warn!("utterance exceeded length cap, truncating");
                return detector.take();
            }
        }
    }
}

/// Segments a sample stream into utterances by energy gating
///
/// Speech begins when a frame's RMS exceeds the threshold; the utterance
/// ends after enough trailing silence. Sub-minimum blips are dropped.
#[derive(Debug)]
pub struct UtteranceDetector {
    energy_threshold: f32,
    buffer: Vec<f32>,
    speaking: bool,
    silence_run: usize,
}

impl UtteranceDetector {
    /// Create a detector with the given speech-onset RMS threshold
    #[must_use]
    pub fn new(energy_threshold: f32) -> Self {
        Self {
            energy_threshold,
            buffer: Vec::new(),
            speaking: false,
            silence_run: 0,
        }
    }

    /// Feed one frame; returns a complete utterance when silence closes it
    pub fn feed(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        if frame.is_empty() {
            return None;
        }

        let is_speech = rms(frame) > self.energy_threshold;

        if is_speech {
            self.speaking = true;
            self.silence_run = 0;
            self.buffer.extend_from_slice(frame);
            return None;
        }

        if !self.speaking {
            return None;
        }

        // Trailing silence is kept so STT sees a natural phrase end
        self.silence_run += frame.len();
        self.buffer.extend_from_slice(frame);

        if self.silence_run < SILENCE_SAMPLES {
            return None;
        }

        if self.buffer.len() - self.silence_run < MIN_SPEECH_SAMPLES {
            tracing::trace!(samples = self.buffer.len(), "discarding sub-minimum blip");
            self.reset();
            return None;
        }

        tracing::debug!(samples = self.buffer.len(), "utterance complete");
        self.take()
    }

    /// Whether speech onset has been observed
    #[must_use]
    pub const fn speech_started(&self) -> bool {
        self.speaking
    }

    /// Take whatever has accumulated, resetting the detector
    pub fn take(&mut self) -> Option<Vec<f32>> {
        self.speaking = false;
        self.silence_run = 0;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Drop accumulated audio and return to waiting for onset
    pub fn reset(&mut self) {
        self.speaking = false;
        self.silence_run = 0;
        self.buffer.clear();
    }
}

/// Root-mean-square amplitude of a sample window
///
/// Cheap proxy for "someone is speaking"; used both for speech onset and
/// barge-in detection.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to WAV bytes for the STT API
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
