//! Speech playback with cooperative cancellation
//!
//! `AudioPlayback` streams decoded samples to the default output device,
//! polling the shared interrupt signal at a sub-200ms tick so barge-in takes
//! effect mid-utterance instead of after full-text completion.
//! `PlaybackController` wraps it together with the synthesis client behind
//! the `Speaker` contract used by the turn orchestrator.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::interrupt::InterruptState;
use crate::turn::{SpeakOutcome, Speaker};
use crate::voice::tts::TtsClient;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device offers a usable configuration
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play samples, polling `cancel` every `poll` tick
    ///
    /// Returns `Cancelled` as soon as a poll observes the cancel condition;
    /// samples already handed to the device keep draining for at most one
    /// tick.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub async fn play(
        &self,
        samples: Vec<f32>,
        poll: Duration,
        cancel: impl Fn() -> bool,
    ) -> Result<SpeakOutcome> {
        if samples.is_empty() {
            return Ok(SpeakOutcome::Completed);
        }

        let config = self.config.clone();
        let channels = config.channels as usize;

        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(Mutex::new(0usize));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = match position_cb.lock() {
                        Ok(pos) => pos,
                        Err(_) => return,
                    };

                    for frame in data.chunks_mut(channels) {
                        let sample = if *pos < samples_cb.len() {
                            let s = samples_cb[*pos];
                            *pos += 1;
                            s
                        } else {
                            finished_cb.store(true, Ordering::Relaxed);
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Upper bound on the wait so a stalled device never hangs the turn
        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        let outcome = loop {
            if cancel() {
                tracing::debug!("playback cancelled");
                break SpeakOutcome::Cancelled;
            }
            if finished.load(Ordering::Relaxed) || Instant::now() > deadline {
                break SpeakOutcome::Completed;
            }
            tokio::time::sleep(poll).await;
        };

        drop(stream);
        tracing::debug!(samples = sample_count, ?outcome, "playback ended");

        Ok(outcome)
    }
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut rate_mismatch_logged = false;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if !rate_mismatch_logged
                    && u32::try_from(frame.sample_rate).ok() != Some(PLAYBACK_SAMPLE_RATE)
                {
                    tracing::warn!(
                        frame_rate = frame.sample_rate,
                        output_rate = PLAYBACK_SAMPLE_RATE,
                        "decoded sample rate differs from output rate, playback will be pitch-shifted"
                    );
                    rate_mismatch_logged = true;
                }

                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Cancellable, observable speech output
///
/// Owns the in-flight playback session; the interrupt signal is the only way
/// anything outside requests cancellation. Constructed once at startup with
/// fixed voice configuration and passed by reference wherever speech is
/// needed.
pub struct PlaybackController {
    tts: TtsClient,
    output: AudioPlayback,
    interrupt: Arc<InterruptState>,
    poll: Duration,
    speaking: AtomicBool,
}

impl PlaybackController {
    /// Create a controller around a synthesis client and output device
    #[must_use]
    pub fn new(
        tts: TtsClient,
        output: AudioPlayback,
        interrupt: Arc<InterruptState>,
        poll: Duration,
    ) -> Self {
        Self {
            tts,
            output,
            interrupt,
            poll,
            speaking: AtomicBool::new(false),
        }
    }

    async fn speak_inner(&self, text: &str) -> Result<SpeakOutcome> {
        // A signal raised before synthesis starts still cancels the sentence
        if self.interrupt.is_raised() {
            return Ok(SpeakOutcome::Cancelled);
        }

        let mp3 = self.tts.synthesize(text).await?;
        // Undecodable audio is a backend fault, not a device fault
        let samples = decode_mp3(&mp3).map_err(|e| Error::Tts(e.to_string()))?;

        let interrupt = Arc::clone(&self.interrupt);
        self.output
            .play(samples, self.poll, move || interrupt.is_raised())
            .await
    }
}

#[async_trait(?Send)]
impl Speaker for PlaybackController {
    /// Speak one sentence, suspending the caller until done or cancelled
    ///
    /// Synthesis failures are logged and reported as `Completed`: a broken
    /// voice degrades the experience but never ends the conversation loop.
    ///
    /// # Errors
    ///
    /// Returns error only for output-device failures
    async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        tracing::debug!(text, "speaking");
        self.speaking.store(true, Ordering::SeqCst);
        let result = self.speak_inner(text).await;
        self.speaking.store(false, Ordering::SeqCst);

        match result {
            Err(Error::Tts(e)) => {
                tracing::warn!(error = %e, "synthesis failed, continuing without audio");
                Ok(SpeakOutcome::Completed)
            }
            Err(Error::Http(e)) => {
                tracing::warn!(error = %e, "synthesis request failed, continuing without audio");
                Ok(SpeakOutcome::Completed)
            }
            other => other,
        }
    }

    /// Request cancellation; playback stops at its next poll tick
    fn stop(&self) {
        self.interrupt.raise();
    }

    /// Whether an utterance is currently being spoken
    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}
