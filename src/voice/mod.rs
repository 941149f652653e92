//! Voice processing module
//!
//! Microphone capture and utterance segmentation, cancellable playback,
//! barge-in monitoring, and the STT/TTS backend clients.

pub mod capture;
pub mod monitor;
pub mod playback;
pub mod stt;
pub mod tts;

pub use capture::{AudioCapture, CaptureBuffer, SAMPLE_RATE, UtteranceDetector, rms, samples_to_wav};
pub use monitor::InterruptMonitor;
pub use playback::{AudioPlayback, PlaybackController};
pub use stt::{SttError, Transcriber, WhisperStt};
pub use tts::TtsClient;
