//! Voice pipeline integration tests
//!
//! Exercises the segmenter, interrupt plumbing, barge-in monitor, and turn
//! orchestration without requiring audio hardware.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use parley::voice::{CaptureBuffer, InterruptMonitor, SAMPLE_RATE, UtteranceDetector, rms,
    samples_to_wav};
use parley::{
    InterruptState, Result, SpeakOutcome, Speaker, TokenStream, TurnOutcome, run_turn, sentences,
};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

#[test]
fn utterance_detector_segments_speech_from_silence() {
    let mut detector = UtteranceDetector::new(0.03);

    // Leading silence is discarded entirely
    assert!(detector.feed(&generate_silence(0.2)).is_none());
    assert!(!detector.speech_started());

    // Speech begins
    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    assert!(detector.feed(&speech).is_none());
    assert!(detector.speech_started());

    // Trailing silence closes the utterance
    let utterance = detector
        .feed(&generate_silence(0.6))
        .expect("utterance should complete");
    assert!(utterance.len() >= speech.len());
    assert!(!detector.speech_started());
}

#[test]
fn utterance_detector_ignores_short_noise_bursts() {
    let mut detector = UtteranceDetector::new(0.03);

    // A 50ms click is far below the minimum speech duration
    detector.feed(&generate_sine_samples(1000.0, 0.05, 0.5));
    assert!(detector.feed(&generate_silence(0.6)).is_none());
    assert!(!detector.speech_started());
}

#[test]
fn rms_distinguishes_speech_from_room_noise() {
    let quiet = generate_sine_samples(200.0, 0.3, 0.01);
    let loud = generate_sine_samples(200.0, 0.3, 0.4);

    assert!(rms(&quiet) < 0.03);
    assert!(rms(&loud) > 0.08);
}

#[test]
fn samples_to_wav_produces_valid_header() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");
    assert!(wav_data.len() > 44);
}

#[test]
fn wav_roundtrip_preserves_sample_count() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
}

#[test]
fn segmenter_splits_streamed_reply_into_sentences() {
    let tokens = ["Good", " evening", ".", " The", " weather", " is", " mild", ".", " Anything", " else", "?"];
    let out: Vec<String> = sentences(tokens.iter().copied()).collect();
    assert_eq!(
        out,
        vec!["Good evening.", "The weather is mild.", "Anything else?"]
    );
}

/// Speaker whose speak call takes real time and polls the interrupt signal,
/// mimicking cancellable playback without an output device
struct PollingSpeaker {
    interrupt: Arc<InterruptState>,
    spoken: Mutex<Vec<String>>,
    sentence_duration: Duration,
}

impl PollingSpeaker {
    fn new(interrupt: Arc<InterruptState>, sentence_duration: Duration) -> Self {
        Self {
            interrupt,
            spoken: Mutex::new(Vec::new()),
            sentence_duration,
        }
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait(?Send)]
impl Speaker for PollingSpeaker {
    async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        self.spoken.lock().unwrap().push(text.to_string());

        let poll = Duration::from_millis(2);
        let mut elapsed = Duration::ZERO;
        while elapsed < self.sentence_duration {
            if self.interrupt.is_raised() {
                return Ok(SpeakOutcome::Cancelled);
            }
            tokio::time::sleep(poll).await;
            elapsed += poll;
        }
        Ok(SpeakOutcome::Completed)
    }

    fn stop(&self) {
        self.interrupt.raise();
    }

    fn is_speaking(&self) -> bool {
        false
    }
}

fn token_stream(parts: &[&str]) -> TokenStream {
    let owned: Vec<Result<String>> = parts.iter().map(|t| Ok((*t).to_string())).collect();
    Box::pin(stream::iter(owned))
}

#[tokio::test]
async fn barge_in_during_playback_cuts_the_response_short() {
    let interrupt = Arc::new(InterruptState::new());
    let capture = CaptureBuffer::default();

    let monitor = InterruptMonitor::new(
        capture.clone(),
        Arc::clone(&interrupt),
        0.08,
        Duration::from_millis(2),
        Duration::from_millis(2),
    );
    let monitor_task = tokio::spawn(monitor.run());

    let speaker = Arc::new(PollingSpeaker::new(
        Arc::clone(&interrupt),
        Duration::from_millis(40),
    ));

    // Feed loud "user speech" into the capture buffer while the response
    // is playing
    let feeder = {
        let capture = capture.clone();
        let interrupt = Arc::clone(&interrupt);
        tokio::spawn(async move {
            // Wait until the response phase is active
            while !interrupt.is_responding() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            // Let the first sentence get underway, then talk over it
            tokio::time::sleep(Duration::from_millis(50)).await;
            for _ in 0..50 {
                capture.push(&generate_sine_samples(300.0, 0.02, 0.5));
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let outcome = run_turn(
        speaker.as_ref(),
        &interrupt,
        token_stream(&["One.", " Two.", " Three.", " Four.", " Five."]),
    )
    .await
    .unwrap();

    assert_eq!(outcome, TurnOutcome::Interrupted);

    let spoken = speaker.spoken();
    assert!(
        spoken.len() < 5,
        "interruption must discard later sentences, spoke: {spoken:?}"
    );
    assert!(!interrupt.is_responding(), "response phase must be closed");

    feeder.abort();
    monitor_task.abort();
}

#[tokio::test]
async fn quiet_playback_phase_completes_all_sentences() {
    let interrupt = Arc::new(InterruptState::new());
    let capture = CaptureBuffer::default();

    let monitor = InterruptMonitor::new(
        capture.clone(),
        Arc::clone(&interrupt),
        0.08,
        Duration::from_millis(2),
        Duration::from_millis(2),
    );
    let monitor_task = tokio::spawn(monitor.run());

    let speaker = Arc::new(PollingSpeaker::new(
        Arc::clone(&interrupt),
        Duration::from_millis(5),
    ));

    // Only faint room noise reaches the microphone
    let feeder = {
        let capture = capture.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                capture.push(&generate_sine_samples(120.0, 0.02, 0.01));
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let outcome = run_turn(
        speaker.as_ref(),
        &interrupt,
        token_stream(&["First.", " Second.", " Third."]),
    )
    .await
    .unwrap();

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(speaker.spoken(), vec!["First.", "Second.", "Third."]);

    feeder.abort();
    monitor_task.abort();
}

#[tokio::test]
async fn interrupt_signal_resets_between_turns() {
    let interrupt = Arc::new(InterruptState::new());
    let speaker = Arc::new(PollingSpeaker::new(
        Arc::clone(&interrupt),
        Duration::from_millis(50),
    ));

    // First turn gets stopped externally once its response phase is active;
    // a stop before the phase opens would be cleared as a stale signal
    let stopper = {
        let interrupt = Arc::clone(&interrupt);
        let speaker = Arc::clone(&speaker);
        tokio::spawn(async move {
            while !interrupt.is_responding() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            speaker.stop();
        })
    };

    let outcome = run_turn(speaker.as_ref(), &interrupt, token_stream(&["Long one."]))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Interrupted);
    assert!(interrupt.is_raised());
    stopper.await.unwrap();

    // Second turn starts clean and completes
    let outcome = run_turn(speaker.as_ref(), &interrupt, token_stream(&["Next one."]))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Completed);
}
