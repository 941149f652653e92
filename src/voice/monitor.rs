//! Barge-in monitor
//!
//! A long-lived task that watches ambient loudness while a response is
//! playing and raises the shared interrupt signal when the user speaks over
//! it. Loudness only, no transcription: the monitor's job is sub-second
//! reaction, not understanding.

use std::sync::Arc;
use std::time::Duration;

use crate::interrupt::InterruptState;
use crate::voice::capture::{CaptureBuffer, rms};

/// Watches the capture buffer for speech during playback
pub struct InterruptMonitor {
    capture: CaptureBuffer,
    interrupt: Arc<InterruptState>,
    /// Barge-in RMS threshold, tuned above the speech-onset threshold
    threshold: f32,
    /// Poll interval while playback is inactive
    idle_poll: Duration,
    /// Capture window while playback is active
    capture_window: Duration,
}

impl InterruptMonitor {
    /// Create a monitor over the shared capture buffer
    #[must_use]
    pub fn new(
        capture: CaptureBuffer,
        interrupt: Arc<InterruptState>,
        threshold: f32,
        idle_poll: Duration,
        capture_window: Duration,
    ) -> Self {
        Self {
            capture,
            interrupt,
            threshold,
            idle_poll,
            capture_window,
        }
    }

    /// Run for the process lifetime
    ///
    /// While playback is inactive the monitor idles without draining the
    /// microphone buffer, leaving it to the primary listen path. While
    /// active it samples short windows and raises the interrupt on loud
    /// input; the playback controller observes the signal at its next poll
    /// tick. Transient capture hiccups are swallowed — the monitor must
    /// never crash the process.
    pub async fn run(self) {
        tracing::debug!(threshold = self.threshold, "interrupt monitor started");

        let mut was_responding = false;

        loop {
            if !self.interrupt.is_responding() {
                was_responding = false;
                tokio::time::sleep(self.idle_poll).await;
                continue;
            }

            if !was_responding {
                // Entering a response phase: drop audio captured before
                // playback began so it cannot count as barge-in
                self.capture.clear();
                was_responding = true;
            }

            tokio::time::sleep(self.capture_window).await;
            let window = self.capture.take();

            if window.is_empty() {
                continue;
            }

            // Re-check after the sleep: the turn may have ended mid-window
            if !self.interrupt.is_responding() {
                continue;
            }

            let loudness = rms(&window);
            if loudness > self.threshold && !self.interrupt.is_raised() {
                tracing::info!(loudness, threshold = self.threshold, "barge-in detected");
                self.interrupt.raise();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn monitor_with(capture: &CaptureBuffer, interrupt: &Arc<InterruptState>) -> InterruptMonitor {
        InterruptMonitor::new(
            capture.clone(),
            Arc::clone(interrupt),
            0.08,
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn raises_on_loud_input_during_response() {
        let capture = CaptureBuffer::default();
        let interrupt = Arc::new(InterruptState::new());

        let task = tokio::spawn(monitor_with(&capture, &interrupt).run());

        interrupt.start_response();
        // Give the monitor a beat to clear pre-response audio
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Loud speech over playback
        for _ in 0..20 {
            capture.push(&[0.5f32; 800]);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if interrupt.is_raised() {
                break;
            }
        }

        assert!(interrupt.is_raised(), "loud input should raise the signal");
        task.abort();
    }

    #[tokio::test]
    async fn idles_quietly_when_not_responding() {
        let capture = CaptureBuffer::default();
        let interrupt = Arc::new(InterruptState::new());

        let task = tokio::spawn(monitor_with(&capture, &interrupt).run());

        capture.push(&[0.5f32; 8000]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!interrupt.is_raised(), "no response phase, no barge-in");
        task.abort();
    }

    #[tokio::test]
    async fn quiet_room_never_raises() {
        let capture = CaptureBuffer::default();
        let interrupt = Arc::new(InterruptState::new());

        let task = tokio::spawn(monitor_with(&capture, &interrupt).run());

        interrupt.start_response();
        for _ in 0..10 {
            capture.push(&[0.005f32; 800]);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!interrupt.is_raised(), "room noise must stay below threshold");
        task.abort();
    }
}
