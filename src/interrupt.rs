//! Shared interrupt signal between the conversation loop, the playback
//! controller, and the barge-in monitor
//!
//! All cross-task flags live behind a single mutex so there is exactly one
//! lock and no ordering concern. Within a response the signal is monotonic:
//! once raised it stays raised until the next `start_response`.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Flags {
    raised: bool,
    responding: bool,
}

/// Interrupt signal shared across the response pipeline
///
/// `raised` is the barge-in / stop request; `responding` gates the monitor
/// so it only competes for the microphone while playback is active.
#[derive(Debug, Default)]
pub struct InterruptState {
    flags: Mutex<Flags>,
}

impl InterruptState {
    /// Create a new signal, not raised, not responding
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Flag updates are trivially panic-free, so a poisoned lock still
    // carries consistent state
    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a response phase: clears any stale signal and marks the
    /// session active for the monitor
    pub fn start_response(&self) {
        let mut flags = self.lock();
        flags.raised = false;
        flags.responding = true;
    }

    /// End the response phase; the raised flag is left as-is so callers can
    /// still observe how the turn ended
    pub fn stop_response(&self) {
        self.lock().responding = false;
    }

    /// Raise the interrupt. Idempotent; never un-raised mid-turn.
    pub fn raise(&self) {
        self.lock().raised = true;
    }

    /// Whether the interrupt has been raised this response phase
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.lock().raised
    }

    /// Whether a response is currently being spoken
    #[must_use]
    pub fn is_responding(&self) -> bool {
        self.lock().responding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_inactive() {
        let state = InterruptState::new();
        assert!(!state.is_raised());
        assert!(!state.is_responding());
    }

    #[test]
    fn raise_is_monotonic_within_response() {
        let state = InterruptState::new();
        state.start_response();
        state.raise();
        assert!(state.is_raised());

        // No operation other than start_response clears it
        state.raise();
        state.stop_response();
        assert!(state.is_raised());
    }

    #[test]
    fn start_response_resets_stale_signal() {
        let state = InterruptState::new();
        state.start_response();
        state.raise();
        state.stop_response();

        state.start_response();
        assert!(!state.is_raised(), "stale signal must not leak into a new turn");
        assert!(state.is_responding());
    }

    #[test]
    fn responding_gates_independently_of_raised() {
        let state = InterruptState::new();
        state.start_response();
        assert!(state.is_responding());
        assert!(!state.is_raised());

        state.stop_response();
        assert!(!state.is_responding());
    }
}
