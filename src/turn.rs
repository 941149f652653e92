//! Turn orchestration
//!
//! Drives one agent response: segments the token stream into sentences and
//! speaks them in order, honoring the shared interrupt signal. Exactly one
//! speak call is in flight at a time; once interrupted, the rest of the
//! agent's output is discarded.

use async_trait::async_trait;

use futures::StreamExt;

use crate::Result;
use crate::agent::TokenStream;
use crate::interrupt::InterruptState;
use crate::segment::SentenceSegmenter;

/// How a single speak call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// The full text was rendered (or skipped after a backend failure)
    Completed,
    /// Cancellation took effect before the text finished
    Cancelled,
}

/// How a whole turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Every sentence of the response was spoken
    Completed,
    /// Barge-in or an explicit stop cut the response short
    Interrupted,
}

/// Cancellable, observable speech output
#[async_trait(?Send)]
pub trait Speaker: Send + Sync {
    /// Speak text, suspending the caller until completed or cancelled
    ///
    /// # Errors
    ///
    /// Returns error on unrecoverable output failures
    async fn speak(&self, text: &str) -> Result<SpeakOutcome>;

    /// Request cancellation of in-flight speech; safe to call concurrently
    fn stop(&self);

    /// Whether speech is currently being rendered
    fn is_speaking(&self) -> bool;
}

/// Marks the response phase active for its scope
///
/// `start_response` runs before any sentence of the turn is spoken, clearing
/// stale signals; `stop_response` runs unconditionally on drop so the
/// monitor returns to idling even when the turn errors out.
struct ResponseGuard<'a> {
    interrupt: &'a InterruptState,
}

impl<'a> ResponseGuard<'a> {
    fn begin(interrupt: &'a InterruptState) -> Self {
        interrupt.start_response();
        Self { interrupt }
    }
}

impl Drop for ResponseGuard<'_> {
    fn drop(&mut self) {
        self.interrupt.stop_response();
    }
}

/// Speak each sentence of an agent response, honoring interruption
///
/// The interrupt signal is checked before and after every speak call; when
/// raised, the remaining token stream is dropped — there is no resumption.
///
/// # Errors
///
/// Returns error if the agent stream or the speaker fails
pub async fn run_turn<S: Speaker + ?Sized>(
    speaker: &S,
    interrupt: &InterruptState,
    mut tokens: TokenStream,
) -> Result<TurnOutcome> {
    let _guard = ResponseGuard::begin(interrupt);
    let mut segmenter = SentenceSegmenter::new();

    while let Some(token) = tokens.next().await {
        let token = token?;

        let Some(sentence) = segmenter.push(&token) else {
            continue;
        };

        if interrupt.is_raised() {
            tracing::info!("response interrupted, discarding remaining output");
            return Ok(TurnOutcome::Interrupted);
        }

        if speaker.speak(&sentence).await? == SpeakOutcome::Cancelled {
            tracing::info!("playback cancelled mid-sentence");
            return Ok(TurnOutcome::Interrupted);
        }

        if interrupt.is_raised() {
            tracing::info!("response interrupted, discarding remaining output");
            return Ok(TurnOutcome::Interrupted);
        }
    }

    if let Some(sentence) = segmenter.flush() {
        if interrupt.is_raised() {
            return Ok(TurnOutcome::Interrupted);
        }
        if speaker.speak(&sentence).await? == SpeakOutcome::Cancelled {
            return Ok(TurnOutcome::Interrupted);
        }
    }

    Ok(TurnOutcome::Completed)
}

/// Speak a fixed phrase under the same response-guard protocol as a turn
///
/// Used for the wake acknowledgement; running it through the guard means a
/// stale interrupt from a previous turn can never cancel it.
///
/// # Errors
///
/// Returns error if the speaker fails
pub async fn speak_phrase<S: Speaker + ?Sized>(
    speaker: &S,
    interrupt: &InterruptState,
    text: &str,
) -> Result<()> {
    let _guard = ResponseGuard::begin(interrupt);
    speaker.speak(text).await?;
    Ok(())
}
