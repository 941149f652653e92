//! Conversation state machine and main loop
//!
//! `ConversationFlow` is the pure mode/timeout state machine; the
//! `ConversationLoop` drives it against real audio, STT, the agent, and the
//! playback controller. One listen-transcribe-respond cycle in conversation
//! mode is a turn; turns run strictly sequentially.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::agent::Agent;
use crate::config::Config;
use crate::interrupt::InterruptState;
use crate::turn::{Speaker, run_turn, speak_phrase};
use crate::voice::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use crate::voice::stt::{SttError, Transcriber};
use crate::Result;

/// Backoff after an unexpected per-turn failure
const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Conversation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Passive monitoring; only the trigger phrase is acted on
    WakeListening,
    /// Active conversation; every utterance goes to the agent
    Conversing,
}

/// Result of one listen-and-transcribe attempt
#[derive(Debug)]
pub enum Heard {
    /// A decodable utterance
    Utterance(String),
    /// No speech began within the listen window
    Timeout,
    /// Speech was captured but not decodable
    Unintelligible,
    /// Transient recognition failure, already logged
    Failed,
}

/// What the loop should do with what it heard
#[derive(Debug, PartialEq, Eq)]
pub enum Directive {
    /// Nothing to act on; keep listening
    Listen,
    /// Wake phrase heard with no trailing command; acknowledge
    Acknowledge,
    /// Run a full agent turn on this utterance
    Respond(String),
}

/// Pure wake/conversation state machine
///
/// Invariant: `Conversing` always has a defined `last_interaction`; the
/// conversation timeout is checked at turn boundaries only, with the
/// listen-timeout path as the primary reset mechanism.
#[derive(Debug)]
pub struct ConversationFlow {
    trigger: String,
    timeout: Duration,
    mode: Mode,
    last_interaction: Option<Instant>,
}

impl ConversationFlow {
    /// Create a flow in `WakeListening` with the given trigger phrase
    #[must_use]
    pub fn new(trigger_phrase: &str, timeout: Duration) -> Self {
        Self {
            trigger: trigger_phrase.trim().to_lowercase(),
            timeout,
            mode: Mode::WakeListening,
            last_interaction: None,
        }
    }

    /// Current mode
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Advance the machine on a listen result
    pub fn on_heard(&mut self, heard: Heard, now: Instant) -> Directive {
        match (self.mode, heard) {
            (Mode::WakeListening, Heard::Utterance(text)) => {
                if !contains_trigger(&text, &self.trigger) {
                    tracing::debug!(transcript = %text, "wake phrase not detected, continuing");
                    return Directive::Listen;
                }

                tracing::info!(transcript = %text, "wake phrase detected");
                self.mode = Mode::Conversing;
                self.last_interaction = Some(now);

                let command = strip_trigger(&text, &self.trigger);
                if command.is_empty() {
                    Directive::Acknowledge
                } else {
                    Directive::Respond(command)
                }
            }
            (Mode::Conversing, Heard::Utterance(text)) => Directive::Respond(text),
            (Mode::Conversing, Heard::Timeout) => {
                tracing::info!("no input in conversation mode, returning to wake listening");
                self.mode = Mode::WakeListening;
                self.last_interaction = None;
                Directive::Listen
            }
            (Mode::WakeListening, Heard::Timeout) => Directive::Listen,
            (_, Heard::Unintelligible) => {
                tracing::warn!("could not understand audio");
                Directive::Listen
            }
            (_, Heard::Failed) => Directive::Listen,
        }
    }

    /// Record a completed turn, enforcing the conversation timeout
    ///
    /// Compares `now` against the interaction time recorded before this
    /// turn began; a turn that outlives the window drops straight back to
    /// wake listening instead of extending it.
    pub fn on_turn_complete(&mut self, now: Instant) {
        let expired = self
            .last_interaction
            .is_some_and(|last| now.duration_since(last) > self.timeout);

        if expired {
            tracing::info!("conversation timed out, returning to wake listening");
            self.mode = Mode::WakeListening;
            self.last_interaction = None;
        } else {
            self.last_interaction = Some(now);
        }
    }
}

/// Case-insensitive trigger phrase containment
fn contains_trigger(transcript: &str, trigger: &str) -> bool {
    find_trigger_end(transcript, trigger).is_some()
}

/// Extract the command following the trigger phrase
fn strip_trigger(transcript: &str, trigger: &str) -> String {
    find_trigger_end(transcript, trigger).map_or_else(
        || transcript.to_string(),
        |end| {
            transcript[end..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
                .trim_end()
                .to_string()
        },
    )
}

/// Byte offset just past the first case-insensitive trigger match
///
/// Folds the transcript char by char instead of lowercasing it wholesale:
/// case folding can change byte lengths (e.g. `İ` folds to two chars), so
/// offsets into a lowercased copy are not valid in the original. The
/// returned offset always lies on a char boundary of `transcript`.
fn find_trigger_end(transcript: &str, trigger: &str) -> Option<usize> {
    'starts: for (start, _) in transcript.char_indices() {
        let mut remaining = trigger.chars();
        for (offset, c) in transcript[start..].char_indices() {
            for folded in c.to_lowercase() {
                match remaining.next() {
                    Some(expected) if expected == folded => {}
                    // Mismatch, or the trigger ended inside one char's fold
                    _ => continue 'starts,
                }
            }
            if remaining.as_str().is_empty() {
                return Some(start + offset + c.len_utf8());
            }
        }
    }
    None
}

/// The main voice loop: listen, transcribe, dispatch, respond
pub struct ConversationLoop {
    config: Config,
    flow: ConversationFlow,
    capture: AudioCapture,
    stt: Arc<dyn Transcriber>,
    agent: Arc<dyn Agent>,
    speaker: Arc<dyn Speaker>,
    interrupt: Arc<InterruptState>,
}

impl ConversationLoop {
    /// Assemble the loop from its collaborators
    #[must_use]
    pub fn new(
        config: Config,
        capture: AudioCapture,
        stt: Arc<dyn Transcriber>,
        agent: Arc<dyn Agent>,
        speaker: Arc<dyn Speaker>,
        interrupt: Arc<InterruptState>,
    ) -> Self {
        let flow = ConversationFlow::new(&config.trigger_phrase, config.conversation_timeout);
        Self {
            config,
            flow,
            capture,
            stt,
            agent,
            speaker,
            interrupt,
        }
    }

    /// Run until shutdown is requested
    ///
    /// Per-turn errors are caught here and never propagate past the loop;
    /// only startup failures (e.g. no microphone) are fatal.
    ///
    /// # Errors
    ///
    /// Returns error if audio capture cannot be started
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
        self.capture.start()?;
        tracing::info!(trigger = %self.config.trigger_phrase, "listening for wake phrase");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                heard = self.hear() => {
                    if let Err(e) = self.dispatch(heard).await {
                        tracing::error!(error = %e, "error during recognition or response");
                        tokio::time::sleep(FAILURE_BACKOFF).await;
                    }
                }
            }
        }

        self.capture.stop();
        Ok(())
    }

    /// One listen-and-transcribe attempt
    async fn hear(&self) -> Heard {
        match self.flow.mode() {
            Mode::WakeListening => tracing::debug!("listening for wake phrase"),
            Mode::Conversing => tracing::debug!("listening for next command"),
        }

        let Some(samples) = self
            .capture
            .listen(self.config.voice.energy_threshold, self.config.listen_timeout)
            .await
        else {
            tracing::warn!("timeout waiting for audio");
            return Heard::Timeout;
        };

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode captured audio");
                return Heard::Failed;
            }
        };

        match self.stt.transcribe(&wav).await {
            Ok(text) => Heard::Utterance(text),
            Err(SttError::Timeout) => Heard::Timeout,
            Err(SttError::Unintelligible) => Heard::Unintelligible,
            Err(SttError::Backend(e)) => {
                tracing::warn!(error = %e, "transcription failed");
                Heard::Failed
            }
        }
    }

    /// Act on a listen result
    async fn dispatch(&mut self, heard: Heard) -> Result<()> {
        match self.flow.on_heard(heard, Instant::now()) {
            Directive::Listen => Ok(()),
            Directive::Acknowledge => {
                speak_phrase(
                    self.speaker.as_ref(),
                    &self.interrupt,
                    &self.config.acknowledgement,
                )
                .await
            }
            Directive::Respond(utterance) => self.respond(&utterance).await,
        }
    }

    /// Run one full agent turn
    async fn respond(&mut self, utterance: &str) -> Result<()> {
        tracing::info!(utterance, "sending command to agent");

        let tokens = self.agent.respond(utterance).await?;

        let outcome = run_turn(self.speaker.as_ref(), &self.interrupt, tokens).await?;
        tracing::info!(?outcome, "agent response finished");

        self.flow.on_turn_complete(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> ConversationFlow {
        ConversationFlow::new("jarvis", Duration::from_secs(60))
    }

    #[test]
    fn wake_phrase_enters_conversation_mode() {
        let mut flow = flow();
        let now = Instant::now();

        let directive = flow.on_heard(
            Heard::Utterance("hello jarvis how are you".to_string()),
            now,
        );

        assert_eq!(flow.mode(), Mode::Conversing);
        assert_eq!(directive, Directive::Respond("how are you".to_string()));
        assert!(flow.last_interaction.is_some());
    }

    #[test]
    fn bare_wake_phrase_is_acknowledged() {
        let mut flow = flow();

        let directive = flow.on_heard(Heard::Utterance("hey Jarvis.".to_string()), Instant::now());

        assert_eq!(flow.mode(), Mode::Conversing);
        assert_eq!(directive, Directive::Acknowledge);
    }

    #[test]
    fn unrelated_speech_stays_in_wake_listening() {
        let mut flow = flow();

        let directive = flow.on_heard(Heard::Utterance("hello there".to_string()), Instant::now());

        assert_eq!(flow.mode(), Mode::WakeListening);
        assert_eq!(directive, Directive::Listen);
    }

    #[test]
    fn conversing_utterance_goes_to_agent_verbatim() {
        let mut flow = flow();
        flow.on_heard(Heard::Utterance("jarvis".to_string()), Instant::now());

        let directive = flow.on_heard(
            Heard::Utterance("what time is it".to_string()),
            Instant::now(),
        );

        assert_eq!(directive, Directive::Respond("what time is it".to_string()));
    }

    #[test]
    fn listen_timeout_in_conversation_resets_immediately() {
        let mut flow = flow();
        flow.on_heard(Heard::Utterance("jarvis".to_string()), Instant::now());
        assert_eq!(flow.mode(), Mode::Conversing);

        let directive = flow.on_heard(Heard::Timeout, Instant::now());

        assert_eq!(flow.mode(), Mode::WakeListening);
        assert_eq!(directive, Directive::Listen);
        assert!(flow.last_interaction.is_none());
    }

    #[test]
    fn listen_timeout_while_wake_listening_is_a_noop() {
        let mut flow = flow();

        let directive = flow.on_heard(Heard::Timeout, Instant::now());

        assert_eq!(flow.mode(), Mode::WakeListening);
        assert_eq!(directive, Directive::Listen);
    }

    #[test]
    fn unintelligible_speech_keeps_the_current_mode() {
        let mut flow = flow();
        assert_eq!(flow.on_heard(Heard::Unintelligible, Instant::now()), Directive::Listen);
        assert_eq!(flow.mode(), Mode::WakeListening);

        flow.on_heard(Heard::Utterance("jarvis".to_string()), Instant::now());
        assert_eq!(flow.on_heard(Heard::Unintelligible, Instant::now()), Directive::Listen);
        assert_eq!(flow.mode(), Mode::Conversing);
    }

    #[test]
    fn turn_completion_within_window_extends_conversation() {
        let mut flow = ConversationFlow::new("jarvis", Duration::from_secs(60));
        let base = Instant::now();

        flow.on_heard(Heard::Utterance("jarvis hello".to_string()), base);
        flow.on_turn_complete(base + Duration::from_secs(30));

        assert_eq!(flow.mode(), Mode::Conversing);
        assert_eq!(flow.last_interaction, Some(base + Duration::from_secs(30)));
    }

    #[test]
    fn turn_outliving_the_window_drops_back_to_wake_listening() {
        let mut flow = ConversationFlow::new("jarvis", Duration::from_secs(60));
        let base = Instant::now();

        flow.on_heard(Heard::Utterance("jarvis hello".to_string()), base);
        // The turn itself took longer than the conversation window
        flow.on_turn_complete(base + Duration::from_secs(61));

        assert_eq!(flow.mode(), Mode::WakeListening);
        assert!(flow.last_interaction.is_none());
    }

    #[test]
    fn trigger_matching_is_case_insensitive() {
        assert!(contains_trigger("Hey JARVIS, hello", "jarvis"));
        assert!(!contains_trigger("hello there", "jarvis"));
    }

    #[test]
    fn strip_trigger_extracts_trailing_command() {
        assert_eq!(strip_trigger("Hey jarvis, what's the weather?", "jarvis"), "what's the weather?");
        assert_eq!(strip_trigger("hey jarvis", "jarvis"), "");
    }

    #[test]
    fn trigger_match_survives_multibyte_case_folding() {
        // `İ` lowercases to two chars, so byte offsets shift around it
        assert!(contains_trigger("İ jarvisé hello", "jarvis"));
        assert_eq!(strip_trigger("İ jarvisé hello", "jarvis"), "é hello");
        assert_eq!(strip_trigger("İstanbul jarvis, merhaba", "jarvis"), "merhaba");
        assert!(!contains_trigger("İstanbul merhaba", "jarvis"));
    }
}
