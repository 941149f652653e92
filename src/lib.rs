//! Parley - hands-free voice conversation loop for AI agents
//!
//! Listens for a wake phrase, forwards utterances to a streaming LLM agent,
//! and speaks the reply sentence-by-sentence while watching for barge-in.
//!
//! # Architecture
//!
//! ```text
//! mic ──▶ capture ──▶ STT ──▶ conversation state machine
//!                                      │
//!                                      ▼
//!                              agent token stream
//!                                      │
//!                                 segmenter
//!                                      │ sentences
//!                                      ▼
//!                            turn orchestrator ──▶ playback ──▶ speaker
//!                                      ▲                │
//!                                      └── interrupt ◀──┘
//!                                          monitor (barge-in)
//! ```
//!
//! The conversation loop runs strictly sequentially per turn; the interrupt
//! monitor is the one concurrent task, raising a shared signal that the
//! playback controller polls at a sub-200ms tick.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod interrupt;
pub mod segment;
pub mod turn;
pub mod voice;

pub use agent::{Agent, ChatAgent, TokenStream};
pub use config::{BackendConfig, Config, VoiceConfig};
pub use conversation::{ConversationFlow, ConversationLoop, Directive, Heard, Mode};
pub use error::{Error, Result};
pub use interrupt::InterruptState;
pub use segment::{SentenceSegmenter, Sentences, sentences};
pub use turn::{SpeakOutcome, Speaker, TurnOutcome, run_turn, speak_phrase};
