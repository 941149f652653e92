//! Configuration for the parley conversation loop
//!
//! All tuning lives in-process; there is no config file. The binary overrides
//! the defaults from CLI flags and environment variables.

use std::time::Duration;

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Trigger phrase that moves the loop into conversation mode
    pub trigger_phrase: String,

    /// How long conversation mode persists without interaction
    pub conversation_timeout: Duration,

    /// Maximum wait for speech to begin during a listen
    pub listen_timeout: Duration,

    /// Spoken acknowledgement on wake detection
    pub acknowledgement: String,

    /// Voice processing tuning
    pub voice: VoiceConfig,

    /// Backend endpoints and credentials
    pub backend: BackendConfig,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// RMS energy above which a capture window counts as speech onset
    pub energy_threshold: f32,

    /// RMS energy above which speech over playback counts as barge-in.
    /// Tuned higher than `energy_threshold` to reject room noise and the
    /// device's own output bleed.
    pub interrupt_threshold: f32,

    /// Monitor poll interval while playback is inactive
    pub monitor_idle_poll: Duration,

    /// Monitor capture window while playback is active
    pub monitor_capture_window: Duration,

    /// Cancellation poll tick during playback
    pub playback_poll: Duration,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS model
    pub tts_model: String,

    /// TTS speed multiplier
    pub tts_speed: f64,

    /// STT model
    pub stt_model: String,
}

/// LLM / speech backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// OpenAI-compatible API base URL
    pub api_base: String,

    /// API key
    pub api_key: String,

    /// Chat model identifier
    pub model: String,

    /// System prompt for the agent
    pub system_prompt: String,

    /// Max tokens per response
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger_phrase: "jarvis".to_string(),
            conversation_timeout: Duration::from_secs(60),
            listen_timeout: Duration::from_secs(10),
            acknowledgement: "Yes sir?".to_string(),
            voice: VoiceConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            interrupt_threshold: 0.08,
            monitor_idle_poll: Duration::from_millis(100),
            monitor_capture_window: Duration::from_millis(300),
            playback_poll: Duration::from_millis(50),
            tts_voice: "onyx".to_string(),
            tts_model: "tts-1".to_string(),
            tts_speed: 1.0,
            stt_model: "whisper-1".to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a helpful voice assistant. Be friendly and \
                            answer user queries. Keep responses concise and \
                            conversational. Do not use emojis in your responses."
                .to_string(),
            max_tokens: 1024,
        }
    }
}
