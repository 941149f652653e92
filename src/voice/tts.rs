//! Text-to-speech synthesis client
//!
//! Voice, model, and speed are fixed configuration applied once at
//! construction; the client is built a single time at startup.

use crate::{Error, Result};

/// OpenAI-compatible speech synthesis client
pub struct TtsClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    voice: String,
    model: String,
    speed: f64,
}

impl TtsClient {
    /// Create a synthesis client with fixed voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        api_base: String,
        api_key: String,
        voice: String,
        model: String,
        speed: f64,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            voice,
            model,
            speed,
        })
    }

    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis request fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
