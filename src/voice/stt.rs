//! Speech-to-text collaborator interface and Whisper client

use async_trait::async_trait;
use thiserror::Error;

/// Ways a transcription attempt can fail
#[derive(Debug, Error)]
pub enum SttError {
    /// No speech began within the listen window
    #[error("no speech within listen window")]
    Timeout,

    /// Speech was captured but could not be decoded into text
    #[error("speech could not be understood")]
    Unintelligible,

    /// Transport or backend failure
    #[error("STT backend error: {0}")]
    Backend(String),
}

/// Transcribes an audio clip to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio bytes
    ///
    /// # Errors
    ///
    /// `Unintelligible` when the backend returns no usable text, `Backend`
    /// for transport failures. (`Timeout` is produced upstream by the
    /// capture layer when no speech arrives at all.)
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SttError>;
}

/// Response from the Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI-compatible Whisper transcription client
pub struct WhisperStt {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl WhisperStt {
    /// Create a Whisper client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_base: String, api_key: String, model: String) -> crate::Result<Self> {
        if api_key.is_empty() {
            return Err(crate::Error::Config(
                "API key required for Whisper STT".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SttError> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| SttError::Backend(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SttError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(SttError::Backend(format!("Whisper API error {status}")));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| SttError::Backend(e.to_string()))?;

        let text = result.text.trim().to_string();
        if text.is_empty() {
            return Err(SttError::Unintelligible);
        }

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}
