use crate::ffmpeg;
use crate::provider::{Artifact, Provider, SpeechRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

/// ElevenLabs TTS, the paid secondary narration voice.
pub struct ElevenLabsTts {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsTts {
    pub fn new(client: &Client, api_key: &str, voice_id: &str, model_id: &str) -> Self {
        Self {
            client: client.clone(),
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            model_id: model_id.to_string(),
        }
    }
}

#[async_trait]
impl Provider<SpeechRequest> for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn invoke(&self, request: &SpeechRequest) -> Result<Artifact> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.voice_id
        );

        let body = serde_json::json!({
            "text": request.text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("ElevenLabs request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("ElevenLabs TTS: HTTP {}", resp.status().as_u16());
        }

        let bytes = resp.bytes().await.context("ElevenLabs response read failed")?;
        tokio::fs::write(&request.out, &bytes)
            .await
            .with_context(|| format!("write narration {}", request.out.display()))?;

        let duration = ffmpeg::ffprobe_duration_seconds(&request.out)
            .await
            .context("synthesized narration is not probeable")?;
        Ok(Artifact::audio(request.out.clone(), duration))
    }
}
