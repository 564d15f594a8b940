use crate::api::gradio;
use crate::ffmpeg;
use crate::provider::{Artifact, Provider, SpeechRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const ENDPOINT: &str = "local_tts";
const MODEL_FILE: &str = "kokoro-quant.onnx";

/// Kokoro TTS on a public Gradio space. Primary narration voice.
pub struct KokoroTts {
    client: Client,
    space_url: String,
    voice: String,
}

impl KokoroTts {
    pub fn new(client: &Client, space_url: &str, voice: &str) -> Self {
        Self {
            client: client.clone(),
            space_url: space_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
        }
    }
}

#[async_trait]
impl Provider<SpeechRequest> for KokoroTts {
    fn name(&self) -> &str {
        "kokoro"
    }

    async fn invoke(&self, request: &SpeechRequest) -> Result<Artifact> {
        let data = json!([request.text, MODEL_FILE, self.voice, "mp3", 1]);
        let outputs = gradio::call_and_wait(&self.client, &self.space_url, ENDPOINT, data).await?;
        gradio::download_first_output(&self.client, &self.space_url, &outputs, &request.out).await?;

        let duration = ffmpeg::ffprobe_duration_seconds(&request.out)
            .await
            .context("synthesized narration is not probeable")?;
        Ok(Artifact::audio(request.out.clone(), duration))
    }
}
