use crate::api::gradio;
use crate::ffmpeg;
use crate::logi;
use crate::provider::{AnimateRequest, Artifact, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const ENDPOINT: &str = "generate_video";
const CLIP_SECONDS: u32 = 5;

/// Wan 2.2 image-to-video on a public Gradio space. Animates the hook image
/// into a short clip with a found-footage motion treatment.
pub struct WanAnimator {
    client: Client,
    space_url: String,
}

impl WanAnimator {
    pub fn new(client: &Client, space_url: &str) -> Self {
        Self {
            client: client.clone(),
            space_url: space_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Provider<AnimateRequest> for WanAnimator {
    fn name(&self) -> &str {
        "wan-i2v"
    }

    async fn invoke(&self, request: &AnimateRequest) -> Result<Artifact> {
        let uploaded = gradio::upload_file(&self.client, &self.space_url, &request.image).await?;
        logi(format!("Wan: image uploaded as {}", uploaded));

        let data = json!([
            {"path": uploaded, "meta": {"_type": "gradio.FileData"}},
            null,
            format!(
                "found footage horror style, {}, cinematic motion, smooth animation",
                request.motion_prompt
            ),
            6,
            "bright, cartoon, static, low quality, watermark, text",
            CLIP_SECONDS,
            1,
            1,
            42,
            true,
            6,
            "UniPCMultistep",
            3,
            16,
            true,
        ]);

        let outputs = gradio::call_and_wait(&self.client, &self.space_url, ENDPOINT, data).await?;
        gradio::download_first_output(&self.client, &self.space_url, &outputs, &request.out).await?;

        let duration = ffmpeg::ffprobe_duration_seconds(&request.out)
            .await
            .context("animated clip is not probeable")?;
        Ok(Artifact::video(request.out.clone(), duration))
    }
}
