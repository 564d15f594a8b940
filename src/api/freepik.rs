use crate::provider::{Artifact, ImageRequest, Provider};
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const MYSTIC_URL: &str = "https://api.freepik.com/v1/ai/mystic";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: u32 = 30;

/// Freepik Mystic text-to-image: submit a task, poll its status, download the
/// first generated asset. Portrait framing for shorts.
pub struct FreepikMystic {
    client: Client,
    api_key: String,
}

impl FreepikMystic {
    pub fn new(client: &Client, api_key: &str) -> Self {
        Self {
            client: client.clone(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl Provider<ImageRequest> for FreepikMystic {
    fn name(&self) -> &str {
        "freepik-mystic"
    }

    async fn invoke(&self, request: &ImageRequest) -> Result<Artifact> {
        let payload = json!({
            "prompt": request.prompt,
            "aspect_ratio": "social_story_9_16",
            "model": "realism",
            "filter_nsfw": false,
        });

        let resp = self
            .client
            .post(MYSTIC_URL)
            .header("x-freepik-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Freepik task submit failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("Freepik submit response")?;
        if !status.is_success() {
            anyhow::bail!("Freepik submit: HTTP {} ({})", status.as_u16(), body);
        }

        let task_id = body
            .get("data")
            .and_then(|d| d.get("task_id"))
            .and_then(|v| v.as_str())
            .context("Freepik submit response had no task_id")?
            .to_string();
        logi(format!("Freepik task started: {}", task_id));

        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let check = self
                .client
                .get(format!("{}/{}", MYSTIC_URL, task_id))
                .header("x-freepik-api-key", &self.api_key)
                .send()
                .await;

            let check = match check {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    logw(format!("Freepik polling error: HTTP {}", resp.status().as_u16()));
                    continue;
                }
                Err(err) => {
                    logw(format!("Freepik polling error: {}", err));
                    continue;
                }
            };

            let body: serde_json::Value = check.json().await.context("Freepik status response")?;
            let data = body.get("data").cloned().unwrap_or_default();
            match data.get("status").and_then(|v| v.as_str()) {
                Some("COMPLETED") => {
                    let url = data
                        .get("generated")
                        .and_then(|g| g.as_array())
                        .and_then(|g| g.first())
                        .and_then(|v| v.as_str())
                        .context("Freepik task completed without a generated URL")?;

                    let bytes = self
                        .client
                        .get(url)
                        .send()
                        .await
                        .context("Freepik image download failed")?
                        .bytes()
                        .await?;
                    tokio::fs::write(&request.out, &bytes).await.with_context(|| {
                        format!("write generated image {}", request.out.display())
                    })?;
                    return Ok(Artifact::image(request.out.clone()));
                }
                Some("FAILED") => anyhow::bail!("Freepik task {} failed", task_id),
                _ => {}
            }
        }

        anyhow::bail!("Freepik task {} did not complete in time", task_id)
    }
}
