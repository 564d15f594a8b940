use crate::provider::{Artifact, ArtifactKind, CaptionRequest, Provider};
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const BASE_URL: &str = "https://api.submagic.co/v1";
const TEMPLATE: &str = "Hormozi 2";
const POLL_INTERVAL: Duration = Duration::from_secs(10);
const MAX_POLLS: u32 = 60;

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Some Submagic responses wrap the object in a `data` envelope, some don't.
fn flatten_envelope(value: serde_json::Value) -> serde_json::Value {
    if value.get("id").is_some() {
        return value;
    }
    value.get("data").cloned().unwrap_or(value)
}

/// Submagic auto-captioning: upload the assembled short as a project, poll
/// until processing finishes, download the burned-in result.
pub struct SubmagicCaptions {
    client: Client,
    api_key: String,
}

impl SubmagicCaptions {
    pub fn new(client: &Client, api_key: &str) -> Self {
        Self {
            client: client.clone(),
            api_key: api_key.to_string(),
        }
    }

    async fn fetch_download_url(&self, project_id: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/projects/{}", BASE_URL, project_id))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .context("Submagic status poll failed")?;

        if !resp.status().is_success() {
            logw(format!("Submagic polling error: HTTP {}", resp.status().as_u16()));
            return Ok(None);
        }

        let status_data = flatten_envelope(resp.json().await.context("Submagic status body")?);
        match status_data.get("status").and_then(|v| v.as_str()) {
            Some("completed") => {
                let url = status_data
                    .get("videoUrl")
                    .or_else(|| status_data.get("downloadUrl"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                if let Some(url) = url {
                    return Ok(Some(url));
                }

                // Older projects need an explicit export before a URL exists.
                logi("Submagic: triggering export...");
                let export = self
                    .client
                    .post(format!("{}/projects/{}/export", BASE_URL, project_id))
                    .header("x-api-key", &self.api_key)
                    .send()
                    .await
                    .context("Submagic export failed")?;
                if !export.status().is_success() {
                    anyhow::bail!("Submagic export: HTTP {}", export.status().as_u16());
                }
                let export_data = flatten_envelope(export.json().await.context("Submagic export body")?);
                export_data
                    .get("url")
                    .and_then(|v| v.as_str())
                    .map(|s| Some(s.to_string()))
                    .context("Submagic export returned no URL")
            }
            Some("failed") => anyhow::bail!("Submagic processing failed"),
            other => {
                logi(format!("Submagic status: {}", other.unwrap_or("unknown")));
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Provider<CaptionRequest> for SubmagicCaptions {
    fn name(&self) -> &str {
        "submagic"
    }

    async fn invoke(&self, request: &CaptionRequest) -> Result<Artifact> {
        let bytes = tokio::fs::read(&request.video)
            .await
            .with_context(|| format!("read video {}", request.video.display()))?;
        let file_name = request
            .video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "short.mp4".to_string());

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name))
            .text("title", truncate_chars(&request.title, 100))
            .text("language", "en")
            .text("templateName", TEMPLATE);

        let resp = self
            .client
            .post(format!("{}/projects", BASE_URL))
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Submagic upload failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Submagic upload: HTTP {}", status.as_u16());
        }

        let project = flatten_envelope(resp.json().await.context("Submagic upload body")?);
        let project_id = project
            .get("id")
            .and_then(|v| v.as_str())
            .context("Submagic returned no project id")?
            .to_string();
        logi(format!("Submagic project {}; waiting for processing...", project_id));

        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;
            if let Some(url) = self.fetch_download_url(&project_id).await? {
                let bytes = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .context("Submagic download failed")?
                    .bytes()
                    .await?;
                tokio::fs::write(&request.out, &bytes)
                    .await
                    .with_context(|| format!("write captioned video {}", request.out.display()))?;
                return Ok(Artifact {
                    path: request.out.clone(),
                    kind: ArtifactKind::Video,
                    duration_secs: None,
                });
            }
        }

        anyhow::bail!("Submagic project {} did not complete in time", project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_are_flattened_only_when_needed() {
        let wrapped = serde_json::json!({"data": {"id": "p1", "status": "processing"}});
        assert_eq!(flatten_envelope(wrapped)["id"], "p1");

        let direct = serde_json::json!({"id": "p2", "status": "completed"});
        assert_eq!(flatten_envelope(direct)["id"], "p2");
    }

    #[test]
    fn titles_are_truncated_by_characters_not_bytes() {
        let long = "х".repeat(150);
        assert_eq!(truncate_chars(&long, 100).chars().count(), 100);
    }
}
