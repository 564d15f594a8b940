use crate::config::Config;
use crate::logi;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::path::Path;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=multipart&part=snippet,status";

/// Shorts are classified from the file itself, but the tag in the title is
/// what reliably routes the upload into the Shorts shelf.
pub fn force_shorts_title(title: &str) -> String {
    let title = if title.contains("#Shorts") {
        title.to_string()
    } else {
        format!("{} #Shorts", title)
    };
    title.chars().take(100).collect()
}

pub fn force_shorts_description(description: &str, tag_line: &str) -> String {
    let mut description = description.to_string();
    if !description.contains("#Shorts") {
        description.push_str("\n\n#Shorts");
    }
    if !tag_line.is_empty() {
        description.push_str("\n\n");
        description.push_str(tag_line);
    }
    description
}

async fn refresh_access_token(client: &Client, cfg: &Config) -> Result<String> {
    let resp = client
        .post(TOKEN_URL)
        .form(&[
            ("client_id", cfg.youtube_client_id.as_str()),
            ("client_secret", cfg.youtube_client_secret.as_str()),
            ("refresh_token", cfg.youtube_refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .context("YouTube token refresh failed")?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.context("YouTube token response")?;
    if !status.is_success() {
        anyhow::bail!("YouTube token refresh: HTTP {} ({})", status.as_u16(), body);
    }

    body.get("access_token")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .context("YouTube token response had no access_token")
}

/// Publish the finished short. Returns the published video id. The caller
/// treats any error here as terminal-non-fatal: the local file remains.
pub async fn upload_short(
    client: &Client,
    cfg: &Config,
    video_path: &Path,
    title: &str,
    description: &str,
    tags: &[String],
) -> Result<String> {
    let token = refresh_access_token(client, cfg).await?;

    let tag_line = tags
        .iter()
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ");
    let snippet = json!({
        "snippet": {
            "title": force_shorts_title(title),
            "description": force_shorts_description(description, &tag_line),
            "tags": tags,
            "categoryId": "42",
        },
        "status": {"privacyStatus": "public"},
    });

    let video_bytes = tokio::fs::read(video_path)
        .await
        .with_context(|| format!("read upload source {}", video_path.display()))?;
    logi(format!(
        "YouTube: uploading {} ({} bytes)",
        video_path.display(),
        video_bytes.len()
    ));

    let form = reqwest::multipart::Form::new()
        .part(
            "metadata",
            reqwest::multipart::Part::text(snippet.to_string())
                .mime_str("application/json")
                .context("metadata part")?,
        )
        .part(
            "video",
            reqwest::multipart::Part::bytes(video_bytes)
                .file_name("short.mp4")
                .mime_str("video/mp4")
                .context("video part")?,
        );

    let resp = client
        .post(UPLOAD_URL)
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .context("YouTube upload failed")?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.context("YouTube upload response")?;
    if !status.is_success() {
        anyhow::bail!("YouTube upload: HTTP {} ({})", status.as_u16(), body);
    }

    body.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .context("YouTube upload response had no video id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorts_tag_is_forced_into_title_once() {
        assert_eq!(force_shorts_title("The Tape"), "The Tape #Shorts");
        assert_eq!(
            force_shorts_title("The Tape #Shorts"),
            "The Tape #Shorts"
        );
    }

    #[test]
    fn forced_title_is_capped_at_100_chars() {
        let long = "a".repeat(120);
        let title = force_shorts_title(&long);
        assert_eq!(title.chars().count(), 100);
    }

    #[test]
    fn description_gains_shorts_tag_and_tag_line() {
        let desc = force_shorts_description("Recovered footage.", "#horror #creepy");
        assert!(desc.starts_with("Recovered footage."));
        assert!(desc.contains("#Shorts"));
        assert!(desc.ends_with("#horror #creepy"));

        let already = force_shorts_description("Has #Shorts inside.", "");
        assert_eq!(already, "Has #Shorts inside.");
    }
}
