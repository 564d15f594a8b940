//! Minimal client for the Gradio queue REST protocol the Hugging Face spaces
//! expose: optional file upload, `POST /gradio_api/call/<endpoint>` returning
//! an event id, then a blocking event-stream GET that ends with a `complete`
//! event carrying the output payload.

use crate::logw;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

const CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Upload a local file into the space and return the server-side path handle
/// the predict call expects.
pub async fn upload_file(client: &Client, space_url: &str, path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read upload source {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string());

    let form = reqwest::multipart::Form::new()
        .part("files", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

    let resp = client
        .post(format!("{}/gradio_api/upload", space_url))
        .multipart(form)
        .send()
        .await
        .context("Gradio upload failed")?;
    if !resp.status().is_success() {
        anyhow::bail!("Gradio upload: HTTP {}", resp.status().as_u16());
    }

    let paths: Vec<String> = resp.json().await.context("Gradio upload response")?;
    paths
        .into_iter()
        .next()
        .context("Gradio upload returned no server path")
}

/// Submit a call and block on its event stream until the space reports
/// completion, returning the `data` payload of the final event.
pub async fn call_and_wait(
    client: &Client,
    space_url: &str,
    endpoint: &str,
    data: serde_json::Value,
) -> Result<serde_json::Value> {
    let submit: serde_json::Value = client
        .post(format!("{}/gradio_api/call/{}", space_url, endpoint))
        .json(&serde_json::json!({ "data": data }))
        .send()
        .await
        .context("Gradio call submit failed")?
        .json()
        .await
        .context("Gradio call submit response")?;

    let event_id = submit
        .get("event_id")
        .and_then(|v| v.as_str())
        .with_context(|| format!("Gradio call/{} returned no event_id: {}", endpoint, submit))?
        .to_string();

    let stream = client
        .get(format!(
            "{}/gradio_api/call/{}/{}",
            space_url, endpoint, event_id
        ))
        .timeout(CALL_TIMEOUT)
        .send()
        .await
        .context("Gradio event stream request failed")?
        .text()
        .await
        .context("Gradio event stream read failed")?;

    parse_final_event(&stream)
        .with_context(|| format!("Gradio call/{} stream had no completion payload", endpoint))
}

/// The stream is server-sent events; the last `data:` line of a `complete`
/// event holds the outputs. Error events carry `null` or an error body.
pub(crate) fn parse_final_event(stream: &str) -> Option<serde_json::Value> {
    let mut last_event = "";
    let mut payload = None;
    for line in stream.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            last_event = rest.trim();
        } else if let Some(rest) = line.strip_prefix("data:") {
            if last_event == "error" {
                logw(format!("Gradio stream error event: {}", rest.trim()));
                return None;
            }
            payload = serde_json::from_str::<serde_json::Value>(rest.trim()).ok();
        }
    }
    if last_event == "complete" { payload } else { None }
}

/// Pull a downloadable URL out of one output slot: spaces wrap files either as
/// `{"url": ...}`, `{"video": {"url": ...}}`, or a bare path string.
pub(crate) fn output_file_url(space_url: &str, value: &serde_json::Value) -> Option<String> {
    if let Some(url) = value.get("url").and_then(|v| v.as_str()) {
        return Some(url.to_string());
    }
    if let Some(inner) = value.get("video").or_else(|| value.get("audio")) {
        return output_file_url(space_url, inner);
    }
    if let Some(path) = value.get("path").and_then(|v| v.as_str()) {
        return Some(format!("{}/gradio_api/file={}", space_url, path));
    }
    value
        .as_str()
        .map(|path| format!("{}/gradio_api/file={}", space_url, path))
}

/// Download the first file-like output of a completed call into `out`.
pub async fn download_first_output(
    client: &Client,
    space_url: &str,
    outputs: &serde_json::Value,
    out: &Path,
) -> Result<()> {
    let url = outputs
        .as_array()
        .and_then(|arr| arr.iter().find_map(|v| output_file_url(space_url, v)))
        .context("Gradio outputs contained no file reference")?;

    let bytes = client
        .get(&url)
        .send()
        .await
        .context("Gradio output download failed")?
        .bytes()
        .await?;
    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("write gradio output {}", out.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_event_payload_is_extracted() {
        let stream = "event: generating\ndata: [\"partial\"]\n\nevent: complete\ndata: [{\"url\": \"https://x/file.mp4\"}, 42]\n\n";
        let payload = parse_final_event(stream).unwrap();
        assert_eq!(payload[0]["url"], "https://x/file.mp4");
        assert_eq!(payload[1], 42);
    }

    #[test]
    fn error_and_truncated_streams_yield_nothing() {
        assert!(parse_final_event("event: error\ndata: null\n\n").is_none());
        assert!(parse_final_event("event: generating\ndata: [1]\n\n").is_none());
        assert!(parse_final_event("").is_none());
    }

    #[test]
    fn file_urls_are_resolved_from_all_known_shapes() {
        let space = "https://host.hf.space";
        let direct = serde_json::json!({"url": "https://cdn/x.mp4"});
        assert_eq!(output_file_url(space, &direct).unwrap(), "https://cdn/x.mp4");

        let nested = serde_json::json!({"video": {"path": "/tmp/out.mp4"}});
        assert_eq!(
            output_file_url(space, &nested).unwrap(),
            "https://host.hf.space/gradio_api/file=/tmp/out.mp4"
        );

        let bare = serde_json::json!("/tmp/audio.mp3");
        assert_eq!(
            output_file_url(space, &bare).unwrap(),
            "https://host.hf.space/gradio_api/file=/tmp/audio.mp3"
        );

        assert!(output_file_url(space, &serde_json::json!(42)).is_none());
    }
}
