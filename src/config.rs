use crate::timeline::ExtendMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "groq_api_key")]
    pub groq_key: String,
    #[serde(rename = "freepik_api_key")]
    #[serde(default)]
    pub freepik_key: String,
    #[serde(rename = "submagic_api_key")]
    #[serde(default)]
    pub submagic_key: String,
    #[serde(rename = "elevenlabs_api_key")]
    #[serde(default)]
    pub elevenlabs_key: String,
    #[serde(rename = "eleven_voice_id")]
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(rename = "eleven_model_id")]
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default = "default_wan_space")]
    pub wan_space_url: String,
    #[serde(default = "default_kokoro_space")]
    pub kokoro_space_url: String,
    #[serde(default = "default_kokoro_voice")]
    pub kokoro_voice: String,
    #[serde(default)]
    pub youtube_client_id: String,
    #[serde(default)]
    pub youtube_client_secret: String,
    #[serde(default)]
    pub youtube_refresh_token: String,
    #[serde(default = "default_batch_candidates")]
    pub batch_candidates: usize,
    #[serde(default)]
    pub keep_scratch: bool,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Timing and framing policy for the assembled short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_hook_cap")]
    pub hook_cap_secs: f64,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f64,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crossfade")]
    pub crossfade_secs: f64,
    #[serde(default)]
    pub extend_mode: ExtendMode,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_wan_space() -> String {
    "https://r3gm-wan2-2-fp8da-aoti-preview2.hf.space".to_string()
}

fn default_kokoro_space() -> String {
    "https://yakhyo-kokoro-onnx.hf.space".to_string()
}

fn default_kokoro_voice() -> String {
    "am_adam.pt".to_string()
}

fn default_batch_candidates() -> usize {
    1
}

fn default_hook_cap() -> f64 {
    3.0
}

fn default_max_duration() -> f64 {
    59.0
}

fn default_fps() -> u32 {
    24
}

fn default_crossfade() -> f64 {
    0.5
}

fn default_frame_width() -> u32 {
    720
}

fn default_frame_height() -> u32 {
    1280
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            hook_cap_secs: default_hook_cap(),
            max_duration_secs: default_max_duration(),
            fps: default_fps(),
            crossfade_secs: default_crossfade(),
            extend_mode: ExtendMode::default(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)?;

        if config.groq_key.is_empty() {
            anyhow::bail!("config.json: groq_api_key missing");
        }
        if config.batch_candidates == 0 {
            anyhow::bail!("config.json: batch_candidates must be at least 1");
        }

        Ok(config)
    }

    pub fn youtube_configured(&self) -> bool {
        !self.youtube_client_id.is_empty()
            && !self.youtube_client_secret.is_empty()
            && !self.youtube_refresh_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"groq_api_key":"gk_test"}"#).unwrap();
        assert_eq!(cfg.groq_key, "gk_test");
        assert!(cfg.freepik_key.is_empty());
        assert_eq!(cfg.batch_candidates, 1);
        assert_eq!(cfg.render.hook_cap_secs, 3.0);
        assert_eq!(cfg.render.max_duration_secs, 59.0);
        assert_eq!(cfg.render.fps, 24);
        assert_eq!(cfg.render.extend_mode, ExtendMode::FreezeLastFrame);
        assert!(!cfg.youtube_configured());
    }

    #[test]
    fn render_block_overrides_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "groq_api_key": "gk_test",
                "render": {"hook_cap_secs": 2.0, "extend_mode": "loop"}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.render.hook_cap_secs, 2.0);
        assert_eq!(cfg.render.extend_mode, ExtendMode::Loop);
        assert_eq!(cfg.render.crossfade_secs, 0.5);
    }
}
