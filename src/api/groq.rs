use crate::concept::{Concept, FORMATS, REACTIONS};
use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;

const CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const CONCEPT_MODEL: &str = "llama-3.3-70b-versatile";
const JUDGE_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

fn extract_message_content(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("Groq error message: {}", msg));
        }
        if let Some(typ) = err.get("type").and_then(|v| v.as_str()) {
            logw(format!("Groq error type: {}", typ));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("Groq error code: {}", code));
        }
        return None;
    }

    root.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn concept_system_prompt(reaction: &str, format_name: &str) -> String {
    format!(
        "You are a VIRAL SHORTS ENGINEER. Your goal is to generate a script that escapes 'Swipe Jail'.\n\
         MANDATORY RULES:\n\
         1. TRIPLE HOOK (0-3s): Visual (weird/scary), Verbal (provocative statement), Text (amplified curiosity).\n\
         2. PACING: Fast cuts, no filler. Every sentence must build tension.\n\
         3. ENDING: Twist or jump scare or unsettling realization.\n\
         4. TARGET EMOTION: {reaction}.\n\
         5. FORMAT: {format_name}.\n\
         6. DURATION: 20-30 seconds max.\n\n\
         Return JSON with:\n\
         - 'title': Viral clickbait title.\n\
         - 'target_reaction': The chosen reaction.\n\
         - 'hook_visual': Detailed prompt for the FIRST 3 seconds (The Hook Image).\n\
         - 'hook_audio': The first sentence spoken (The Verbal Hook).\n\
         - 'hook_text': The text overlay for the hook (The Text Hook).\n\
         - 'script_body': The rest of the script (excluding the hook).\n\
         - 'visual_prompts': A list of 3-5 highly detailed image prompts for the rest of the video. strictly visual descriptions.\n\
         - 'description': Video description.\n\
         - 'hashtags': String of hashtags."
    )
}

/// Ask the concept model for one run's plan. This is the only stage with no
/// fallback: any failure here is fatal to the run.
pub async fn generate_concept<R: Rng + ?Sized>(
    client: &Client,
    cfg: &Config,
    rng: &mut R,
) -> Result<Concept> {
    let reaction = REACTIONS[rng.gen_range(0..REACTIONS.len())];
    let format_name = FORMATS[rng.gen_range(0..FORMATS.len())];
    logi(format!(
        "Concept request: target reaction={} format={}",
        reaction, format_name
    ));

    let body = json!({
        "model": CONCEPT_MODEL,
        "response_format": {"type": "json_object"},
        "messages": [
            {"role": "system", "content": concept_system_prompt(reaction, format_name)},
            {"role": "user", "content": "Generate a Cursed Archive viral short concept."},
        ],
    });

    let resp = client
        .post(CHAT_URL)
        .bearer_auth(&cfg.groq_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(120))
        .send()
        .await
        .context("Groq concept request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        if !raw.is_empty() {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("Groq raw body: {}", snippet));
        }
        anyhow::bail!("Groq concept request: HTTP {}", status.as_u16());
    }

    let content =
        extract_message_content(&raw).context("Groq concept response had no message content")?;
    Concept::from_json(&content)
}

/// A judged batch candidate: where its assembled video lives plus the frame
/// the judge gets to look at.
#[derive(Debug, Clone)]
pub struct JudgeCandidate {
    pub title: String,
    pub thumbnail: PathBuf,
}

pub(crate) fn parse_winner(content: &str, candidates: usize) -> Option<usize> {
    let root: serde_json::Value = serde_json::from_str(content).ok()?;
    let winner = root.get("winner")?.as_u64()? as usize;
    if winner < candidates { Some(winner) } else { None }
}

/// Show the judge one mid-video frame per candidate and ask for a winner
/// index. Errors bubble up; the caller falls back to a deterministic pick.
pub async fn judge_pick_best(
    client: &Client,
    cfg: &Config,
    candidates: &[JudgeCandidate],
) -> Result<usize> {
    let mut content = vec![json!({
        "type": "text",
        "text": format!(
            "You are judging {} candidate horror shorts by their titles and a mid-video frame. \
             Pick the one most likely to stop a viewer from swiping: unsettling imagery, readable \
             composition, strong title. Return STRICT JSON: {{\"winner\": <0-based index>}}.\n\n{}",
            candidates.len(),
            candidates
                .iter()
                .enumerate()
                .map(|(i, c)| format!("Candidate {}: {}", i, c.title))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    })];

    for candidate in candidates {
        let bytes = tokio::fs::read(&candidate.thumbnail)
            .await
            .with_context(|| format!("read thumbnail {}", candidate.thumbnail.display()))?;
        content.push(json!({
            "type": "image_url",
            "image_url": {"url": format!("data:image/jpeg;base64,{}", BASE64.encode(&bytes))},
        }));
    }

    let body = json!({
        "model": JUDGE_MODEL,
        "response_format": {"type": "json_object"},
        "messages": [{"role": "user", "content": content}],
    });

    let resp = client
        .post(CHAT_URL)
        .bearer_auth(&cfg.groq_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(120))
        .send()
        .await
        .context("Groq judge request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("Groq judge request: HTTP {}", status.as_u16());
    }

    let content =
        extract_message_content(&raw).context("Groq judge response had no message content")?;
    parse_winner(&content, candidates.len())
        .context("Groq judge response was not a valid winner index")
}
