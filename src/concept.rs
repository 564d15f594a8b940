use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Audience reactions the concept prompt is allowed to target.
pub const REACTIONS: &[&str] = &["WTF", "SHOCK", "GLITCH", "UNSETTLING", "CURSED"];

/// Short-form framings the concept prompt picks from.
pub const FORMATS: &[&str] = &[
    "POV: You found this tape",
    "Don't watch this at 3AM",
    "Glitch in the simulation",
    "Found Footage: The Backrooms",
    "Cursed Tutorial",
    "Screamer Prank (Fakeout)",
];

/// One run's creative plan, produced by the concept model and immutable
/// afterwards. Feeds both the narration and the visual generation stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub title: String,
    #[serde(default)]
    pub target_reaction: String,
    /// Prompt for the opening image.
    pub hook_visual: String,
    /// First spoken sentence.
    pub hook_audio: String,
    /// Text overlay burned over the opening seconds.
    pub hook_text: String,
    /// Everything spoken after the hook.
    pub script_body: String,
    /// Image prompts for the body, in playback order.
    pub visual_prompts: Vec<String>,
    pub description: String,
    pub hashtags: String,
}

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#?([A-Za-z0-9_]+)").unwrap());

impl Concept {
    /// Parse and validate the model's JSON. The concept model is the one
    /// collaborator with no fallback, so a malformed response is fatal to the
    /// run and must be caught here, not deep in assembly.
    pub fn from_json(text: &str) -> Result<Self> {
        let concept: Concept =
            serde_json::from_str(text).context("Failed to parse concept JSON")?;
        concept.validate()?;
        Ok(concept)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("title", &self.title),
            ("hook_visual", &self.hook_visual),
            ("hook_audio", &self.hook_audio),
            ("script_body", &self.script_body),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("concept JSON: '{}' missing or empty", field);
            }
        }
        if self.visual_prompts.iter().all(|p| p.trim().is_empty()) {
            anyhow::bail!("concept JSON: 'visual_prompts' has no usable prompts");
        }
        Ok(())
    }

    /// Body prompts with blank entries dropped, preserving order.
    pub fn body_prompts(&self) -> Vec<&str> {
        self.visual_prompts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect()
    }

    pub fn full_narration(&self) -> String {
        format!("{} {}", self.hook_audio.trim(), self.script_body.trim())
            .trim()
            .to_string()
    }

    /// Upload tags extracted from the free-form hashtag string.
    pub fn tags(&self) -> Vec<String> {
        HASHTAG_RE
            .captures_iter(&self.hashtags)
            .map(|cap| cap[1].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r##"{
            "title": "The Tape They Buried",
            "target_reaction": "CURSED",
            "hook_visual": "vhs still of an empty hallway, single flickering light",
            "hook_audio": "They told us to burn this tape.",
            "hook_text": "DO NOT WATCH ALONE",
            "script_body": "We didn't. And now it plays on every screen in the house.",
            "visual_prompts": ["a door slightly ajar", "", "static swallowing a face"],
            "description": "Found footage recovered from a condemned house.",
            "hashtags": "#horror #Shorts #foundfootage creepy"
        }"##
    }

    #[test]
    fn valid_concept_parses() {
        let concept = Concept::from_json(sample_json()).unwrap();
        assert_eq!(concept.title, "The Tape They Buried");
        assert_eq!(concept.body_prompts().len(), 2);
        assert_eq!(
            concept.full_narration(),
            "They told us to burn this tape. We didn't. And now it plays on every screen in the house."
        );
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let err = Concept::from_json(r#"{"title": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn empty_required_field_is_rejected() {
        let json = sample_json().replace("They told us to burn this tape.", "  ");
        let err = Concept::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("hook_audio"));
    }

    #[test]
    fn all_blank_prompts_are_rejected() {
        let json = sample_json()
            .replace("a door slightly ajar", "")
            .replace("static swallowing a face", " ");
        let err = Concept::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("visual_prompts"));
    }

    #[test]
    fn tags_come_from_hashtag_words() {
        let concept = Concept::from_json(sample_json()).unwrap();
        assert_eq!(concept.tags(), vec!["horror", "Shorts", "foundfootage", "creepy"]);
    }
}
