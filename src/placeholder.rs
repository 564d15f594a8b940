//! Terminal fallback providers. Every chain ends in one of these: pure local
//! operations with nothing left to go wrong, so a run that loses every remote
//! provider still produces a playable short.

use crate::provider::{AnimateRequest, Artifact, ArtifactKind, CaptionRequest, ImageRequest, Provider, SpeechRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Fixed fill for placeholder frames.
pub const PLACEHOLDER_GREY: [u8; 3] = [50, 50, 50];

const NARRATION_WORDS_PER_MINUTE: f64 = 150.0;
const SILENCE_SAMPLE_RATE: u32 = 24_000;

/// Sizing for the silent-narration fallback: a pace estimate from the word
/// count, clamped to the playable range.
pub fn estimate_narration_secs(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / NARRATION_WORDS_PER_MINUTE * 60.0).clamp(2.0, 59.0)
}

/// Solid grey frame at output resolution.
pub struct PlaceholderImage {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
impl Provider<ImageRequest> for PlaceholderImage {
    fn name(&self) -> &str {
        "placeholder-image"
    }

    async fn invoke(&self, request: &ImageRequest) -> Result<Artifact> {
        let [r, g, b] = PLACEHOLDER_GREY;
        let frame = image::RgbImage::from_pixel(self.width, self.height, image::Rgb([r, g, b]));
        frame
            .save(&request.out)
            .with_context(|| format!("write placeholder frame {}", request.out.display()))?;
        Ok(Artifact::image(request.out.clone()))
    }
}

/// Animation fallback: hand the still straight through. The reconciler treats
/// a still hook the same as any other still, so nothing downstream notices.
pub struct StillFrame;

#[async_trait]
impl Provider<AnimateRequest> for StillFrame {
    fn name(&self) -> &str {
        "still-frame"
    }

    async fn invoke(&self, request: &AnimateRequest) -> Result<Artifact> {
        Ok(Artifact::image(request.image.clone()))
    }
}

/// Speech fallback: a silent WAV paced to the text, so the timeline still has
/// a narration track to reconcile against.
pub struct SilentNarration;

#[async_trait]
impl Provider<SpeechRequest> for SilentNarration {
    fn name(&self) -> &str {
        "silent-narration"
    }

    async fn invoke(&self, request: &SpeechRequest) -> Result<Artifact> {
        let secs = estimate_narration_secs(&request.text);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SILENCE_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&request.out, spec)
            .with_context(|| format!("create silent wav {}", request.out.display()))?;
        let samples = (secs * SILENCE_SAMPLE_RATE as f64) as usize;
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(Artifact::audio(request.out.clone(), secs))
    }
}

/// Captioning fallback: return the video untouched.
pub struct UncaptionedPassthrough;

#[async_trait]
impl Provider<CaptionRequest> for UncaptionedPassthrough {
    fn name(&self) -> &str {
        "uncaptioned"
    }

    async fn invoke(&self, request: &CaptionRequest) -> Result<Artifact> {
        Ok(Artifact {
            path: request.video.clone(),
            kind: ArtifactKind::Video,
            duration_secs: None,
        })
    }
}
