use crate::api::elevenlabs::ElevenLabsTts;
use crate::api::freepik::FreepikMystic;
use crate::api::groq::{self, JudgeCandidate};
use crate::api::kokoro::KokoroTts;
use crate::api::submagic::SubmagicCaptions;
use crate::api::wan::WanAnimator;
use crate::api::youtube;
use crate::compose;
use crate::concept::Concept;
use crate::config::Config;
use crate::ffmpeg;
use crate::init;
use crate::placeholder::{PlaceholderImage, SilentNarration, StillFrame, UncaptionedPassthrough};
use crate::provider::{
    AnimateRequest, Artifact, ArtifactKind, Backoff, CaptionRequest, ImageRequest, ProviderChain,
    RetryPolicy, SpeechRequest,
};
use crate::scratch::Scratch;
use crate::timeline::{self, SlotSource};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

const HOOK_MOTION_PROMPT: &str = "terrifying movement, 4k";

/// Linear run progression. `Failed` is reachable only before any media
/// exists: a concept failure or an assembly precondition violation. Every
/// later stage degrades instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    ConceptReady,
    AudioReady,
    VisualsReady,
    Assembled,
    Captioned,
    Uncaptioned,
    Scored,
    Uploaded,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn advance(from: RunState, to: RunState) -> RunState {
    logi(format!("state: {} -> {}", from, to));
    to
}

#[derive(Debug)]
pub struct RunReport {
    pub title: String,
    pub output: PathBuf,
    pub video_id: Option<String>,
    pub captioned: bool,
    pub scored: bool,
}

struct Candidate {
    concept: Concept,
    video: PathBuf,
    total_secs: f64,
    captioned: bool,
    scratch: Scratch,
}

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn slot_source(artifact: &Artifact) -> SlotSource {
    match artifact.kind {
        ArtifactKind::Video => SlotSource::Clip {
            duration_secs: artifact.duration_secs.unwrap_or(5.0),
        },
        _ => SlotSource::Still,
    }
}

/// Output file stem derived from the concept title.
fn title_slug(title: &str) -> String {
    let mut out = String::new();
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "short".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Judge outcomes collapse to a deterministic default: candidate 0.
fn winner_or_default(result: Result<usize>, candidates: usize) -> usize {
    match result {
        Ok(index) if index < candidates => index,
        Ok(index) => {
            logw(format!(
                "Judge picked out-of-range candidate {}; defaulting to first",
                index
            ));
            0
        }
        Err(err) => {
            logw(format!("Judge unavailable ({}); defaulting to first candidate", err));
            0
        }
    }
}

pub struct PipelineRunner {
    cfg: Config,
    client: reqwest::Client,
    skip: HashSet<String>,
}

impl PipelineRunner {
    pub fn new(cfg: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            cfg,
            client,
            skip: HashSet::new(),
        })
    }

    /// Providers named here are excluded from every chain this run builds,
    /// so a long batch doesn't keep hammering a known-down service.
    pub fn with_skip_list(mut self, skip: HashSet<String>) -> Self {
        self.skip = skip;
        self
    }

    fn image_chain(&self) -> Result<ProviderChain<ImageRequest>> {
        let mut builder = ProviderChain::builder("image");
        if !self.cfg.freepik_key.is_empty() {
            builder = builder.provider(
                Box::new(FreepikMystic::new(&self.client, &self.cfg.freepik_key)),
                RetryPolicy {
                    max_attempts: 2,
                    backoff: Backoff::Fixed(Duration::from_secs(2)),
                    timeout: Duration::from_secs(180),
                },
            );
        } else {
            logw("FREEPIK key not configured; image generation will use placeholders.");
        }
        let chain = builder
            .terminal(Box::new(PlaceholderImage {
                width: self.cfg.render.frame_width,
                height: self.cfg.render.frame_height,
            }))
            .build()?;
        Ok(chain.with_skip_list(self.skip.clone()))
    }

    fn animation_chain(&self) -> Result<ProviderChain<AnimateRequest>> {
        let chain = ProviderChain::builder("animation")
            .provider(
                Box::new(WanAnimator::new(&self.client, &self.cfg.wan_space_url)),
                RetryPolicy {
                    max_attempts: 3,
                    backoff: Backoff::Fixed(Duration::from_secs(10)),
                    timeout: Duration::from_secs(630),
                },
            )
            .terminal(Box::new(StillFrame))
            .build()?;
        Ok(chain.with_skip_list(self.skip.clone()))
    }

    fn speech_chain(&self) -> Result<ProviderChain<SpeechRequest>> {
        let mut builder = ProviderChain::builder("tts").provider(
            Box::new(KokoroTts::new(
                &self.client,
                &self.cfg.kokoro_space_url,
                &self.cfg.kokoro_voice,
            )),
            RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Linear(Duration::from_secs(5)),
                timeout: Duration::from_secs(180),
            },
        );
        if !self.cfg.elevenlabs_key.is_empty() {
            builder = builder.provider(
                Box::new(ElevenLabsTts::new(
                    &self.client,
                    &self.cfg.elevenlabs_key,
                    &self.cfg.eleven_voice_id,
                    &self.cfg.eleven_model_id,
                )),
                RetryPolicy {
                    max_attempts: 2,
                    backoff: Backoff::Linear(Duration::from_secs(5)),
                    timeout: Duration::from_secs(300),
                },
            );
        }
        let chain = builder.terminal(Box::new(SilentNarration)).build()?;
        Ok(chain.with_skip_list(self.skip.clone()))
    }

    fn caption_chain(&self) -> Result<ProviderChain<CaptionRequest>> {
        let mut builder = ProviderChain::builder("captions");
        if !self.cfg.submagic_key.is_empty() {
            builder = builder.provider(
                Box::new(SubmagicCaptions::new(&self.client, &self.cfg.submagic_key)),
                RetryPolicy {
                    max_attempts: 1,
                    backoff: Backoff::Fixed(Duration::from_secs(10)),
                    timeout: Duration::from_secs(900),
                },
            );
        } else {
            logw("SUBMAGIC key not configured; captions will be skipped.");
        }
        let chain = builder.terminal(Box::new(UncaptionedPassthrough)).build()?;
        Ok(chain.with_skip_list(self.skip.clone()))
    }

    /// One complete concept-to-video pass inside its own scratch directory.
    async fn produce_candidate(&self, rng: &mut StdRng) -> Result<Candidate> {
        let scratch = Scratch::new(Path::new(init::SCRATCH_ROOT))?;
        logi(format!("Run scratch: {}", scratch.root().display()));
        let mut state = RunState::Init;

        // Concept generation is the one stage with no fallback.
        let concept = groq::generate_concept(&self.client, &self.cfg, rng).await?;
        state = advance(state, RunState::ConceptReady);
        logok(format!(
            "Concept: \"{}\" ({} body prompts)",
            concept.title,
            concept.body_prompts().len()
        ));

        // Hook and body narration are independent outputs; render both at
        // once and join before assembly.
        let speech = self.speech_chain()?;
        let hook_req = SpeechRequest {
            text: concept.hook_audio.clone(),
            out: scratch.file("narration_hook.mp3"),
        };
        let body_req = SpeechRequest {
            text: concept.script_body.clone(),
            out: scratch.file("narration_body.mp3"),
        };
        let (hook_audio, body_audio) = tokio::join!(speech.run(&hook_req), speech.run(&body_req));
        let (hook_audio, body_audio) = (hook_audio?, body_audio?);

        let narration_list = scratch.file("narration_concat.txt");
        fs::write(
            &narration_list,
            compose::concat_list(&[hook_audio.path.clone(), body_audio.path.clone()]),
        )
        .await
        .context("write narration concat list")?;
        let narration_path = scratch.file("narration.m4a");
        if !ffmpeg::ffmpeg_concat_audio(&narration_list, &narration_path).await? {
            anyhow::bail!("narration concat produced no output");
        }
        let narration_secs = ffmpeg::ffprobe_duration_seconds(&narration_path)
            .await
            .context("narration is not probeable")?;
        let narration = Artifact::audio(narration_path, narration_secs);
        state = advance(state, RunState::AudioReady);
        logok(format!("Narration ready: {:.2}s", narration_secs));

        // Hook image, animated when the animator cooperates; body stills.
        let images = self.image_chain()?;
        let hook_still = images
            .run(&ImageRequest {
                prompt: concept.hook_visual.clone(),
                out: scratch.file("hook_base.png"),
            })
            .await?;

        let animation = self.animation_chain()?;
        let hook_visual = animation
            .run(&AnimateRequest {
                image: hook_still.path.clone(),
                motion_prompt: HOOK_MOTION_PROMPT.to_string(),
                out: scratch.file("hook_motion.mp4"),
            })
            .await?;
        if hook_visual.kind == ArtifactKind::Video {
            if let Ok((w, h)) = ffmpeg::ffprobe_video_dimensions(&hook_visual.path).await {
                if w > h {
                    logw(format!(
                        "Animated hook is {}x{} landscape; cover crop will trim the sides",
                        w, h
                    ));
                }
            }
        }

        let mut visuals = vec![hook_visual];
        for (i, prompt) in concept.body_prompts().iter().enumerate() {
            let artifact = images
                .run(&ImageRequest {
                    prompt: prompt.to_string(),
                    out: scratch.file(&format!("body_{}.png", i)),
                })
                .await?;
            visuals.push(artifact);
        }
        state = advance(state, RunState::VisualsReady);

        // Reconcile all durations into one timeline and render it.
        let hook_source = slot_source(&visuals[0]);
        let body_sources: Vec<SlotSource> = visuals[1..].iter().map(slot_source).collect();
        let plan = timeline::plan(
            narration_secs,
            Some(hook_source),
            &body_sources,
            &self.cfg.render,
            rng,
        )
        .context("duration reconciliation failed")?;

        let assembled = compose::render_timeline(
            &plan,
            &visuals[..plan.slots.len()],
            &narration,
            Some(&concept.hook_text),
            &self.cfg.render,
            &scratch,
        )
        .await?;
        state = advance(state, RunState::Assembled);

        let captions = self.caption_chain()?;
        let final_video = captions
            .run(&CaptionRequest {
                video: assembled.clone(),
                title: concept.title.clone(),
                out: scratch.file("captioned.mp4"),
            })
            .await?;
        let captioned = final_video.path != assembled;
        advance(
            state,
            if captioned {
                RunState::Captioned
            } else {
                RunState::Uncaptioned
            },
        );

        Ok(Candidate {
            concept,
            video: final_video.path,
            total_secs: plan.total_secs,
            captioned,
            scratch,
        })
    }

    async fn score_candidates(&self, candidates: &[Candidate]) -> usize {
        let prepare = async {
            let mut judged = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let thumb = candidate.scratch.file("judge_thumb.jpg");
                if !ffmpeg::ffmpeg_extract_thumbnail(
                    &candidate.video,
                    candidate.total_secs / 2.0,
                    &thumb,
                )
                .await?
                {
                    anyhow::bail!("thumbnail extraction produced no output");
                }
                judged.push(JudgeCandidate {
                    title: candidate.concept.title.clone(),
                    thumbnail: thumb,
                });
            }
            groq::judge_pick_best(&self.client, &self.cfg, &judged).await
        };

        winner_or_default(prepare.await, candidates.len())
    }

    /// Run the full pipeline: one candidate normally, several plus a judge in
    /// batch mode, then publish the winner.
    pub async fn run(&self) -> Result<RunReport> {
        let mut rng = StdRng::seed_from_u64(now_seed());
        let requested = self.cfg.batch_candidates;

        let mut candidates = Vec::new();
        for i in 0..requested {
            if requested > 1 {
                logi(format!("=== Candidate {}/{} ===", i + 1, requested));
            }
            match self.produce_candidate(&mut rng).await {
                Ok(candidate) => candidates.push(candidate),
                Err(err) if requested == 1 => {
                    logw(format!("Run failed before assembly: {}", err));
                    logi(format!("state: {}", RunState::Failed));
                    return Err(err);
                }
                Err(err) => logw(format!("Candidate {} failed: {}", i + 1, err)),
            }
        }
        if candidates.is_empty() {
            logi(format!("state: {}", RunState::Failed));
            anyhow::bail!("all {} candidates failed", requested);
        }

        let scored = candidates.len() > 1;
        let winner = if scored {
            let index = self.score_candidates(&candidates).await;
            logok(format!(
                "Judge selected candidate {} of {}",
                index + 1,
                candidates.len()
            ));
            logi(format!("state: {}", RunState::Scored));
            index
        } else {
            0
        };
        let chosen = candidates.swap_remove(winner);

        let output = PathBuf::from(format!(
            "{}/{}_{}.mp4",
            init::OUTPUT_DIR,
            title_slug(&chosen.concept.title),
            chosen.scratch.label()
        ));
        fs::copy(&chosen.video, &output)
            .await
            .with_context(|| format!("copy final video to {}", output.display()))?;
        logok(format!("Final video: {}", output.display()));

        let mut video_id = None;
        if self.cfg.youtube_configured() {
            match youtube::upload_short(
                &self.client,
                &self.cfg,
                &output,
                &chosen.concept.title,
                &chosen.concept.description,
                &chosen.concept.tags(),
            )
            .await
            {
                Ok(id) => {
                    logok(format!("Published: https://youtube.com/shorts/{}", id));
                    logi(format!("state: {}", RunState::Uploaded));
                    video_id = Some(id);
                }
                Err(err) => {
                    // Terminal but non-fatal: the short exists locally.
                    logw(format!("Upload failed (video kept at {}): {}", output.display(), err));
                }
            }
        } else {
            logi("YouTube credentials not configured; skipping upload.");
        }

        let report = RunReport {
            title: chosen.concept.title.clone(),
            output,
            video_id,
            captioned: chosen.captioned,
            scored,
        };
        if self.cfg.keep_scratch {
            let kept = chosen.scratch.keep();
            logi(format!("Keeping scratch for inspection: {}", kept.display()));
        }
        logi(format!("state: {}", RunState::Done));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::PLACEHOLDER_GREY;
    use tempfile::TempDir;

    fn test_config() -> Config {
        serde_json::from_str(r#"{"groq_api_key": "gk_test"}"#).unwrap()
    }

    #[test]
    fn title_slugs_are_filesystem_safe() {
        assert_eq!(title_slug("The Tape They Buried"), "the-tape-they-buried");
        assert_eq!(title_slug("DON'T watch (3AM!!)"), "don-t-watch-3am");
        assert_eq!(title_slug("???"), "short");
    }

    #[test]
    fn judge_failure_defaults_to_first_candidate() {
        assert_eq!(winner_or_default(Ok(2), 3), 2);
        assert_eq!(winner_or_default(Ok(9), 3), 0);
        assert_eq!(winner_or_default(Err(anyhow::anyhow!("judge down")), 3), 0);
    }

    #[test]
    fn video_artifacts_become_clip_sources() {
        let clip = Artifact::video("hook_motion.mp4", 5.0);
        assert_eq!(slot_source(&clip), SlotSource::Clip { duration_secs: 5.0 });
        let still = Artifact::image("body_0.png");
        assert_eq!(slot_source(&still), SlotSource::Still);
    }

    #[tokio::test]
    async fn unconfigured_image_chain_degrades_to_grey_placeholder() {
        let runner = PipelineRunner::new(test_config()).unwrap();
        let chain = runner.image_chain().unwrap();

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("hook_base.png");
        let artifact = chain
            .run(&ImageRequest {
                prompt: "a hallway that should not exist".to_string(),
                out: out.clone(),
            })
            .await
            .unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Image);
        let frame = image::open(&out).unwrap().to_rgb8();
        assert_eq!(frame.dimensions(), (720, 1280));
        assert_eq!(frame.get_pixel(10, 10).0, PLACEHOLDER_GREY);

        // The fallback feeds the reconciler exactly like a real image.
        let mut rng = StdRng::seed_from_u64(1);
        let plan = timeline::plan(
            30.0,
            Some(slot_source(&artifact)),
            &[slot_source(&artifact)],
            &test_config().render,
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.total_secs, 30.0);
    }

    #[tokio::test]
    async fn every_chain_builds_from_a_minimal_config() {
        let runner = PipelineRunner::new(test_config()).unwrap();
        assert!(runner.image_chain().is_ok());
        assert!(runner.animation_chain().is_ok());
        assert!(runner.speech_chain().is_ok());
        assert!(runner.caption_chain().is_ok());
    }
}
