use crate::config::RenderConfig;
use crate::ffmpeg::{self, ClipFit, SlotEdges};
use crate::provider::Artifact;
use crate::scratch::Scratch;
use crate::timeline::{SlotRender, Timeline};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

/// Concat demuxer entry list. Paths are absolute scratch paths; single quotes
/// are escaped the way the demuxer expects.
pub(crate) fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

/// Render every slot of a reconciled timeline, join them, and bind the
/// narration, enforcing the planned total duration.
///
/// `visuals` must line up with `timeline.slots` (hook first, then body in
/// prompt order); the reconciler may have planned fewer slots than there are
/// artifacts when the narration is hook-only short.
pub async fn render_timeline(
    timeline: &Timeline,
    visuals: &[Artifact],
    narration: &Artifact,
    hook_text: Option<&str>,
    cfg: &RenderConfig,
    scratch: &Scratch,
) -> Result<PathBuf> {
    if timeline.slots.is_empty() {
        anyhow::bail!("assembly precondition: timeline has no slots");
    }
    if visuals.len() < timeline.slots.len() {
        anyhow::bail!(
            "assembly precondition: {} slots but only {} visual artifacts",
            timeline.slots.len(),
            visuals.len()
        );
    }
    if timeline.total_secs < timeline.frame_interval() {
        anyhow::bail!(
            "assembly precondition: total duration {:.3}s is shorter than one frame",
            timeline.total_secs
        );
    }

    let mut slot_paths = Vec::with_capacity(timeline.slots.len());
    for (i, (slot, artifact)) in timeline.slots.iter().zip(visuals).enumerate() {
        let out = scratch.file(&format!("slot_{}.mp4", i));
        let edges = SlotEdges {
            fade_in: i > 0,
            fade_out: i + 1 < timeline.slots.len(),
        };
        let text = if i == 0 { hook_text } else { None };

        logi(format!(
            "Rendering slot {}/{} ({:.2}s at {:.2}s)",
            i + 1,
            timeline.slots.len(),
            slot.length_secs,
            slot.start_secs
        ));
        let ok = render_slot(slot.render, artifact, slot.length_secs, text, edges, cfg, &out).await?;
        if !ok {
            anyhow::bail!("slot {} render produced no output", i);
        }
        slot_paths.push(out);
    }

    let list_path = scratch.file("slots_concat.txt");
    fs::write(&list_path, concat_list(&slot_paths))
        .await
        .context("write concat list")?;

    let silent = scratch.file("assembled_silent.mp4");
    if !ffmpeg::ffmpeg_concat_videos(&list_path, &silent).await? {
        anyhow::bail!("slot concatenation failed");
    }

    let assembled = scratch.file("assembled.mp4");
    if !ffmpeg::ffmpeg_bind_audio(&silent, &narration.path, timeline.total_secs, &assembled).await? {
        anyhow::bail!("audio bind failed");
    }

    logok(format!(
        "Assembled {:.2}s short: {}",
        timeline.total_secs,
        assembled.display()
    ));
    Ok(assembled)
}

async fn render_slot(
    render: SlotRender,
    artifact: &Artifact,
    length_secs: f64,
    text: Option<&str>,
    edges: SlotEdges,
    cfg: &RenderConfig,
    out: &std::path::Path,
) -> Result<bool> {
    let attempt = |text: Option<&str>| {
        let artifact = artifact.clone();
        let out = out.to_path_buf();
        let text = text.map(|t| t.to_string());
        async move {
            match render {
                SlotRender::KenBurns(effect) => {
                    ffmpeg::render_still_slot(
                        &artifact.path,
                        effect,
                        length_secs,
                        text.as_deref(),
                        edges,
                        cfg,
                        &out,
                    )
                    .await
                }
                SlotRender::Trim => {
                    ffmpeg::render_clip_slot(
                        &artifact.path,
                        ClipFit::Trim,
                        length_secs,
                        text.as_deref(),
                        edges,
                        cfg,
                        &out,
                    )
                    .await
                }
                SlotRender::FreezeExtend { clip_secs } => {
                    ffmpeg::render_clip_slot(
                        &artifact.path,
                        ClipFit::FreezeExtend { clip_secs },
                        length_secs,
                        text.as_deref(),
                        edges,
                        cfg,
                        &out,
                    )
                    .await
                }
                SlotRender::Loop { .. } => {
                    ffmpeg::render_clip_slot(
                        &artifact.path,
                        ClipFit::Loop,
                        length_secs,
                        text.as_deref(),
                        edges,
                        cfg,
                        &out,
                    )
                    .await
                }
            }
        }
    };

    match attempt(text).await {
        Ok(ok) => Ok(ok),
        Err(err) if text.is_some() => {
            // drawtext needs fontconfig; a missing font setup shouldn't cost
            // the whole run, just the overlay.
            logw(format!("Slot render with overlay failed ({}); retrying without text", err));
            attempt(None).await
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{KenBurns, TimeSlot};
    use tempfile::TempDir;

    fn slot(start: f64, len: f64) -> TimeSlot {
        TimeSlot {
            start_secs: start,
            length_secs: len,
            render: SlotRender::KenBurns(KenBurns::ZoomIn),
        }
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/it's.mp4")]);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s.mp4'\n");
    }

    #[tokio::test]
    async fn preconditions_are_checked_before_any_render() {
        let root = TempDir::new().unwrap();
        let scratch = Scratch::new(root.path()).unwrap();
        let cfg = RenderConfig::default();
        let narration = Artifact::audio("narration.m4a", 30.0);

        let empty = Timeline {
            slots: vec![],
            total_secs: 30.0,
            crossfade_secs: 0.5,
            fps: 24,
        };
        let err = render_timeline(&empty, &[], &narration, None, &cfg, &scratch)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no slots"));

        let short = Timeline {
            slots: vec![slot(0.0, 30.0)],
            total_secs: 30.0,
            crossfade_secs: 0.5,
            fps: 24,
        };
        let err = render_timeline(&short, &[], &narration, None, &cfg, &scratch)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("visual artifacts"));
    }
}
