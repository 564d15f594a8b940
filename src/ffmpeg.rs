use crate::config::RenderConfig;
use crate::timeline::KenBurns;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(i32, i32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);

    if w <= 0 || h <= 0 {
        return Err(anyhow::anyhow!("Invalid dimensions"));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

/// Scale-and-center-crop any input to the output frame, normalizing fps and
/// pixel format so every slot is concat-compatible.
pub fn cover_filter(cfg: &RenderConfig) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps},format=yuv420p",
        w = cfg.frame_width,
        h = cfg.frame_height,
        fps = cfg.fps
    )
}

/// Continuous pan/zoom over a still. The zoompan runs on a doubled frame so
/// sub-pixel motion doesn't shimmer.
pub fn kenburns_filter(effect: KenBurns, length_secs: f64, cfg: &RenderConfig) -> String {
    let frames = ((length_secs * cfg.fps as f64).round() as i64).max(1);
    let (w, h, fps) = (cfg.frame_width, cfg.frame_height, cfg.fps);
    let (w2, h2) = (w * 2, h * 2);

    let motion = match effect {
        KenBurns::ZoomIn => format!(
            "zoompan=z='min(zoom+0.0015,1.5)':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={frames}:s={w}x{h}:fps={fps}"
        ),
        KenBurns::ZoomOut => format!(
            "zoompan=z='if(eq(on,1),1.5,max(zoom-0.0015,1.0))':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={frames}:s={w}x{h}:fps={fps}"
        ),
        KenBurns::Pan => format!(
            "zoompan=z='1.1':x='(iw-iw/zoom)*on/{frames}':y='ih/2-(ih/zoom/2)':d={frames}:s={w}x{h}:fps={fps}"
        ),
    };

    format!(
        "scale={w2}:{h2}:force_original_aspect_ratio=increase,crop={w2}:{h2},{motion},format=yuv420p"
    )
}

/// Escape free text for a drawtext filter argument.
pub fn drawtext_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '\'' | ':' | ',' | ';' | '%' | '[' | ']' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn drawtext_filter(text: &str) -> String {
    format!(
        "drawtext=text={}:fontcolor=white:fontsize=64:borderw=4:bordercolor=black:x=(w-text_w)/2:y=(h-text_h)/2.5",
        drawtext_escape(text)
    )
}

/// Boundary softening. The planned slot offsets never move; adjacent slots
/// blend by fading half the configured crossfade on each side of a boundary.
fn boundary_fades(length_secs: f64, fade_in: bool, fade_out: bool, cfg: &RenderConfig) -> Option<String> {
    let half = cfg.crossfade_secs / 2.0;
    if half <= 0.0 || length_secs <= cfg.crossfade_secs {
        return None;
    }
    let mut parts = Vec::new();
    if fade_in {
        parts.push(format!("fade=t=in:st=0:d={half:.3}"));
    }
    if fade_out {
        parts.push(format!("fade=t=out:st={:.3}:d={half:.3}", length_secs - half));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

fn slot_output_args(out_mp4: &Path) -> Vec<String> {
    vec![
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        out_mp4.display().to_string(),
    ]
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlotEdges {
    pub fade_in: bool,
    pub fade_out: bool,
}

/// Render a still image into a moving slot clip of exactly `length_secs`.
pub async fn render_still_slot(
    image: &Path,
    effect: KenBurns,
    length_secs: f64,
    overlay_text: Option<&str>,
    edges: SlotEdges,
    cfg: &RenderConfig,
    out_mp4: &Path,
) -> Result<bool> {
    let mut filter = kenburns_filter(effect, length_secs, cfg);
    if let Some(text) = overlay_text {
        filter = format!("{},{}", filter, drawtext_filter(text));
    }
    if let Some(fades) = boundary_fades(length_secs, edges.fade_in, edges.fade_out, cfg) {
        filter = format!("{},{}", filter, fades);
    }

    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        image.display().to_string(),
        "-vf".to_string(),
        filter,
        "-t".to_string(),
        format!("{:.3}", length_secs),
    ];
    args.extend(slot_output_args(out_mp4));

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

#[derive(Debug, Clone, Copy)]
pub enum ClipFit {
    /// Source at least as long as the slot: truncate.
    Trim,
    /// Source shorter: hold the last frame for the remainder.
    FreezeExtend { clip_secs: f64 },
    /// Source shorter: repeat from the start.
    Loop,
}

/// Render a source clip into a slot clip of exactly `length_secs`.
pub async fn render_clip_slot(
    clip: &Path,
    fit: ClipFit,
    length_secs: f64,
    overlay_text: Option<&str>,
    edges: SlotEdges,
    cfg: &RenderConfig,
    out_mp4: &Path,
) -> Result<bool> {
    let mut filter = cover_filter(cfg);
    if let ClipFit::FreezeExtend { clip_secs } = fit {
        let pad = (length_secs - clip_secs).max(0.0);
        filter = format!("{filter},tpad=stop_mode=clone:stop_duration={pad:.3}");
    }
    if let Some(text) = overlay_text {
        filter = format!("{},{}", filter, drawtext_filter(text));
    }
    if let Some(fades) = boundary_fades(length_secs, edges.fade_in, edges.fade_out, cfg) {
        filter = format!("{},{}", filter, fades);
    }

    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    if matches!(fit, ClipFit::Loop) {
        args.push("-stream_loop".to_string());
        args.push("-1".to_string());
    }
    args.extend([
        "-i".to_string(),
        clip.display().to_string(),
        "-vf".to_string(),
        filter,
        "-t".to_string(),
        format!("{:.3}", length_secs),
    ]);
    args.extend(slot_output_args(out_mp4));

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-an".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Join narration parts (hook line, body script) that may come from different
/// providers in different containers, so re-encode instead of stream copy.
pub async fn ffmpeg_concat_audio(list_txt: &Path, out_m4a: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        out_m4a.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_m4a.exists())
}

/// Bind the narration to the assembled visual track and enforce the final
/// duration with a hard trim.
pub async fn ffmpeg_bind_audio(
    video_in: &Path,
    audio_in: &Path,
    total_secs: f64,
    out_mp4: &Path,
) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video_in.display().to_string(),
        "-i".to_string(),
        audio_in.display().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-t".to_string(),
        format!("{:.3}", total_secs),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Grab one frame from the middle of a video, for the judge stage.
pub async fn ffmpeg_extract_thumbnail(video_in: &Path, at_secs: f64, out_jpg: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", at_secs),
        "-i".to_string(),
        video_in.display().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "3".to_string(),
        out_jpg.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_jpg.exists())
}
