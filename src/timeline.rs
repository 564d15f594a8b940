use crate::config::RenderConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do with a video clip that comes up shorter than its slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendMode {
    /// Hold the final frame for the remaining time. Preserves the beat the
    /// clip ends on.
    #[default]
    FreezeLastFrame,
    /// Repeat the clip from the start. Acceptable for ambient b-roll.
    Loop,
}

/// A visual source as the reconciler sees it: only its kind and, for clips,
/// its probed duration matter for timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotSource {
    Still,
    Clip { duration_secs: f64 },
}

/// Parametric motion applied to a still so no frame reads as frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KenBurns {
    ZoomIn,
    ZoomOut,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotRender {
    KenBurns(KenBurns),
    /// Clip at least as long as the slot: truncate to `[0, length]`.
    Trim,
    FreezeExtend { clip_secs: f64 },
    Loop { clip_secs: f64 },
}

/// One interval of the output timeline, assigned to one visual artifact.
/// Slots partition `[0, total]` in prompt order with no gaps; the crossfade is
/// a render-time blend and never moves these boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlot {
    pub start_secs: f64,
    pub length_secs: f64,
    pub render: SlotRender,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    /// Hook slot first when present, then body slots in prompt order.
    pub slots: Vec<TimeSlot>,
    pub total_secs: f64,
    pub crossfade_secs: f64,
    pub fps: u32,
}

impl Timeline {
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps as f64
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("narration duration {0:.3}s is too short to place a single frame")]
    DurationTooShort(f64),
    #[error("no visual sources to place on the timeline")]
    NoVisuals,
}

/// Reconcile independently produced visuals against a narration of duration
/// `audio_secs`, yielding a timeline whose slot lengths sum to
/// `min(audio_secs, max_duration)` exactly.
///
/// Timing is a pure function of the inputs. The RNG decides only which Ken
/// Burns motion a still gets; it never affects a boundary.
pub fn plan<R: Rng + ?Sized>(
    audio_secs: f64,
    hook: Option<SlotSource>,
    body: &[SlotSource],
    cfg: &RenderConfig,
    rng: &mut R,
) -> Result<Timeline, ReconcileError> {
    if hook.is_none() && body.is_empty() {
        return Err(ReconcileError::NoVisuals);
    }

    let frame = 1.0 / cfg.fps.max(1) as f64;
    let total = audio_secs.min(cfg.max_duration_secs);
    if !total.is_finite() || total < frame {
        return Err(ReconcileError::DurationTooShort(audio_secs));
    }

    let mut slots = Vec::with_capacity(body.len() + 1);

    // The hook owns the opening seconds, capped; with no body to follow it
    // covers the whole timeline. A hook longer than its slot gets trimmed.
    let hook_len = match hook {
        Some(_) if body.is_empty() => total,
        Some(_) => cfg.hook_cap_secs.min(total),
        None => 0.0,
    };
    if let Some(source) = hook {
        slots.push(TimeSlot {
            start_secs: 0.0,
            length_secs: hook_len,
            render: render_for(source, hook_len, cfg.extend_mode, rng),
        });
    }

    let remaining = total - hook_len;
    if !body.is_empty() {
        if remaining > frame / 2.0 {
            let slot_len = remaining / body.len() as f64;
            for (i, source) in body.iter().enumerate() {
                let start = hook_len + slot_len * i as f64;
                // Pin the last boundary so rounding never drifts the total.
                let length = if i == body.len() - 1 {
                    total - start
                } else {
                    slot_len
                };
                slots.push(TimeSlot {
                    start_secs: start,
                    length_secs: length,
                    render: render_for(*source, length, cfg.extend_mode, rng),
                });
            }
        } else if let Some(source) = hook {
            // Narration shorter than the hook cap: the hook absorbs
            // everything and there are zero body slots.
            if let Some(last) = slots.last_mut() {
                last.length_secs = total;
                last.render = render_for(source, total, cfg.extend_mode, rng);
            }
        }
    }

    debug_assert!(
        (slots.iter().map(|s| s.length_secs).sum::<f64>() - total).abs() < 1e-9,
        "slot lengths must partition the narration exactly"
    );

    Ok(Timeline {
        slots,
        total_secs: total,
        crossfade_secs: cfg.crossfade_secs,
        fps: cfg.fps,
    })
}

fn render_for<R: Rng + ?Sized>(
    source: SlotSource,
    slot_len: f64,
    mode: ExtendMode,
    rng: &mut R,
) -> SlotRender {
    match source {
        SlotSource::Still => SlotRender::KenBurns(match rng.gen_range(0..3) {
            0 => KenBurns::ZoomIn,
            1 => KenBurns::ZoomOut,
            _ => KenBurns::Pan,
        }),
        SlotSource::Clip { duration_secs } if duration_secs >= slot_len => SlotRender::Trim,
        SlotSource::Clip { duration_secs } => match mode {
            ExtendMode::FreezeLastFrame => SlotRender::FreezeExtend {
                clip_secs: duration_secs,
            },
            ExtendMode::Loop => SlotRender::Loop {
                clip_secs: duration_secs,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cfg() -> RenderConfig {
        RenderConfig::default()
    }

    fn boundaries(timeline: &Timeline) -> Vec<(f64, f64)> {
        timeline
            .slots
            .iter()
            .map(|s| (s.start_secs, s.length_secs))
            .collect()
    }

    #[test]
    fn thirty_second_narration_with_three_body_images() {
        let mut rng = StdRng::seed_from_u64(7);
        let timeline = plan(
            30.0,
            Some(SlotSource::Clip { duration_secs: 5.0 }),
            &[SlotSource::Still, SlotSource::Still, SlotSource::Still],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(
            boundaries(&timeline),
            vec![(0.0, 3.0), (3.0, 9.0), (12.0, 9.0), (21.0, 9.0)]
        );
        assert_eq!(timeline.total_secs, 30.0);
        assert_eq!(timeline.slots[0].render, SlotRender::Trim);
        for slot in &timeline.slots[1..] {
            assert!(matches!(slot.render, SlotRender::KenBurns(_)));
        }
    }

    #[test]
    fn narration_shorter_than_hook_cap_collapses_to_hook_only() {
        let mut rng = StdRng::seed_from_u64(7);
        let timeline = plan(
            2.0,
            Some(SlotSource::Still),
            &[SlotSource::Still, SlotSource::Still],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(timeline.slots.len(), 1);
        assert_eq!(timeline.slots[0].length_secs, 2.0);
        assert_eq!(timeline.total_secs, 2.0);
    }

    #[test]
    fn hook_only_video_covers_full_narration() {
        let mut rng = StdRng::seed_from_u64(7);
        let timeline = plan(
            20.0,
            Some(SlotSource::Clip { duration_secs: 5.0 }),
            &[],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(timeline.slots.len(), 1);
        assert_eq!(timeline.slots[0].length_secs, 20.0);
        assert_eq!(
            timeline.slots[0].render,
            SlotRender::FreezeExtend { clip_secs: 5.0 }
        );
    }

    #[test]
    fn ceiling_truncates_long_narration() {
        let mut rng = StdRng::seed_from_u64(7);
        let timeline = plan(
            120.0,
            Some(SlotSource::Still),
            &[SlotSource::Still, SlotSource::Still],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(timeline.total_secs, 59.0);
        let sum: f64 = timeline.slots.iter().map(|s| s.length_secs).sum();
        assert!((sum - 59.0).abs() < 1e-9);
    }

    #[test]
    fn near_zero_narration_is_rejected_not_divided() {
        let mut rng = StdRng::seed_from_u64(7);
        for duration in [0.0, -1.0, 0.001] {
            let result = plan(
                duration,
                None,
                &[SlotSource::Still, SlotSource::Still],
                &cfg(),
                &mut rng,
            );
            assert!(matches!(result, Err(ReconcileError::DurationTooShort(_))));
        }
    }

    #[test]
    fn no_visuals_is_a_precondition_error() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            plan(30.0, None, &[], &cfg(), &mut rng),
            Err(ReconcileError::NoVisuals)
        );
    }

    #[test]
    fn short_clip_extends_per_configured_mode() {
        let mut rng = StdRng::seed_from_u64(7);
        let body = [SlotSource::Clip { duration_secs: 4.0 }];

        let frozen = plan(30.0, None, &body, &cfg(), &mut rng).unwrap();
        assert_eq!(
            frozen.slots[0].render,
            SlotRender::FreezeExtend { clip_secs: 4.0 }
        );

        let mut looping = cfg();
        looping.extend_mode = ExtendMode::Loop;
        let looped = plan(30.0, None, &body, &looping, &mut rng).unwrap();
        assert_eq!(looped.slots[0].render, SlotRender::Loop { clip_secs: 4.0 });
    }

    #[test]
    fn long_clip_is_truncated() {
        let mut rng = StdRng::seed_from_u64(7);
        let timeline = plan(
            10.0,
            None,
            &[SlotSource::Clip { duration_secs: 45.0 }],
            &cfg(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(timeline.slots[0].render, SlotRender::Trim);
        assert_eq!(timeline.slots[0].length_secs, 10.0);
    }

    #[test]
    fn boundaries_are_pure_in_the_timing_inputs() {
        let body = [SlotSource::Still, SlotSource::Still, SlotSource::Still];
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(999);

        let a = plan(31.7, Some(SlotSource::Still), &body, &cfg(), &mut rng_a).unwrap();
        let b = plan(31.7, Some(SlotSource::Still), &body, &cfg(), &mut rng_b).unwrap();

        assert_eq!(boundaries(&a), boundaries(&b));
    }

    #[test]
    fn slot_lengths_always_sum_to_the_clamped_narration() {
        let mut rng = StdRng::seed_from_u64(7);
        for (duration, n) in [(12.3, 1), (29.97, 4), (58.9, 7), (61.0, 5), (7.5, 2)] {
            let body: Vec<SlotSource> = (0..n)
                .map(|i| {
                    if i % 2 == 0 {
                        SlotSource::Still
                    } else {
                        SlotSource::Clip {
                            duration_secs: 5.0 + i as f64,
                        }
                    }
                })
                .collect();
            let timeline = plan(duration, Some(SlotSource::Still), &body, &cfg(), &mut rng).unwrap();

            let expected = f64::min(duration, 59.0);
            let sum: f64 = timeline.slots.iter().map(|s| s.length_secs).sum();
            assert!((sum - expected).abs() < timeline.frame_interval());

            // Consecutive, no gaps, no overlaps.
            let mut cursor = 0.0;
            for slot in &timeline.slots {
                assert!((slot.start_secs - cursor).abs() < 1e-9);
                assert!(slot.length_secs > 0.0);
                cursor += slot.length_secs;
            }
        }
    }
}
