//! Assembly planning.
//!
//! Turns an ordered media inventory plus one configuration snapshot into the
//! timeline for a build. Pure: no I/O, no clock, no external calls. The only
//! nondeterminism is the injected RNG used for the background-music pick, so
//! identical inputs (RNG state included) always produce identical plans.
//!
//! Duration arithmetic: the appended clip's length is subtracted from the
//! target first; the remainder is divided across the repeating slide
//! sequence. The configured per-image duration caps how long a slide may
//! stay up, the minimum floor caps how briefly it may flash. The sequence
//! repeats the fewest times that respects the cap, and the per-slide time is
//! stretched or trimmed so the total hits the target exactly.

use rand::Rng;
use thiserror::Error;

use crate::config::EffectiveConfig;
use crate::domain::{
    sort_items, AppendPlan, AssemblyPlan, AudioPlan, MediaItem, MediaKind, OverlayPlan, Slide,
};

/// Output frame rate. Also defines the duration tolerance (one frame).
pub const DEFAULT_FPS: f64 = 5.0;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("no images found in the media inventory")]
    EmptyInventory,

    #[error("remaining duration {remaining:.1}s is too short for a single {floor:.1}s slide")]
    DurationTooShort { remaining: f64, floor: f64 },
}

/// Compute the assembly plan for one build.
///
/// `append_seconds` is the externally probed duration of the appended clip,
/// required iff the inventory contains an [`MediaKind::AppendVideo`] item.
pub fn plan(
    inventory: &[MediaItem],
    config: &EffectiveConfig,
    append_seconds: Option<f64>,
    rng: &mut impl Rng,
) -> Result<AssemblyPlan, PlanError> {
    let mut images: Vec<MediaItem> = inventory
        .iter()
        .filter(|i| i.kind == MediaKind::Image)
        .cloned()
        .collect();
    let audio_pool: Vec<&MediaItem> = inventory
        .iter()
        .filter(|i| i.kind == MediaKind::Audio)
        .collect();
    let append_item = inventory.iter().find(|i| i.kind == MediaKind::AppendVideo);

    if images.is_empty() {
        return Err(PlanError::EmptyInventory);
    }
    sort_items(&mut images);

    let target = config.target_seconds();
    let floor = config.min_slide_seconds().max(EPSILON);
    let desired = config.image_duration_seconds().max(floor);

    // The appended clip eats into the target first; it is trimmed to the
    // target when it alone is longer.
    let append = append_item.zip(append_seconds).map(|(item, duration)| AppendPlan {
        item: item.clone(),
        duration_seconds: duration.min(target),
    });
    let remainder = target - append.as_ref().map_or(0.0, |a| a.duration_seconds);

    let (slides, repeat_count) = if remainder <= EPSILON {
        // Appended clip fills the whole target on its own.
        (Vec::new(), 1)
    } else {
        if remainder + EPSILON < floor {
            return Err(PlanError::DurationTooShort {
                remaining: remainder,
                floor,
            });
        }
        layout_slides(images, remainder, desired, floor)
    };

    let audio = pick_audio(&audio_pool, config, target, rng);

    let overlay = config.enable_timer().then(|| {
        let window = (config.timer_minutes() * 60) as f64;
        OverlayPlan {
            start: (target - window).max(0.0),
            end: target,
            position: config.timer_position(),
        }
    });

    Ok(AssemblyPlan {
        slides,
        repeat_count,
        append,
        audio,
        overlay,
        total_seconds: target,
        fps: DEFAULT_FPS,
    })
}

/// Distribute `remainder` seconds across the slide sequence.
///
/// Repeats are the minimal count keeping per-slide time at or under the
/// configured duration; the floor then pushes back, first by dropping
/// repeats, and at a single pass by truncating the slide list itself.
fn layout_slides(
    mut images: Vec<MediaItem>,
    remainder: f64,
    desired: f64,
    floor: f64,
) -> (Vec<Slide>, u32) {
    let n = images.len() as f64;

    let mut repeats = (remainder / (n * desired)).ceil().max(1.0);
    let mut per_slide = remainder / (n * repeats);

    if per_slide + EPSILON < floor {
        repeats = (remainder / (n * floor)).floor().max(1.0);
        per_slide = remainder / (n * repeats);
    }

    if per_slide + EPSILON < floor {
        // A single pass is still too thin: show only the slides that fit.
        let keep = ((remainder / floor).floor() as usize).max(1);
        images.truncate(keep);
        per_slide = remainder / keep as f64;
    }

    let slides = images
        .into_iter()
        .map(|item| Slide {
            item,
            display_seconds: per_slide,
        })
        .collect();

    (slides, repeats as u32)
}

/// Uniform pick from the audio pool, with the fade window anchored at the
/// end of the timeline.
fn pick_audio(
    pool: &[&MediaItem],
    config: &EffectiveConfig,
    total: f64,
    rng: &mut impl Rng,
) -> Option<AudioPlan> {
    if pool.is_empty() {
        return None;
    }
    let track = pool[rng.gen_range(0..pool.len())].clone();

    let fade_seconds = config.fade_seconds();
    let trailing_silence = config.trailing_silence_seconds().min(total);
    let fade_start = (total - fade_seconds - trailing_silence).max(0.0);

    Some(AudioPlan {
        track,
        fade_start,
        fade_seconds,
        trailing_silence,
    })
}
