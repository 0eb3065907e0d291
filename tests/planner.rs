//! Assembly Planner Integration Tests
//!
//! Duration arithmetic, ordering, and edge cases over realistic inputs.

use rand::rngs::StdRng;
use rand::SeedableRng;

use slidecast::config::{ConfigResolver, EnvSource, OverrideStore};
use slidecast::core::{plan, PlanError};
use slidecast::domain::{MediaItem, MediaKind};
use slidecast::EffectiveConfig;

fn config_with(vars: &[(&str, &str)]) -> EffectiveConfig {
    let env = EnvSource::from_map(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    ConfigResolver::new(OverrideStore::open_in_memory().unwrap(), env)
        .resolve_all()
        .unwrap()
}

fn images(n: usize) -> Vec<MediaItem> {
    (1..=n)
        .map(|i| MediaItem::new(format!("{i}.jpg"), MediaKind::Image))
        .collect()
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

#[test]
fn total_duration_is_exact_across_input_grid() {
    for image_count in [1, 3, 5, 12, 40] {
        for target in [30, 120, 600, 3600] {
            let config = config_with(&[
                ("TARGET_VIDEO_DURATION", &target.to_string()),
                ("IMAGE_DURATION", "10"),
                ("MIN_SLIDE_SECONDS", "2"),
            ]);
            let plan = plan(&images(image_count), &config, None, &mut rng()).unwrap();

            let tolerance = 1.0 / plan.fps;
            assert!(
                (plan.planned_seconds() - target as f64).abs() <= tolerance,
                "images={image_count} target={target}: planned {} off by more than one frame",
                plan.planned_seconds(),
            );
        }
    }
}

#[test]
fn slides_follow_numeric_prefix_ordering() {
    let names = ["cover.jpg", "10.jpg", "2.jpg", "a.jpg", "1.jpg"];
    let inventory: Vec<MediaItem> = names
        .iter()
        .map(|n| MediaItem::new(*n, MediaKind::Image))
        .collect();

    let config = config_with(&[("TARGET_VIDEO_DURATION", "100")]);
    let plan = plan(&inventory, &config, None, &mut rng()).unwrap();

    assert_eq!(
        plan.slide_names(),
        vec!["1.jpg", "2.jpg", "10.jpg", "a.jpg", "cover.jpg"]
    );
}

#[test]
fn repeat_count_fills_target_at_configured_duration() {
    // 5 images at 2s per pass = 10s sequence; 100s target needs 10 passes.
    let config = config_with(&[
        ("TARGET_VIDEO_DURATION", "100"),
        ("IMAGE_DURATION", "2"),
        ("MIN_SLIDE_SECONDS", "2"),
    ]);
    let plan = plan(&images(5), &config, None, &mut rng()).unwrap();

    assert_eq!(plan.repeat_count, 10);
    assert!((plan.slides[0].display_seconds - 2.0).abs() < 1e-6);
}

#[test]
fn single_pass_wins_when_it_satisfies_the_cap() {
    // One pass of 20 images at 30s covers 600s exactly; no repeats needed.
    let config = config_with(&[
        ("TARGET_VIDEO_DURATION", "600"),
        ("IMAGE_DURATION", "30"),
        ("MIN_SLIDE_SECONDS", "5"),
    ]);
    let plan = plan(&images(20), &config, None, &mut rng()).unwrap();

    assert_eq!(plan.repeat_count, 1);
    assert!((plan.slides[0].display_seconds - 30.0).abs() < 1e-6);
}

#[test]
fn floor_pushes_repeat_count_down() {
    // Desired 2s per slide over 10 images in 30s would be ceil(30/20)=2
    // passes at 1.5s each, under the 2s floor; one pass at 3s satisfies it.
    let config = config_with(&[
        ("TARGET_VIDEO_DURATION", "30"),
        ("IMAGE_DURATION", "2"),
        ("MIN_SLIDE_SECONDS", "2"),
    ]);
    let plan = plan(&images(10), &config, None, &mut rng()).unwrap();

    assert_eq!(plan.repeat_count, 1);
    assert!((plan.slides[0].display_seconds - 3.0).abs() < 1e-6);
}

#[test]
fn oversized_inventory_truncates_slide_list() {
    // 40 images cannot each get the 2s floor inside 30s; only 15 fit.
    let config = config_with(&[
        ("TARGET_VIDEO_DURATION", "30"),
        ("IMAGE_DURATION", "2"),
        ("MIN_SLIDE_SECONDS", "2"),
    ]);
    let plan = plan(&images(40), &config, None, &mut rng()).unwrap();

    assert_eq!(plan.repeat_count, 1);
    assert_eq!(plan.slides.len(), 15);
    let tolerance = 1.0 / plan.fps;
    assert!((plan.planned_seconds() - 30.0).abs() <= tolerance);
}

#[test]
fn empty_inventory_is_rejected() {
    let config = config_with(&[]);
    let audio_only = vec![MediaItem::new("song.mp3", MediaKind::Audio)];
    assert_eq!(
        plan(&audio_only, &config, None, &mut rng()).unwrap_err(),
        PlanError::EmptyInventory
    );
}

#[test]
fn too_short_target_is_rejected_not_clamped() {
    let config = config_with(&[
        ("TARGET_VIDEO_DURATION", "1"),
        ("MIN_SLIDE_SECONDS", "5"),
    ]);
    assert!(matches!(
        plan(&images(4), &config, None, &mut rng()).unwrap_err(),
        PlanError::DurationTooShort { .. }
    ));
}

#[test]
fn append_clip_subtracts_from_slide_budget() {
    let config = config_with(&[
        ("TARGET_VIDEO_DURATION", "600"),
        ("IMAGE_DURATION", "10"),
        ("APPEND_VIDEO_PATH", "outro.mp4"),
    ]);
    let mut inventory = images(8);
    inventory.push(MediaItem::new("outro.mp4", MediaKind::AppendVideo));

    let plan = plan(&inventory, &config, Some(90.0), &mut rng()).unwrap();

    assert!((plan.slideshow_seconds() - 510.0).abs() <= 1.0 / plan.fps);
    assert!((plan.planned_seconds() - 600.0).abs() <= 1.0 / plan.fps);
    assert_eq!(plan.append.as_ref().unwrap().duration_seconds, 90.0);
}

#[test]
fn append_longer_than_target_is_trimmed() {
    let config = config_with(&[("TARGET_VIDEO_DURATION", "60")]);
    let mut inventory = images(2);
    inventory.push(MediaItem::new("outro.mp4", MediaKind::AppendVideo));

    let plan = plan(&inventory, &config, Some(300.0), &mut rng()).unwrap();

    assert!(plan.slides.is_empty());
    assert_eq!(plan.append.as_ref().unwrap().duration_seconds, 60.0);
}

#[test]
fn audio_fade_defaults_leave_five_seconds_of_silence() {
    let config = config_with(&[("TARGET_VIDEO_DURATION", "300")]);
    let mut inventory = images(4);
    inventory.push(MediaItem::new("track.mp3", MediaKind::Audio));

    let plan = plan(&inventory, &config, None, &mut rng()).unwrap();
    let audio = plan.audio.unwrap();

    assert!((audio.fade_start - 285.0).abs() < 1e-6);
    assert!((audio.trailing_silence - 5.0).abs() < 1e-6);
}

#[test]
fn identical_inputs_and_seed_give_identical_plans() {
    let config = config_with(&[("TARGET_VIDEO_DURATION", "240")]);
    let mut inventory = images(6);
    for name in ["a.mp3", "b.mp3", "c.mp3", "d.mp3"] {
        inventory.push(MediaItem::new(name, MediaKind::Audio));
    }

    let first = plan(&inventory, &config, None, &mut StdRng::seed_from_u64(9)).unwrap();
    let second = plan(&inventory, &config, None, &mut StdRng::seed_from_u64(9)).unwrap();
    assert_eq!(first, second);
}
