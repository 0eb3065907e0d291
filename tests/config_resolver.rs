//! Configuration Resolver Integration Tests
//!
//! Layering, validation, and read-through behavior over a persisted store.

use std::collections::HashMap;

use slidecast::config::{ConfigError, ConfigKey, ConfigResolver, EnvSource, OverrideStore, Source};

fn env(vars: &[(&str, &str)]) -> EnvSource {
    EnvSource::from_map(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn override_wins_for_every_key_regardless_of_environment() {
    // Give every key an environment value of some valid shape.
    let mut vars: HashMap<String, String> = HashMap::new();
    for key in ConfigKey::ALL {
        let env_value = match key.name() {
            "CRON_SCHEDULE" => "30 4 * * 2",
            "IMAGE_SOURCE" | "MUSIC_SOURCE" | "APPEND_VIDEO_SOURCE" => "webdav",
            "TIMER_POSITION" => "bottom-right",
            "ENABLE_TIMER" | "ENABLE_HEARTBEAT" | "ENABLE_NTFY" => "true",
            "NTFY_TOPIC" => "builds",
            name if name.ends_with("PATH") => "somewhere/",
            _ => "7",
        };
        vars.insert(key.name().to_string(), env_value.to_string());
    }

    let resolver = ConfigResolver::new(
        OverrideStore::open_in_memory().unwrap(),
        EnvSource::from_map(vars),
    );

    for key in ConfigKey::ALL {
        let override_value = match key.name() {
            "CRON_SCHEDULE" => "15 3 * * 6",
            "IMAGE_SOURCE" | "MUSIC_SOURCE" | "APPEND_VIDEO_SOURCE" => "local",
            "TIMER_POSITION" => "top-middle",
            "ENABLE_TIMER" | "ENABLE_HEARTBEAT" | "ENABLE_NTFY" => "false",
            "NTFY_TOPIC" => "other",
            name if name.ends_with("PATH") => "elsewhere/",
            _ => "11",
        };
        resolver.set_override(key.name(), override_value).unwrap();

        let (value, source) = resolver.resolve(key).unwrap();
        assert_eq!(value, override_value, "key {key}");
        assert_eq!(source, Source::Override, "key {key}");
    }
}

#[test]
fn clear_all_returns_every_key_to_env_or_default() {
    let resolver = ConfigResolver::new(
        OverrideStore::open_in_memory().unwrap(),
        env(&[("IMAGE_DURATION", "25"), ("NTFY_TOPIC", "builds")]),
    );

    for key in ConfigKey::ALL {
        if matches!(key.kind(), slidecast::config::ValueKind::Integer) {
            resolver.set_override(key.name(), "13").unwrap();
        }
    }
    assert!(resolver.clear_all().unwrap() > 0);

    for key in ConfigKey::ALL {
        let (value, source) = resolver.resolve(key).unwrap();
        assert_ne!(source, Source::Override, "override survived for {key}");
        match key {
            ConfigKey::ImageDuration => {
                assert_eq!((value.as_str(), source), ("25", Source::Environment));
            }
            ConfigKey::NtfyTopic => {
                assert_eq!((value.as_str(), source), ("builds", Source::Environment));
            }
            _ => assert_eq!(value, key.default_value(), "key {key}"),
        }
    }
}

#[test]
fn rejected_set_leaves_store_unchanged() {
    let resolver =
        ConfigResolver::new(OverrideStore::open_in_memory().unwrap(), EnvSource::default());

    assert!(matches!(
        resolver.set_override("IMAGE_DURATION", "fast"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        resolver.set_override("FAVORITE_COLOR", "blue"),
        Err(ConfigError::UnknownKey(_))
    ));

    assert!(resolver.overrides().unwrap().is_empty());
    let (value, source) = resolver.resolve(ConfigKey::ImageDuration).unwrap();
    assert_eq!((value.as_str(), source), ("10", Source::Default));
}

#[test]
fn overrides_survive_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("settings.db");

    {
        let resolver =
            ConfigResolver::new(OverrideStore::open(&db).unwrap(), EnvSource::default());
        resolver.set_override("TARGET_VIDEO_DURATION", "900").unwrap();
    }

    let resolver = ConfigResolver::new(OverrideStore::open(&db).unwrap(), EnvSource::default());
    let (value, source) = resolver.resolve(ConfigKey::TargetVideoDuration).unwrap();
    assert_eq!((value.as_str(), source), ("900", Source::Override));
}

#[test]
fn snapshot_is_stable_while_store_mutates() {
    let resolver =
        ConfigResolver::new(OverrideStore::open_in_memory().unwrap(), EnvSource::default());
    resolver.set_override("IMAGE_DURATION", "20").unwrap();

    let snapshot = resolver.resolve_all().unwrap();
    resolver.set_override("IMAGE_DURATION", "40").unwrap();

    // The snapshot a build holds does not move underneath it.
    assert_eq!(snapshot.image_duration_seconds(), 20.0);
    // A fresh resolve sees the new value immediately.
    assert_eq!(resolver.resolve_all().unwrap().image_duration_seconds(), 40.0);
}

#[test]
fn boolean_and_enum_parsing_is_case_insensitive() {
    let resolver = ConfigResolver::new(
        OverrideStore::open_in_memory().unwrap(),
        env(&[("ENABLE_TIMER", "True")]),
    );
    assert!(resolver.resolve_all().unwrap().enable_timer());

    resolver.set_override("TIMER_POSITION", "Bottom-Right").unwrap();
    assert_eq!(
        resolver.resolve_all().unwrap().timer_position(),
        slidecast::domain::OverlayPosition::BottomRight
    );
}
