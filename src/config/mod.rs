//! Layered runtime configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Override store (SQLite, mutated via chat commands)
//! 2. Environment variables
//! 3. Compiled-in defaults
//!
//! The resolver is read-through: every `resolve` hits the store, so a
//! cleared override stops applying immediately. Builds take one immutable
//! `EffectiveConfig` snapshot up front and never re-read mid-build.
//!
//! Credentials and endpoints (storage, chat, push) are environment-only and
//! deliberately outside the overridable surface.

pub mod store;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::OverlayPosition;
use crate::schedule;

pub use store::OverrideStore;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Override,
    Environment,
    Default,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Environment => write!(f, "environment"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Declared type of a configuration value, used to validate `!set` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Non-negative integer
    Integer,

    /// `true` / `false` (case-insensitive)
    Boolean,

    /// One of a fixed set of lowercase tokens
    Enumerated(&'static [&'static str]),

    /// Remote or local path; must be non-empty
    PathLike,

    /// Five-field cron expression
    CronExpr,

    /// Free-form text
    Text,
}

impl ValueKind {
    fn describe(&self) -> String {
        match self {
            Self::Integer => "an integer".to_string(),
            Self::Boolean => "true or false".to_string(),
            Self::Enumerated(options) => format!("one of: {}", options.join(", ")),
            Self::PathLike => "a non-empty path".to_string(),
            Self::CronExpr => "a cron expression (minute hour day month weekday)".to_string(),
            Self::Text => "text".to_string(),
        }
    }

    fn validate(&self, value: &str) -> bool {
        match self {
            Self::Integer => value.parse::<u64>().is_ok(),
            Self::Boolean => {
                let v = value.to_ascii_lowercase();
                v == "true" || v == "false"
            }
            Self::Enumerated(options) => options.contains(&value.to_ascii_lowercase().as_str()),
            Self::PathLike => !value.trim().is_empty(),
            Self::CronExpr => schedule::parse(value).is_ok(),
            Self::Text => true,
        }
    }
}

const SOURCE_OPTIONS: &[&str] = &["local", "webdav"];
const POSITION_OPTIONS: &[&str] = &["top-middle", "bottom-right"];

/// The recognized configuration surface. Unknown keys are rejected at the
/// edge, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigKey {
    ImageDuration,
    MinSlideSeconds,
    TargetVideoDuration,
    FadeSeconds,
    TrailingSilenceSeconds,
    CronSchedule,
    UploadPath,
    ImageSource,
    ImagePath,
    MusicSource,
    MusicPath,
    AppendVideoSource,
    AppendVideoPath,
    EnableTimer,
    TimerMinutes,
    TimerPosition,
    EnableHeartbeat,
    EnableNtfy,
    NtfyTopic,
}

impl ConfigKey {
    /// Every recognized key, in display order.
    pub const ALL: [ConfigKey; 19] = [
        ConfigKey::ImageDuration,
        ConfigKey::MinSlideSeconds,
        ConfigKey::TargetVideoDuration,
        ConfigKey::FadeSeconds,
        ConfigKey::TrailingSilenceSeconds,
        ConfigKey::CronSchedule,
        ConfigKey::UploadPath,
        ConfigKey::ImageSource,
        ConfigKey::ImagePath,
        ConfigKey::MusicSource,
        ConfigKey::MusicPath,
        ConfigKey::AppendVideoSource,
        ConfigKey::AppendVideoPath,
        ConfigKey::EnableTimer,
        ConfigKey::TimerMinutes,
        ConfigKey::TimerPosition,
        ConfigKey::EnableHeartbeat,
        ConfigKey::EnableNtfy,
        ConfigKey::NtfyTopic,
    ];

    /// Canonical key name; doubles as the environment variable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ImageDuration => "IMAGE_DURATION",
            Self::MinSlideSeconds => "MIN_SLIDE_SECONDS",
            Self::TargetVideoDuration => "TARGET_VIDEO_DURATION",
            Self::FadeSeconds => "FADE_SECONDS",
            Self::TrailingSilenceSeconds => "TRAILING_SILENCE_SECONDS",
            Self::CronSchedule => "CRON_SCHEDULE",
            Self::UploadPath => "UPLOAD_PATH",
            Self::ImageSource => "IMAGE_SOURCE",
            Self::ImagePath => "IMAGE_PATH",
            Self::MusicSource => "MUSIC_SOURCE",
            Self::MusicPath => "MUSIC_PATH",
            Self::AppendVideoSource => "APPEND_VIDEO_SOURCE",
            Self::AppendVideoPath => "APPEND_VIDEO_PATH",
            Self::EnableTimer => "ENABLE_TIMER",
            Self::TimerMinutes => "TIMER_MINUTES",
            Self::TimerPosition => "TIMER_POSITION",
            Self::EnableHeartbeat => "ENABLE_HEARTBEAT",
            Self::EnableNtfy => "ENABLE_NTFY",
            Self::NtfyTopic => "NTFY_TOPIC",
        }
    }

    /// Look a key up by its canonical name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.into_iter().find(|k| k.name() == upper)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::ImageDuration
            | Self::MinSlideSeconds
            | Self::TargetVideoDuration
            | Self::FadeSeconds
            | Self::TrailingSilenceSeconds
            | Self::TimerMinutes => ValueKind::Integer,
            Self::CronSchedule => ValueKind::CronExpr,
            Self::UploadPath
            | Self::ImagePath
            | Self::MusicPath
            | Self::AppendVideoPath => ValueKind::PathLike,
            Self::ImageSource | Self::MusicSource | Self::AppendVideoSource => {
                ValueKind::Enumerated(SOURCE_OPTIONS)
            }
            Self::EnableTimer | Self::EnableHeartbeat | Self::EnableNtfy => ValueKind::Boolean,
            Self::TimerPosition => ValueKind::Enumerated(POSITION_OPTIONS),
            Self::NtfyTopic => ValueKind::Text,
        }
    }

    /// Compiled-in default. Empty means "not configured".
    pub fn default_value(&self) -> &'static str {
        match self {
            Self::ImageDuration => "10",
            Self::MinSlideSeconds => "2",
            Self::TargetVideoDuration => "600",
            Self::FadeSeconds => "10",
            Self::TrailingSilenceSeconds => "5",
            Self::CronSchedule => schedule::FALLBACK_SCHEDULE,
            Self::UploadPath => "",
            Self::ImageSource => "local",
            Self::ImagePath => "images/",
            Self::MusicSource => "local",
            Self::MusicPath => "",
            Self::AppendVideoSource => "local",
            Self::AppendVideoPath => "",
            Self::EnableTimer => "false",
            Self::TimerMinutes => "5",
            Self::TimerPosition => "top-middle",
            Self::EnableHeartbeat => "true",
            Self::EnableNtfy => "true",
            Self::NtfyTopic => "",
        }
    }

    /// Display group for `!get all` and `!help`.
    pub fn group(&self) -> &'static str {
        match self {
            Self::ImageDuration
            | Self::MinSlideSeconds
            | Self::TargetVideoDuration
            | Self::FadeSeconds
            | Self::TrailingSilenceSeconds
            | Self::CronSchedule => "General",
            Self::UploadPath
            | Self::ImageSource
            | Self::ImagePath
            | Self::MusicSource
            | Self::MusicPath
            | Self::AppendVideoSource
            | Self::AppendVideoPath => "Storage",
            Self::EnableTimer | Self::TimerMinutes | Self::TimerPosition => "Timer",
            Self::EnableHeartbeat => "Heartbeat",
            Self::EnableNtfy | Self::NtfyTopic => "Notify",
        }
    }

    /// Whether an empty value is allowed to mean "not configured" even for
    /// path-like keys.
    fn empty_allowed(&self) -> bool {
        matches!(
            self,
            Self::UploadPath | Self::MusicPath | Self::AppendVideoPath | Self::NtfyTopic
        )
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors from the configuration edge.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{0}' is not a configurable setting")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: ConfigKey,
        value: String,
        expected: String,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Environment values captured at startup. Tests inject a fixed map.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    values: HashMap<String, String>,
}

impl EnvSource {
    /// Snapshot the process environment.
    pub fn from_process() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    /// Fixed map, for tests.
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Look up a variable, stripping whitespace and surrounding quotes.
    pub fn value(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|raw| {
            raw.trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string()
        })
    }
}

/// Immutable snapshot of the full resolved configuration.
///
/// Rebuilt at the start of every build; never mutated in place.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    entries: BTreeMap<ConfigKey, (String, Source)>,
}

/// Media source selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Local,
    Webdav,
}

impl EffectiveConfig {
    /// Raw resolved value and its source.
    pub fn entry(&self, key: ConfigKey) -> (&str, Source) {
        let (value, source) = &self.entries[&key];
        (value.as_str(), *source)
    }

    pub fn value(&self, key: ConfigKey) -> &str {
        self.entry(key).0
    }

    pub fn source(&self, key: ConfigKey) -> Source {
        self.entry(key).1
    }

    fn integer(&self, key: ConfigKey) -> u64 {
        // Values are validated at snapshot time; the default always parses.
        self.value(key)
            .parse()
            .unwrap_or_else(|_| key.default_value().parse().expect("default is an integer"))
    }

    fn boolean(&self, key: ConfigKey) -> bool {
        self.value(key).eq_ignore_ascii_case("true")
    }

    fn media_source(&self, key: ConfigKey) -> MediaSource {
        match self.value(key) {
            "webdav" => MediaSource::Webdav,
            _ => MediaSource::Local,
        }
    }

    fn optional(&self, key: ConfigKey) -> Option<String> {
        let value = self.value(key).trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    pub fn image_duration_seconds(&self) -> f64 {
        self.integer(ConfigKey::ImageDuration) as f64
    }

    pub fn min_slide_seconds(&self) -> f64 {
        self.integer(ConfigKey::MinSlideSeconds) as f64
    }

    pub fn target_seconds(&self) -> f64 {
        self.integer(ConfigKey::TargetVideoDuration) as f64
    }

    pub fn fade_seconds(&self) -> f64 {
        self.integer(ConfigKey::FadeSeconds) as f64
    }

    pub fn trailing_silence_seconds(&self) -> f64 {
        self.integer(ConfigKey::TrailingSilenceSeconds) as f64
    }

    pub fn cron_schedule(&self) -> &str {
        self.value(ConfigKey::CronSchedule)
    }

    pub fn upload_path(&self) -> Option<String> {
        self.optional(ConfigKey::UploadPath)
    }

    pub fn image_source(&self) -> MediaSource {
        self.media_source(ConfigKey::ImageSource)
    }

    pub fn image_path(&self) -> String {
        self.value(ConfigKey::ImagePath).to_string()
    }

    pub fn music_source(&self) -> MediaSource {
        self.media_source(ConfigKey::MusicSource)
    }

    /// Music folder; falls back to the image folder when unset.
    pub fn music_path(&self) -> String {
        self.optional(ConfigKey::MusicPath)
            .unwrap_or_else(|| self.image_path())
    }

    pub fn append_video_source(&self) -> MediaSource {
        self.media_source(ConfigKey::AppendVideoSource)
    }

    pub fn append_video_path(&self) -> Option<String> {
        self.optional(ConfigKey::AppendVideoPath)
    }

    pub fn enable_timer(&self) -> bool {
        self.boolean(ConfigKey::EnableTimer)
    }

    pub fn timer_minutes(&self) -> u64 {
        self.integer(ConfigKey::TimerMinutes)
    }

    pub fn timer_position(&self) -> OverlayPosition {
        self.value(ConfigKey::TimerPosition)
            .parse()
            .unwrap_or(OverlayPosition::TopMiddle)
    }

    pub fn enable_heartbeat(&self) -> bool {
        self.boolean(ConfigKey::EnableHeartbeat)
    }

    pub fn enable_ntfy(&self) -> bool {
        self.boolean(ConfigKey::EnableNtfy)
    }

    pub fn ntfy_topic(&self) -> Option<String> {
        self.optional(ConfigKey::NtfyTopic)
    }
}

/// Read-through resolver over defaults, environment, and the override store.
pub struct ConfigResolver {
    store: OverrideStore,
    env: EnvSource,
}

impl ConfigResolver {
    pub fn new(store: OverrideStore, env: EnvSource) -> Self {
        Self { store, env }
    }

    /// Resolve one key: override, then environment, then default.
    ///
    /// An environment value that fails validation is ignored with a warning
    /// rather than poisoning the snapshot; overrides were validated at write
    /// time and pass through untouched.
    pub fn resolve(&self, key: ConfigKey) -> Result<(String, Source), ConfigError> {
        if let Some(value) = self.store.get(key.name())? {
            return Ok((value, Source::Override));
        }

        if let Some(value) = self.env.value(key.name()) {
            let valid = if value.is_empty() {
                key.empty_allowed()
            } else {
                key.kind().validate(&value)
            };
            if valid {
                return Ok((value, Source::Environment));
            }
            warn!(
                key = key.name(),
                value = %value,
                "Ignoring invalid environment value, using default"
            );
        }

        Ok((key.default_value().to_string(), Source::Default))
    }

    /// Resolve every key into an immutable snapshot.
    pub fn resolve_all(&self) -> Result<EffectiveConfig, ConfigError> {
        let mut entries = BTreeMap::new();
        for key in ConfigKey::ALL {
            entries.insert(key, self.resolve(key)?);
        }
        Ok(EffectiveConfig { entries })
    }

    /// Validate and commit an override. The store is left unchanged when the
    /// key or value is rejected.
    pub fn set_override(&self, key_name: &str, value: &str) -> Result<ConfigKey, ConfigError> {
        let key = ConfigKey::from_name(key_name)
            .ok_or_else(|| ConfigError::UnknownKey(key_name.to_string()))?;

        let value = value.trim();
        let valid = if value.is_empty() {
            key.empty_allowed()
        } else {
            key.kind().validate(value)
        };
        if !valid {
            return Err(ConfigError::InvalidValue {
                key,
                value: value.to_string(),
                expected: key.kind().describe(),
            });
        }

        self.store.set(key.name(), value)?;
        Ok(key)
    }

    /// Remove one override. Returns whether one existed.
    pub fn clear_override(&self, key_name: &str) -> Result<bool, ConfigError> {
        let key = ConfigKey::from_name(key_name)
            .ok_or_else(|| ConfigError::UnknownKey(key_name.to_string()))?;
        Ok(self.store.delete(key.name())?)
    }

    /// Remove every override. Returns how many were cleared.
    pub fn clear_all(&self) -> Result<usize, ConfigError> {
        Ok(self.store.clear_all()?)
    }

    /// Active overrides as (key, value) pairs.
    pub fn overrides(&self) -> Result<Vec<(String, String)>, ConfigError> {
        Ok(self.store.list_all()?)
    }
}

/// Environment-only endpoints and credentials, outside the overridable
/// surface.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub storage_url: Option<String>,
    pub storage_username: Option<String>,
    pub storage_password: Option<String>,
    pub storage_insecure_tls: bool,
    pub matrix_homeserver: Option<String>,
    pub matrix_token: Option<String>,
    pub matrix_room: Option<String>,
    pub matrix_user_id: Option<String>,
    pub allowed_senders: Vec<String>,
    pub ntfy_url: Option<String>,
    pub ntfy_token: Option<String>,
    pub output_filepath: Option<PathBuf>,
}

impl Endpoints {
    pub fn from_env(env: &EnvSource) -> Self {
        let allowed_senders = env
            .value("ALLOWED_SENDERS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            storage_url: env.value("STORAGE_URL"),
            storage_username: env.value("STORAGE_USERNAME"),
            storage_password: env.value("STORAGE_PASSWORD"),
            storage_insecure_tls: env
                .value("STORAGE_INSECURE_TLS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            matrix_homeserver: env.value("MATRIX_HOMESERVER"),
            matrix_token: env.value("MATRIX_ACCESS_TOKEN"),
            matrix_room: env.value("MATRIX_ROOM_ID"),
            matrix_user_id: env.value("MATRIX_USER_ID"),
            allowed_senders,
            ntfy_url: env.value("NTFY_URL"),
            ntfy_token: env.value("NTFY_TOKEN"),
            output_filepath: env.value("OUTPUT_FILEPATH").map(PathBuf::from),
        }
    }
}

/// Default data directory (override store lives here).
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SLIDECAST_DATA") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".slidecast")
}
