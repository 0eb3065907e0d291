//! Assembly plan value types.
//!
//! An `AssemblyPlan` is the computed timeline for one build: which slides
//! play, for how long, how often the sequence repeats, and the audio/overlay
//! windows layered on top. Plans are immutable values, recomputed fresh for
//! every build because the inventory may have changed in between.

use serde::{Deserialize, Serialize};

use super::media::MediaItem;

/// One slide in the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub item: MediaItem,

    /// Display time in seconds for a single pass
    pub display_seconds: f64,
}

/// Background-audio treatment for the slide sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPlan {
    /// The selected track
    pub track: MediaItem,

    /// Where the fade-out begins, seconds from the start of the timeline
    pub fade_start: f64,

    /// Length of the fade-out in seconds
    pub fade_seconds: f64,

    /// Silence after the audio ends, up to the end of the timeline
    pub trailing_silence: f64,
}

/// Anchor position for the countdown overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    TopMiddle,
    BottomRight,
}

impl std::str::FromStr for OverlayPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top-middle" => Ok(Self::TopMiddle),
            "bottom-right" => Ok(Self::BottomRight),
            other => Err(format!("unrecognized overlay position '{other}'")),
        }
    }
}

impl std::fmt::Display for OverlayPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TopMiddle => write!(f, "top-middle"),
            Self::BottomRight => write!(f, "bottom-right"),
        }
    }
}

/// Countdown overlay window near the end of the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayPlan {
    /// Overlay start, seconds from the start of the timeline
    pub start: f64,

    /// Overlay end (always the end of the timeline)
    pub end: f64,

    pub position: OverlayPosition,
}

/// Appended clip placed after the repeating slide sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendPlan {
    pub item: MediaItem,

    /// Duration of the appended clip in seconds, externally probed
    pub duration_seconds: f64,
}

/// The full computed timeline for one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyPlan {
    /// Ordered slides for a single pass of the sequence
    pub slides: Vec<Slide>,

    /// How many times the slide sequence plays
    pub repeat_count: u32,

    /// Optional clip appended after the sequence
    pub append: Option<AppendPlan>,

    /// Optional background audio with its fade window
    pub audio: Option<AudioPlan>,

    /// Optional countdown overlay window
    pub overlay: Option<OverlayPlan>,

    /// Target duration of the final video in seconds
    pub total_seconds: f64,

    /// Output frame rate
    pub fps: f64,
}

impl AssemblyPlan {
    /// Duration of one pass of the slide sequence.
    pub fn sequence_seconds(&self) -> f64 {
        self.slides.iter().map(|s| s.display_seconds).sum()
    }

    /// Duration of the slideshow portion (sequence × repeats).
    pub fn slideshow_seconds(&self) -> f64 {
        self.sequence_seconds() * f64::from(self.repeat_count)
    }

    /// Total planned duration: slideshow plus appended clip.
    pub fn planned_seconds(&self) -> f64 {
        self.slideshow_seconds() + self.append.as_ref().map_or(0.0, |a| a.duration_seconds)
    }

    /// File names of the slides in play order, for reporting.
    pub fn slide_names(&self) -> Vec<String> {
        self.slides.iter().map(|s| s.item.file_name()).collect()
    }
}
