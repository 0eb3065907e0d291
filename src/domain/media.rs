//! Media inventory items and their ordering.
//!
//! Slides are shown in a deterministic order: files whose name starts with a
//! numeric prefix come first, ascending by that number; everything else
//! follows in lexicographic order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What role a source file plays in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A still image shown as a slide
    Image,

    /// A background-music candidate
    Audio,

    /// A video clip appended after the slide sequence
    AppendVideo,
}

/// One source file in the media inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Path of the item at its source (remote path or local path)
    pub path: PathBuf,

    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// File name portion of the path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Ordering key: numeric-prefixed names first (ascending by prefix),
    /// then the rest lexicographically.
    pub fn sort_key(&self) -> SortKey {
        sort_key(&self.path)
    }
}

/// Sort key for a media path. Numeric-prefixed names compare as
/// `(0, prefix, name)`, all others as `(1, u64::MAX, name)`, so tuple
/// ordering yields the required sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey(u8, u64, String);

/// Derive the ordering key for a file path.
pub fn sort_key(path: &Path) -> SortKey {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(n) => SortKey(0, n, name),
        Err(_) => SortKey(1, u64::MAX, name),
    }
}

/// Sort items in place by their ordering key. Stable, side-effect-free.
pub fn sort_items(items: &mut [MediaItem]) {
    items.sort_by_key(|item| item.sort_key());
}
