//! File naming shared by the manifest generator, the encoder and the dispatcher.
//!
//! Every artifact in a session directory is addressed by its file name alone:
//! - `master.m3u8` - top-level manifest
//! - `variant_<v>.m3u8` - one sub-manifest per quality variation
//! - `seg_v<v>_<nnnnn>.ts` - segment `n` of variation `v`

use regex::Regex;
use std::path::{Component, Path};
use std::sync::LazyLock;

pub const MASTER_MANIFEST: &str = "master.m3u8";
pub const MANIFEST_EXTENSION: &str = "m3u8";
pub const SEGMENT_EXTENSION: &str = "ts";

/// Width of the zero-padded sequence number in segment names.
const SEQUENCE_WIDTH: usize = 5;

static SEGMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^seg_v(\d+)_(\d+)\.ts$").expect("segment name pattern"));

/// Position of a segment within a session: which chunk, at which quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentAddress {
    pub segment: u64,
    pub variation: usize,
}

impl SegmentAddress {
    pub fn new(segment: u64, variation: usize) -> Self {
        Self { segment, variation }
    }

    pub fn file_name(&self) -> String {
        format!(
            "seg_v{}_{:0width$}.{}",
            self.variation,
            self.segment,
            SEGMENT_EXTENSION,
            width = SEQUENCE_WIDTH
        )
    }

    /// Inverse of [`SegmentAddress::file_name`].
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = SEGMENT_NAME.captures(file_name)?;
        let variation = caps.get(1)?.as_str().parse().ok()?;
        let segment = caps.get(2)?.as_str().parse().ok()?;
        Some(Self { segment, variation })
    }
}

/// Name of the sub-manifest for a variation.
pub fn variant_manifest_name(variation: usize) -> String {
    format!("variant_{}.{}", variation, MANIFEST_EXTENSION)
}

/// printf-style pattern handed to the encoder so its output lands on [`SegmentAddress::file_name`].
pub fn segment_pattern(variation: usize) -> String {
    format!(
        "seg_v{}_%0{}d.{}",
        variation, SEQUENCE_WIDTH, SEGMENT_EXTENSION
    )
}

/// What a request for `/<session>/<file>` is asking for, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedFile {
    Manifest,
    Segment,
}

impl RequestedFile {
    pub fn classify(file_name: &str) -> Option<Self> {
        match Path::new(file_name).extension()?.to_str()? {
            MANIFEST_EXTENSION => Some(Self::Manifest),
            SEGMENT_EXTENSION => Some(Self::Segment),
            _ => None,
        }
    }
}

/// True when `name` is a single normal path component, safe to join onto a directory.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// True when `path` stays below whatever directory it is joined onto.
pub fn path_is_valid(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Session names derived from file names: lowercase ASCII words joined by `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
