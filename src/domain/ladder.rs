//! Quality ladder: the renditions a session can switch between.

use super::media::MediaInfo;
use crate::ports::ladder::LadderBuilder;
use serde::{Deserialize, Serialize};

/// One rendition of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVariation {
    /// Target video bit rate in bits per second
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
    pub width: u32,
    pub height: u32,
}

impl QualityVariation {
    /// Peak bandwidth advertised in the master manifest.
    pub fn bandwidth(&self) -> u64 {
        self.video_bitrate + self.audio_bitrate
    }
}

/// Ordered renditions, lowest first; the index is the variation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLadder {
    pub variations: Vec<QualityVariation>,
    /// Shared by every variation so playlists stay aligned across switches
    pub segment_duration: f64,
}

impl QualityLadder {
    /// The variation every session starts encoding with.
    pub const DEFAULT_VARIATION: usize = 0;

    pub fn get(&self, variation: usize) -> Option<&QualityVariation> {
        self.variations.get(variation)
    }

    pub fn len(&self) -> usize {
        self.variations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }
}

/// (height, video bit rate) rungs offered when the source is tall enough.
const RUNGS: [(u32, u64); 4] = [
    (360, 800_000),
    (480, 1_400_000),
    (720, 2_800_000),
    (1080, 5_000_000),
];

const AUDIO_BITRATE: u64 = 128_000;

/// Fixed ladder of common resolutions, never upscaling the source.
#[derive(Debug, Clone)]
pub struct StandardLadder {
    pub segment_duration: f64,
}

impl StandardLadder {
    pub fn new(segment_duration: f64) -> Self {
        Self { segment_duration }
    }
}

impl LadderBuilder for StandardLadder {
    fn build(&self, info: &MediaInfo) -> QualityLadder {
        let audio_bitrate = if info.has_audio() { AUDIO_BITRATE } else { 0 };
        let source_video_bitrate = info
            .bit_rate
            .map(|total| total.saturating_sub(audio_bitrate))
            .filter(|rate| *rate > 0);

        let mut variations: Vec<QualityVariation> = RUNGS
            .iter()
            .filter(|(height, _)| *height <= info.height)
            .map(|&(height, bitrate)| QualityVariation {
                video_bitrate: source_video_bitrate.map_or(bitrate, |src| bitrate.min(src)),
                audio_bitrate,
                width: scaled_width(info, height),
                height,
            })
            .collect();

        if variations.is_empty() {
            variations.push(QualityVariation {
                video_bitrate: source_video_bitrate.unwrap_or(RUNGS[0].1),
                audio_bitrate,
                width: even(info.width),
                height: even(info.height),
            });
        }

        QualityLadder {
            variations,
            segment_duration: self.segment_duration,
        }
    }
}

/// Width that keeps the source aspect ratio at `height`, rounded to an even number.
fn scaled_width(info: &MediaInfo, height: u32) -> u32 {
    if info.height == 0 {
        return even(height * 16 / 9);
    }
    let width = (u64::from(info.width) * u64::from(height) / u64::from(info.height)) as u32;
    even(width)
}

fn even(value: u32) -> u32 {
    value - value % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(width: u32, height: u32, bit_rate: Option<u64>) -> MediaInfo {
        MediaInfo {
            duration: 120.0,
            width,
            height,
            bit_rate,
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
        }
    }

    #[test]
    fn test_full_hd_source_gets_every_rung() {
        let ladder = StandardLadder::new(3.0).build(&source(1920, 1080, None));
        let heights: Vec<u32> = ladder.variations.iter().map(|v| v.height).collect();
        assert_eq!(heights, vec![360, 480, 720, 1080]);
        assert_eq!(ladder.segment_duration, 3.0);
        assert_eq!(ladder.variations[0].width, 640);
        assert_eq!(ladder.variations[3].width, 1920);
    }

    #[test]
    fn test_ladder_is_lowest_first() {
        let ladder = StandardLadder::new(3.0).build(&source(1280, 720, None));
        assert_eq!(ladder.len(), 3);
        assert!(ladder
            .variations
            .windows(2)
            .all(|pair| pair[0].bandwidth() < pair[1].bandwidth()));
    }

    #[test]
    fn test_small_source_gets_single_rung() {
        let ladder = StandardLadder::new(3.0).build(&source(321, 241, Some(500_000)));
        assert_eq!(ladder.len(), 1);
        assert_eq!(ladder.variations[0].width, 320);
        assert_eq!(ladder.variations[0].height, 240);
        assert_eq!(ladder.variations[0].video_bitrate, 500_000 - 128_000);
    }

    #[test]
    fn test_bitrate_capped_by_source() {
        let ladder = StandardLadder::new(3.0).build(&source(1920, 1080, Some(2_128_000)));
        assert_eq!(ladder.variations[0].video_bitrate, 800_000);
        assert_eq!(ladder.variations[3].video_bitrate, 2_000_000);
    }

    #[test]
    fn test_silent_source_has_no_audio_bitrate() {
        let mut info = source(1920, 1080, None);
        info.audio_codec = None;
        let ladder = StandardLadder::new(3.0).build(&info);
        assert!(ladder.variations.iter().all(|v| v.audio_bitrate == 0));
    }
}
