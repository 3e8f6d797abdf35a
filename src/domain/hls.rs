use super::addressing::{variant_manifest_name, SegmentAddress};
use super::ladder::QualityLadder;
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;

pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
}

pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<MediaSegment>,
    pub end_list: bool,
    pub playlist_type: Option<String>,
    pub independent_segments: bool,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: true,
            playlist_type: None,
            independent_segments: false,
        }
    }

    /// VOD playlist for one variation: `total_segments` entries of `segment_duration`,
    /// the last one trimmed to whatever remains of `duration`.
    pub fn for_variation(
        variation: usize,
        total_segments: u64,
        segment_duration: f64,
        duration: f64,
    ) -> Self {
        let mut playlist = Self::new(segment_duration.ceil() as u64);
        playlist.playlist_type = Some("VOD".to_string());
        playlist.independent_segments = true;

        for segment in 0..total_segments {
            let start = segment as f64 * segment_duration;
            let length = if segment + 1 == total_segments {
                (duration - start).clamp(0.0, segment_duration)
            } else {
                segment_duration
            };
            playlist.add_segment(length, SegmentAddress::new(segment, variation).file_name());
        }
        playlist
    }

    pub fn add_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment { duration, uri });
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        let _ = writeln!(out, "#EXT-X-VERSION:{}", self.version);
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);

        if let Some(pt) = &self.playlist_type {
            let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:{}", pt);
        }

        if self.independent_segments {
            out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
        }

        for segment in &self.segments {
            // Same precision ffmpeg writes
            let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration);
            out.push_str(&segment.uri);
            out.push('\n');
        }

        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }

        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        fs::write(path, self.render()).await
    }
}

pub struct VariantStream {
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    pub codecs: Option<String>,
    pub uri: String,
}

/// Top-level playlist pointing at one media playlist per variation.
pub struct MasterPlaylist {
    pub version: u8,
    pub streams: Vec<VariantStream>,
}

impl MasterPlaylist {
    pub fn from_ladder(ladder: &QualityLadder, codecs: Option<&str>) -> Self {
        let streams = ladder
            .variations
            .iter()
            .enumerate()
            .map(|(index, variation)| VariantStream {
                bandwidth: variation.bandwidth(),
                width: variation.width,
                height: variation.height,
                codecs: codecs.map(str::to_string),
                uri: variant_manifest_name(index),
            })
            .collect();

        Self {
            version: 3,
            streams,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        let _ = writeln!(out, "#EXT-X-VERSION:{}", self.version);

        for stream in &self.streams {
            let _ = write!(
                out,
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}",
                stream.bandwidth, stream.width, stream.height
            );
            if let Some(codecs) = &stream.codecs {
                let _ = write!(out, ",CODECS=\"{}\"", codecs);
            }
            out.push('\n');
            out.push_str(&stream.uri);
            out.push('\n');
        }

        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        fs::write(path, self.render()).await
    }
}
