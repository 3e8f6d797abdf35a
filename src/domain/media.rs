use serde::{Deserialize, Serialize};

/// What the prober learned about a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Overall bit rate in bits per second, when the container reports one
    pub bit_rate: Option<u64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    /// Number of segments needed to cover the whole duration.
    pub fn segment_count(&self, segment_duration: f64) -> u64 {
        if self.duration <= 0.0 || segment_duration <= 0.0 {
            return 0;
        }
        (self.duration / segment_duration).ceil() as u64
    }
}
