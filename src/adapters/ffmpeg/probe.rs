use crate::domain::media::MediaInfo;
use crate::ports::prober::{ProbeError, Prober};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Runs the ffprobe binary and reads its JSON report.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let output = Command::new(&self.binary)
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout)
    }
}

/// Extract [`MediaInfo`] from `ffprobe -show_format -show_streams -print_format json`.
pub fn parse_probe_output(stdout: &[u8]) -> Result<MediaInfo, ProbeError> {
    let report: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let video = report
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideo)?;
    let audio = report
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("audio"));

    let format_duration = report
        .format
        .as_ref()
        .and_then(|format| format.duration.as_deref());
    let duration = format_duration
        .or(video.duration.as_deref())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|duration| duration.is_finite() && *duration > 0.0)
        .ok_or_else(|| ProbeError::Parse("missing or invalid duration".to_string()))?;

    let bit_rate = report
        .format
        .as_ref()
        .and_then(|format| format.bit_rate.as_deref())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|rate| *rate > 0);

    Ok(MediaInfo {
        duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        bit_rate,
        video_codec: video.codec_name.clone(),
        audio_codec: audio.and_then(|stream| stream.codec_name.clone()),
    })
}
