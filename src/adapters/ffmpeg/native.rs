//! In-process probing through libav, enabled with the `native-probe` feature.

use crate::domain::media::MediaInfo;
use crate::ports::prober::{ProbeError, Prober};
use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use std::path::Path;
use tokio::task;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProber;

#[async_trait]
impl Prober for NativeProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let path = path.to_path_buf();
        task::spawn_blocking(move || probe_blocking(&path))
            .await
            .map_err(|e| ProbeError::Parse(e.to_string()))?
    }
}

fn probe_blocking(path: &Path) -> Result<MediaInfo, ProbeError> {
    ffmpeg::init().map_err(|e| ProbeError::Parse(e.to_string()))?;
    let context = ffmpeg::format::input(path).map_err(|e| ProbeError::Failed {
        status: "open".to_string(),
        stderr: e.to_string(),
    })?;

    let video = context
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(ProbeError::NoVideo)?;
    let decoder = ffmpeg::codec::context::Context::from_parameters(video.parameters())
        .and_then(|codec| codec.decoder().video())
        .map_err(|e| ProbeError::Parse(e.to_string()))?;
    let audio_codec = context
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .map(|stream| stream.parameters().id().name().to_string());

    let duration = context.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ProbeError::Parse("missing or invalid duration".to_string()));
    }

    Ok(MediaInfo {
        duration,
        width: decoder.width(),
        height: decoder.height(),
        bit_rate: u64::try_from(context.bit_rate()).ok().filter(|rate| *rate > 0),
        video_codec: Some(decoder.id().name().to_string()),
        audio_codec,
    })
}
