//! ffmpeg as a continuous HLS segment producer.
//!
//! One ffmpeg process per job, seeked to the job's first segment and numbering its
//! output from there. The HLS muxer logs `Opening '<file>' for writing` every time it
//! starts a segment, so opening segment N means N-1 is complete; a clean exit
//! completes the last one.

use crate::domain::addressing::{segment_pattern, SegmentAddress};
use crate::ports::encoder::{CompletionSender, EncodeRequest, Encoder, EncoderError, EncoderJob};
use async_trait::async_trait;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static OPENING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Opening '([^']+)' for writing").expect("opening pattern"));

/// Segment a muxer log line says is being started, if any.
pub fn opened_segment(line: &str) -> Option<SegmentAddress> {
    let caps = OPENING.captures(line)?;
    let file_name = Path::new(caps.get(1)?.as_str()).file_name()?.to_str()?;
    SegmentAddress::parse(file_name)
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Full ffmpeg command line for `request`.
    pub fn args(request: &EncodeRequest) -> Vec<OsString> {
        let start_time = format!("{:.3}", request.start_time());
        let segment = request.segment_duration.to_string();
        let video_bitrate = request.variation.video_bitrate;

        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            "info".into(),
            "-ss".into(),
            start_time.clone().into(),
            "-i".into(),
            request.source.clone().into(),
            "-map".into(),
            "0:v:0".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-profile:v".into(),
            "high".into(),
            "-level".into(),
            "4.0".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-b:v".into(),
            video_bitrate.to_string().into(),
            "-maxrate".into(),
            (video_bitrate * 107 / 100).to_string().into(),
            "-bufsize".into(),
            (video_bitrate * 3 / 2).to_string().into(),
            "-vf".into(),
            format!("scale={}:{}", request.variation.width, request.variation.height).into(),
            "-sc_threshold".into(),
            "0".into(),
            "-force_key_frames".into(),
            format!("expr:gte(t,n_forced*{})", segment).into(),
        ];

        if request.has_audio {
            let audio: [OsString; 8] = [
                "-map".into(),
                "0:a:0".into(),
                "-c:a".into(),
                "aac".into(),
                "-ac".into(),
                "2".into(),
                "-b:a".into(),
                request.variation.audio_bitrate.to_string().into(),
            ];
            args.extend(audio);
        }

        let output: [OsString; 15] = [
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            segment.into(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_type".into(),
            "mpegts".into(),
            "-start_number".into(),
            request.start_segment.to_string().into(),
            "-output_ts_offset".into(),
            start_time.into(),
            "-hls_segment_filename".into(),
            request
                .output_dir
                .join(segment_pattern(request.variation_index))
                .into(),
            // ffmpeg's own playlist, kept apart from the manifests we serve
            request
                .output_dir
                .join(format!("encoder_v{}.m3u8", request.variation_index))
                .into(),
        ];
        args.extend(output);
        args
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn start(
        &self,
        request: EncodeRequest,
        completions: CompletionSender,
    ) -> Result<Box<dyn EncoderJob>, EncoderError> {
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(EncoderError::Spawn)?;

        let mut child = Command::new(&self.binary)
            .args(Self::args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncoderError::Spawn)?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncoderError::Rejected("encoder stderr not captured".to_string()))?;

        tracing::debug!(
            source = %request.source.display(),
            segment = request.start_segment,
            variation = request.variation_index,
            pid = child.id(),
            "Spawned ffmpeg"
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(child, stderr, completions, cancel.clone()));

        Ok(Box::new(FfmpegJob {
            cancel,
            task: Some(task),
        }))
    }

    fn codecs(&self, has_audio: bool) -> Option<String> {
        // High profile, level 4.0, as forced in `args`
        Some(if has_audio {
            "avc1.640028,mp4a.40.2".to_string()
        } else {
            "avc1.640028".to_string()
        })
    }
}

pub struct FfmpegJob {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), EncoderError>>>,
}

#[async_trait]
impl EncoderJob for FfmpegJob {
    async fn stop(&mut self) -> Result<(), EncoderError> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| EncoderError::Stop(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Follow the muxer log, report finished segments, kill the process on cancel.
async fn supervise(
    mut child: Child,
    stderr: ChildStderr,
    completions: CompletionSender,
    cancel: CancellationToken,
) -> Result<(), EncoderError> {
    let mut lines = BufReader::new(stderr).lines();
    let mut in_progress: Option<SegmentAddress> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return kill(&mut child).await,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(opened) = opened_segment(&line) {
                        if let Some(done) = in_progress.replace(opened) {
                            let _ = completions.send(done);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Lost ffmpeg log stream");
                    break;
                }
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => return kill(&mut child).await,
        status = child.wait() => status,
    };

    match status {
        Ok(status) if status.success() => {
            if let Some(done) = in_progress {
                let _ = completions.send(done);
            }
            tracing::debug!("ffmpeg finished");
        }
        Ok(status) => tracing::warn!(%status, "ffmpeg exited with failure"),
        Err(e) => tracing::warn!(error = %e, "Failed to wait for ffmpeg"),
    }
    Ok(())
}

async fn kill(child: &mut Child) -> Result<(), EncoderError> {
    match child.kill().await {
        Ok(()) => Ok(()),
        // Already reaped
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(EncoderError::Stop(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ladder::QualityVariation;
    use tokio::sync::mpsc;

    fn request(start_segment: u64, has_audio: bool) -> EncodeRequest {
        EncodeRequest {
            source: PathBuf::from("/media/movie.mp4"),
            output_dir: PathBuf::from("/streams/movie"),
            start_segment,
            variation_index: 1,
            variation: QualityVariation {
                video_bitrate: 1_400_000,
                audio_bitrate: 128_000,
                width: 854,
                height: 480,
            },
            segment_duration: 3.0,
            has_audio,
        }
    }

    fn args_of(request: &EncodeRequest) -> Vec<String> {
        FfmpegEncoder::args(request)
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1).cloned())
    }

    #[test]
    fn test_args_position_the_job() {
        let args = args_of(&request(20, true));

        assert_eq!(value_after(&args, "-ss").as_deref(), Some("60.000"));
        assert_eq!(value_after(&args, "-output_ts_offset").as_deref(), Some("60.000"));
        assert_eq!(value_after(&args, "-start_number").as_deref(), Some("20"));
        assert_eq!(value_after(&args, "-hls_time").as_deref(), Some("3"));
        assert_eq!(value_after(&args, "-i").as_deref(), Some("/media/movie.mp4"));
        assert_eq!(
            value_after(&args, "-hls_segment_filename").as_deref(),
            Some("/streams/movie/seg_v1_%05d.ts")
        );
        assert_eq!(args.last().map(String::as_str), Some("/streams/movie/encoder_v1.m3u8"));
    }

    #[test]
    fn test_args_apply_variation() {
        let args = args_of(&request(0, true));

        assert_eq!(value_after(&args, "-b:v").as_deref(), Some("1400000"));
        assert_eq!(value_after(&args, "-vf").as_deref(), Some("scale=854:480"));
        assert_eq!(value_after(&args, "-b:a").as_deref(), Some("128000"));
        assert_eq!(
            value_after(&args, "-force_key_frames").as_deref(),
            Some("expr:gte(t,n_forced*3)")
        );
    }

    #[test]
    fn test_args_skip_audio_for_silent_sources() {
        let args = args_of(&request(0, false));
        assert!(!args.iter().any(|arg| arg == "-c:a"));
        assert!(!args.iter().any(|arg| arg == "0:a:0"));
    }

    #[test]
    fn test_opened_segment() {
        let line = "[hls @ 0x55d5c6c4a2c0] Opening '/streams/movie/seg_v1_00021.ts' for writing";
        assert_eq!(opened_segment(line), Some(SegmentAddress::new(21, 1)));

        let playlist = "[hls @ 0x55d5c6c4a2c0] Opening '/streams/movie/encoder_v1.m3u8.tmp' for writing";
        assert_eq!(opened_segment(playlist), None);

        assert_eq!(opened_segment("frame=  120 fps= 60 q=28.0 size=N/A"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(0, false);
        req.output_dir = dir.path().join("movie");

        let (tx, _rx) = mpsc::unbounded_channel();
        let encoder = FfmpegEncoder::new("/nonexistent/ffmpeg");
        let result = encoder.start(req, tx).await;
        assert!(matches!(result, Err(EncoderError::Spawn(_))));
    }
}
