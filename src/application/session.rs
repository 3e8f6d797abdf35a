//! Streaming session: one source, one encoder, many segment requests.
//!
//! Mutable state lives in two places:
//! - `Progress` (sync mutex, never held across `.await`): active variation, encode
//!   frontier, playback marker and the completed-segment index.
//! - `EncoderSlot` (async mutex): the running job. Holding it is the restart critical
//!   section, so two restarts on the same session never race.

use crate::config::SessionConfig;
use crate::domain::addressing::{variant_manifest_name, SegmentAddress, MASTER_MANIFEST};
use crate::domain::hls::{MasterPlaylist, MediaPlaylist};
use crate::domain::ladder::QualityLadder;
use crate::domain::media::MediaInfo;
use crate::ports::encoder::{
    CompletionReceiver, EncodeRequest, Encoder, EncoderError, EncoderJob,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to write manifests: {0}")]
    Manifest(#[from] std::io::Error),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("variation {0} is not part of the quality ladder")]
    UnknownVariation(usize),

    #[error("source is too short to produce any segment")]
    Empty,
}

/// Inputs to [`StreamSession::create`].
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub name: String,
    pub source_path: PathBuf,
    pub stream_directory: PathBuf,
    pub media: MediaInfo,
    pub ladder: QualityLadder,
    pub config: SessionConfig,
}

/// Point-in-time copy of a session's mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub active_variation: usize,
    pub encode_frontier: u64,
    pub job_start: u64,
    pub playback_marker: u64,
    pub completed: usize,
    pub last_fetched: Option<u64>,
    pub fetched: u64,
}

#[derive(Debug, Default)]
struct PlaybackState {
    active_variation: usize,
    /// Next segment the running job is expected to finish
    encode_frontier: u64,
    job_start: u64,
    /// False once the job is gone without reaching the end of the source
    job_live: bool,
    playback_marker: u64,
    completed: HashSet<SegmentAddress>,
    last_fetched: Option<u64>,
    fetched: u64,
}

impl PlaybackState {
    /// Skip the frontier past segments of the active variation that already exist.
    fn settle_frontier(&mut self) {
        while self
            .completed
            .contains(&SegmentAddress::new(self.encode_frontier, self.active_variation))
        {
            self.encode_frontier += 1;
        }
    }
}

/// State shared with the completion observer of the running job.
struct Progress {
    state: Mutex<PlaybackState>,
    changes: watch::Sender<u64>,
    total_segments: u64,
}

impl Progress {
    fn new(total_segments: u64) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(PlaybackState::default()),
            changes,
            total_segments,
        }
    }

    fn mark_completed(&self, address: SegmentAddress) {
        {
            let mut state = self.state.lock();
            state.completed.insert(address);
            if address.variation == state.active_variation {
                state.settle_frontier();
            }
        }
        self.bump();
    }

    /// Point the state at a freshly started job.
    fn begin_job(&self, start_segment: u64, variation: usize) {
        {
            let mut state = self.state.lock();
            state.active_variation = variation;
            state.encode_frontier = start_segment;
            state.job_start = start_segment;
            state.job_live = true;
            state.settle_frontier();
        }
        self.bump();
    }

    /// The running job stopped reporting. Unless it got through the whole source it
    /// died early and the next miss has to start a new one.
    fn mark_job_ended(&self) {
        let mut state = self.state.lock();
        if state.encode_frontier < self.total_segments {
            tracing::warn!(
                frontier = state.encode_frontier,
                variation = state.active_variation,
                "Encoder ended before the end of the source"
            );
            state.job_live = false;
        }
    }

    /// Wake everyone waiting on a segment so they re-check.
    fn bump(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

struct RunningJob {
    job: Box<dyn EncoderJob>,
    observer: JoinHandle<()>,
}

/// Owns the one encoder job of a session.
///
/// [`EncoderSlot::replace`] is the only way to install a job and it releases the
/// previous one (observer first, then the job itself) before starting the next.
#[derive(Default)]
pub struct EncoderSlot {
    running: Option<RunningJob>,
}

impl EncoderSlot {
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    async fn release(&mut self) -> Result<(), EncoderError> {
        if let Some(mut running) = self.running.take() {
            running.observer.abort();
            // Wait for the abort to land so no completion sneaks in afterwards
            let _ = (&mut running.observer).await;
            running.job.stop().await?;
        }
        Ok(())
    }

    async fn replace(
        &mut self,
        encoder: &dyn Encoder,
        request: EncodeRequest,
        progress: Arc<Progress>,
    ) -> Result<(), EncoderError> {
        self.release().await?;

        let (start_segment, variation) = (request.start_segment, request.variation_index);
        let (completions, receiver) = mpsc::unbounded_channel();
        let job = encoder.start(request, completions).await?;
        // Committed before the observer runs, so an early exit is not overwritten
        progress.begin_job(start_segment, variation);
        let observer = tokio::spawn(observe_completions(receiver, progress));
        self.running = Some(RunningJob { job, observer });
        Ok(())
    }
}

async fn observe_completions(mut receiver: CompletionReceiver, progress: Arc<Progress>) {
    while let Some(address) = receiver.recv().await {
        tracing::trace!(
            segment = address.segment,
            variation = address.variation,
            "Segment completed"
        );
        progress.mark_completed(address);
    }
    progress.mark_job_ended();
}

pub struct StreamSession {
    name: String,
    source_path: PathBuf,
    stream_directory: PathBuf,
    media: MediaInfo,
    ladder: QualityLadder,
    total_segments: u64,
    config: SessionConfig,
    encoder: Arc<dyn Encoder>,
    progress: Arc<Progress>,
    slot: tokio::sync::Mutex<EncoderSlot>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("stream_directory", &self.stream_directory)
            .field("total_segments", &self.total_segments)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Write the manifests and start encoding from segment 0 at the lowest quality.
    pub async fn create(
        params: SessionParams,
        encoder: Arc<dyn Encoder>,
    ) -> Result<Arc<Self>, SessionError> {
        if params.ladder.is_empty() {
            return Err(SessionError::UnknownVariation(QualityLadder::DEFAULT_VARIATION));
        }
        let total_segments = params.media.segment_count(params.ladder.segment_duration);
        if total_segments == 0 {
            return Err(SessionError::Empty);
        }

        let session = Arc::new(Self {
            name: params.name,
            source_path: params.source_path,
            stream_directory: params.stream_directory,
            media: params.media,
            ladder: params.ladder,
            total_segments,
            config: params.config,
            encoder,
            progress: Arc::new(Progress::new(total_segments)),
            slot: tokio::sync::Mutex::new(EncoderSlot::default()),
        });

        session.write_manifests().await?;
        session
            .restart(0, Some(QualityLadder::DEFAULT_VARIATION))
            .await?;

        tracing::info!(
            session = %session.name,
            source = %session.source_path.display(),
            total_segments,
            variations = session.ladder.len(),
            "Stream session created"
        );
        Ok(session)
    }

    async fn write_manifests(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.stream_directory).await?;

        let codecs = self.encoder.codecs(self.media.has_audio());
        MasterPlaylist::from_ladder(&self.ladder, codecs.as_deref())
            .write_to(&self.master_manifest_path())
            .await?;

        for variation in 0..self.ladder.len() {
            MediaPlaylist::for_variation(
                variation,
                self.total_segments,
                self.ladder.segment_duration,
                self.media.duration,
            )
            .write_to(&self.stream_directory.join(variant_manifest_name(variation)))
            .await?;
        }
        Ok(())
    }

    /// Reposition the encoder at `at_segment`, switching to `variation` when given.
    ///
    /// Restarts on one session are serialized. A restart that finds the requested
    /// variation already running and the segment within reach of it is a no-op.
    pub async fn restart(
        &self,
        at_segment: u64,
        variation: Option<usize>,
    ) -> Result<(), SessionError> {
        let mut slot = self.slot.lock().await;

        let variation = variation.unwrap_or_else(|| self.active_variation());
        let quality = self
            .ladder
            .get(variation)
            .cloned()
            .ok_or(SessionError::UnknownVariation(variation))?;

        if slot.is_running()
            && variation == self.active_variation()
            && !self.should_restart_for_seek(at_segment)
        {
            tracing::debug!(
                session = %self.name,
                segment = at_segment,
                variation,
                "Restart already satisfied by running encoder"
            );
            return Ok(());
        }

        let request = EncodeRequest {
            source: self.source_path.clone(),
            output_dir: self.stream_directory.clone(),
            start_segment: at_segment,
            variation_index: variation,
            variation: quality,
            segment_duration: self.ladder.segment_duration,
            has_audio: self.media.has_audio(),
        };

        if let Err(e) = slot
            .replace(self.encoder.as_ref(), request, self.progress.clone())
            .await
        {
            tracing::error!(
                session = %self.name,
                segment = at_segment,
                variation,
                error = %e,
                "Encoder restart failed"
            );
            // The previous job is already released
            self.progress.state.lock().job_live = false;
            return Err(e.into());
        }

        tracing::info!(
            session = %self.name,
            segment = at_segment,
            variation,
            "Encoder started"
        );
        Ok(())
    }

    /// In-memory check against the completed-segment index.
    pub fn is_segment_ready(&self, segment: u64, variation: usize) -> bool {
        self.progress
            .state
            .lock()
            .completed
            .contains(&SegmentAddress::new(segment, variation))
    }

    /// Wait until `segment` of the active variation is complete or `path` exists.
    ///
    /// Holds no session lock while waiting and never signals the encoder.
    pub async fn await_segment(&self, segment: u64, path: &Path, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut changes = self.progress.changes.subscribe();

        loop {
            if self.is_segment_ready(segment, self.active_variation())
                || tokio::fs::try_exists(path).await.unwrap_or(false)
            {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let nap = self.config.poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(nap, changes.changed()).await;
        }
    }

    /// True when the running job will not reach `segment` soon on its own: there is
    /// no live job, the segment is behind where the job started, or it is too far
    /// past the frontier.
    pub fn should_restart_for_seek(&self, segment: u64) -> bool {
        if segment >= self.total_segments {
            return false;
        }
        let state = self.progress.state.lock();
        !state.job_live
            || segment < state.job_start
            || segment > state.encode_frontier + self.config.seek_restart_distance
    }

    /// Move the playback marker one step when `segment` is exactly one window ahead of it.
    pub fn advance_playback_marker(&self, segment: u64) {
        let mut state = self.progress.state.lock();
        if segment.checked_sub(state.playback_marker) == Some(self.config.look_ahead_window) {
            state.playback_marker += 1;
        }
    }

    pub fn record_fetched(&self, segment: u64) {
        let mut state = self.progress.state.lock();
        state.last_fetched = Some(state.last_fetched.map_or(segment, |last| last.max(segment)));
        state.fetched += 1;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.progress.state.lock();
        SessionSnapshot {
            active_variation: state.active_variation,
            encode_frontier: state.encode_frontier,
            job_start: state.job_start,
            playback_marker: state.playback_marker,
            completed: state.completed.len(),
            last_fetched: state.last_fetched,
            fetched: state.fetched,
        }
    }

    pub fn active_variation(&self) -> usize {
        self.progress.state.lock().active_variation
    }

    pub fn encode_frontier(&self) -> u64 {
        self.progress.state.lock().encode_frontier
    }

    pub fn playback_marker(&self) -> u64 {
        self.progress.state.lock().playback_marker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_directory(&self) -> &Path {
        &self.stream_directory
    }

    pub fn ladder(&self) -> &QualityLadder {
        &self.ladder
    }

    pub fn total_segments(&self) -> u64 {
        self.total_segments
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn master_manifest_path(&self) -> PathBuf {
        self.stream_directory.join(MASTER_MANIFEST)
    }

    /// Location of a request-supplied file name inside the session directory.
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.stream_directory.join(file_name)
    }

    pub fn segment_path(&self, address: SegmentAddress) -> PathBuf {
        self.stream_directory.join(address.file_name())
    }
}
