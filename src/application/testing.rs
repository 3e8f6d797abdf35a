//! Test doubles shared by the application tests.

use crate::domain::addressing::SegmentAddress;
use crate::domain::ladder::{QualityLadder, QualityVariation};
use crate::domain::media::MediaInfo;
use crate::ports::encoder::{CompletionSender, EncodeRequest, Encoder, EncoderError, EncoderJob};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn media(duration: f64) -> MediaInfo {
    MediaInfo {
        duration,
        width: 1920,
        height: 1080,
        bit_rate: Some(6_000_000),
        video_codec: Some("h264".to_string()),
        audio_codec: Some("aac".to_string()),
    }
}

pub fn ladder(variations: usize) -> QualityLadder {
    QualityLadder {
        variations: (0..variations)
            .map(|index| QualityVariation {
                video_bitrate: 800_000 * (index as u64 + 1),
                audio_bitrate: 128_000,
                width: 640 * (index as u32 + 1),
                height: 360 * (index as u32 + 1),
            })
            .collect(),
        segment_duration: 3.0,
    }
}

#[derive(Default)]
struct FakeState {
    starts: Mutex<Vec<EncodeRequest>>,
    current: Mutex<Option<CompletionSender>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    stops: AtomicUsize,
    fail_next_start: AtomicBool,
    complete_on_start: AtomicBool,
    stop_delay: Mutex<Duration>,
}

/// Encoder that records what it was asked to do and reports completions on demand.
#[derive(Clone, Default)]
pub struct FakeEncoder {
    state: Arc<FakeState>,
}

impl FakeEncoder {
    pub fn starts(&self) -> Vec<EncodeRequest> {
        self.state.starts.lock().clone()
    }

    pub fn running(&self) -> usize {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.state.max_running.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn fail_next_start(&self) {
        self.state.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Report the first segment of every new job as soon as it starts.
    pub fn complete_on_start(&self) {
        self.state.complete_on_start.store(true, Ordering::SeqCst);
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        *self.state.stop_delay.lock() = delay;
    }

    /// Running job stops reporting without being asked to, as a crashed process would.
    pub fn crash(&self) {
        self.state.current.lock().take();
    }

    /// Report a finished segment from the running job, if any.
    pub fn complete(&self, address: SegmentAddress) {
        if let Some(sender) = self.state.current.lock().as_ref() {
            let _ = sender.send(address);
        }
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn start(
        &self,
        request: EncodeRequest,
        completions: CompletionSender,
    ) -> Result<Box<dyn EncoderJob>, EncoderError> {
        if self.state.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(EncoderError::Rejected("scripted failure".to_string()));
        }

        if self.state.complete_on_start.load(Ordering::SeqCst) {
            let _ = completions.send(SegmentAddress::new(
                request.start_segment,
                request.variation_index,
            ));
        }

        self.state.starts.lock().push(request);
        *self.state.current.lock() = Some(completions);
        let running = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_running.fetch_max(running, Ordering::SeqCst);

        Ok(Box::new(FakeJob {
            state: self.state.clone(),
            stopped: false,
        }))
    }

    fn codecs(&self, has_audio: bool) -> Option<String> {
        Some(if has_audio { "avc1.640028,mp4a.40.2" } else { "avc1.640028" }.to_string())
    }
}

struct FakeJob {
    state: Arc<FakeState>,
    stopped: bool,
}

impl FakeJob {
    fn halt(&mut self) {
        if !self.stopped {
            self.stopped = true;
            *self.state.current.lock() = None;
            self.state.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl EncoderJob for FakeJob {
    async fn stop(&mut self) -> Result<(), EncoderError> {
        let delay = *self.state.stop_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.halt();
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeJob {
    fn drop(&mut self) {
        self.halt();
    }
}
