use crate::domain::addressing::SegmentAddress;
use crate::domain::ladder::QualityVariation;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Channel on which a running job reports each segment it has finished writing.
pub type CompletionSender = mpsc::UnboundedSender<SegmentAddress>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<SegmentAddress>;

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to stop encoder: {0}")]
    Stop(String),

    #[error("encoder rejected request: {0}")]
    Rejected(String),
}

/// Everything an encoder needs to produce segments from `start_segment` onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub start_segment: u64,
    pub variation_index: usize,
    pub variation: QualityVariation,
    pub segment_duration: f64,
    pub has_audio: bool,
}

impl EncodeRequest {
    /// Source position, in seconds, of the first segment
    pub fn start_time(&self) -> f64 {
        self.start_segment as f64 * self.segment_duration
    }
}

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Start a continuous producer writing addressed segments into `request.output_dir`.
    async fn start(
        &self,
        request: EncodeRequest,
        completions: CompletionSender,
    ) -> Result<Box<dyn EncoderJob>, EncoderError>;

    /// `CODECS` attribute for the master manifest, when known
    fn codecs(&self, _has_audio: bool) -> Option<String> {
        None
    }
}

/// Handle to a running encode. Dropping it must not leave the producer running.
#[async_trait]
pub trait EncoderJob: Send {
    /// Stop producing; no completions are reported once this returns.
    async fn stop(&mut self) -> Result<(), EncoderError>;
}
