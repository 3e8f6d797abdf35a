use crate::domain::media::MediaInfo;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run prober: {0}")]
    Io(#[from] std::io::Error),

    #[error("prober exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unreadable probe output: {0}")]
    Parse(String),

    #[error("no video stream in source")]
    NoVideo,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Inspect a source file
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}
