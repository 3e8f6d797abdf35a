//! Per-request decision: serve, wait then serve, restart, or fail.

use super::registry::SessionRegistry;
use super::session::{SessionError, StreamSession};
use crate::domain::addressing::{is_plain_file_name, RequestedFile, SegmentAddress};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("unsupported file {0}")]
    UnsupportedFile(String),

    #[error("manifest {0} does not exist")]
    ManifestMissing(String),

    #[error("segment {0} is not available yet")]
    SegmentNotFound(String),

    #[error("segment {0} still not produced after quality switch")]
    SwitchTimedOut(String),

    #[error("failed to restart encoder: {0}")]
    RestartFailed(#[source] SessionError),
}

/// A file ready to be transmitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedFile {
    pub path: PathBuf,
    pub kind: RequestedFile,
}

pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve `/<session>/<file>` to a file on disk.
    ///
    /// A segment at a variation other than the one being encoded is a quality
    /// switch: the encoder is restarted there and the request waits a bounded time
    /// for it. An ordinary miss never waits; the client is expected to retry.
    pub async fn dispatch(
        &self,
        session_name: &str,
        file_name: &str,
    ) -> Result<ServedFile, DispatchError> {
        let session = self.registry.get(session_name).ok_or_else(|| {
            tracing::error!(session = session_name, "Invalid session");
            DispatchError::UnknownSession(session_name.to_string())
        })?;

        let kind = RequestedFile::classify(file_name)
            .filter(|_| is_plain_file_name(file_name))
            .ok_or_else(|| {
                tracing::error!(session = session_name, file = file_name, "Invalid file");
                DispatchError::UnsupportedFile(file_name.to_string())
            })?;
        let path = session.file_path(file_name);

        let address = match kind {
            RequestedFile::Segment => Some(self.prepare_segment(&session, file_name).await?),
            RequestedFile::Manifest => {
                tracing::debug!(session = session_name, file = file_name, "Fetching playlist");
                None
            }
        };

        let ready = address
            .map(|a| session.is_segment_ready(a.segment, a.variation))
            .unwrap_or(false);
        let exists = ready || tokio::fs::try_exists(&path).await.unwrap_or(false);

        if !exists {
            return match address {
                None => {
                    tracing::error!(path = %path.display(), "Playlist does not exist");
                    Err(DispatchError::ManifestMissing(file_name.to_string()))
                }
                Some(address) => self.segment_missing(&session, address, file_name).await,
            };
        }

        if let Some(address) = address {
            session.record_fetched(address.segment);
        }
        Ok(ServedFile { path, kind })
    }

    /// Parse the segment address, follow a quality switch and move the playback marker.
    async fn prepare_segment(
        &self,
        session: &StreamSession,
        file_name: &str,
    ) -> Result<SegmentAddress, DispatchError> {
        let address = SegmentAddress::parse(file_name)
            .filter(|a| a.variation < session.ladder().len())
            .ok_or_else(|| {
                tracing::error!(session = session.name(), file = file_name, "Invalid segment name");
                DispatchError::UnsupportedFile(file_name.to_string())
            })?;

        let active = session.active_variation();
        if address.variation != active {
            if address.segment >= session.total_segments() {
                tracing::warn!(
                    session = session.name(),
                    segment = address.segment,
                    "Quality switch past the end of the source"
                );
                return Err(DispatchError::SegmentNotFound(file_name.to_string()));
            }
            tracing::info!(
                session = session.name(),
                segment = address.segment,
                from = active,
                to = address.variation,
                "Quality changed"
            );
            session
                .restart(address.segment, Some(address.variation))
                .await
                .map_err(DispatchError::RestartFailed)?;

            let path = session.segment_path(address);
            let wait = session.config().segment_wait;
            if !session.await_segment(address.segment, &path, wait).await {
                tracing::warn!(
                    session = session.name(),
                    segment = address.segment,
                    "Segment still not loaded after quality switch"
                );
                return Err(DispatchError::SwitchTimedOut(file_name.to_string()));
            }
        }

        tracing::debug!(session = session.name(), segment = address.segment, "Fetching segment");
        session.advance_playback_marker(address.segment);
        Ok(address)
    }

    async fn segment_missing(
        &self,
        session: &StreamSession,
        address: SegmentAddress,
        file_name: &str,
    ) -> Result<ServedFile, DispatchError> {
        tracing::debug!(
            session = session.name(),
            segment = address.segment,
            frontier = session.encode_frontier(),
            "Segment does not exist"
        );

        if session.should_restart_for_seek(address.segment) {
            tracing::info!(
                session = session.name(),
                segment = address.segment,
                "Seek beyond encoder, restarting"
            );
            session
                .restart(address.segment, None)
                .await
                .map_err(DispatchError::RestartFailed)?;
        }

        Err(DispatchError::SegmentNotFound(file_name.to_string()))
    }
}
