use crate::domain::ladder::QualityLadder;
use crate::domain::media::MediaInfo;

#[cfg_attr(test, mockall::automock)]
pub trait LadderBuilder: Send + Sync {
    /// Renditions to offer for a probed source, lowest first
    fn build(&self, info: &MediaInfo) -> QualityLadder;
}
