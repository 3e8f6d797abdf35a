//! Domain layer - Pure streaming logic.

pub mod addressing;
pub mod hls;
pub mod ladder;
pub mod media;
