//! Vodstream - On-demand adaptive HLS server
//!
//! Hexagonal Architecture:
//! - domain/: Pure streaming logic (addressing, ladder, media info, playlists)
//! - ports/: Trait definitions for the prober, ladder builder and encoder
//! - adapters/: Concrete implementations (ffmpeg/ffprobe, HTTP)
//! - application/: Sessions, registry, dispatcher and stream opener
//! - config: Environment configuration
//!
//! # Features
//! - `native-probe`: probe sources with libav (ffmpeg-next) instead of the ffprobe binary

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::{Dispatcher, SessionRegistry, StreamOpener, StreamSession};
pub use config::{ServerConfig, SessionConfig};
