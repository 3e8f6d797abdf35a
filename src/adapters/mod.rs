//! Adapters - Concrete implementations of ports and the HTTP surface.

pub mod ffmpeg;
pub mod http;
