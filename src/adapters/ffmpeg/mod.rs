//! ffmpeg/ffprobe adapters.

pub mod encoder;
#[cfg(feature = "native-probe")]
pub mod native;
pub mod probe;

pub use encoder::FfmpegEncoder;
#[cfg(feature = "native-probe")]
pub use native::NativeProber;
pub use probe::FfprobeProber;
