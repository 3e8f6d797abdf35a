//! Configuration loaded from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tuning knobs shared by every streaming session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Fixed duration of every segment, in seconds
    pub segment_duration: f64,
    /// Distance between a requested segment and the playback marker that moves the marker
    pub look_ahead_window: u64,
    /// How far past the encode frontier a request may land before the encoder is repositioned
    pub seek_restart_distance: u64,
    /// Upper bound on the wait for a segment after a quality switch
    pub segment_wait: Duration,
    /// Interval between disk checks while waiting for a segment
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            segment_duration: 3.0,
            look_ahead_window: 10,
            seek_restart_distance: 10,
            segment_wait: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Configuration for the HTTP server binary.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Root directory holding the source media
    pub media_path: PathBuf,
    /// Root directory under which each session gets its own output directory
    pub stream_dir: PathBuf,
    /// ffmpeg binary used by the encoder
    pub ffmpeg_path: PathBuf,
    /// ffprobe binary used by the prober
    pub ffprobe_path: PathBuf,
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = SessionConfig::default();
        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            media_path: PathBuf::from(
                env::var("MEDIA_PATH").unwrap_or_else(|_| String::from("./media")),
            ),
            stream_dir: PathBuf::from(
                env::var("STREAM_DIR").unwrap_or_else(|_| String::from("./streams")),
            ),
            ffmpeg_path: PathBuf::from(
                env::var("FFMPEG_PATH").unwrap_or_else(|_| String::from("ffmpeg")),
            ),
            ffprobe_path: PathBuf::from(
                env::var("FFPROBE_PATH").unwrap_or_else(|_| String::from("ffprobe")),
            ),
            session: SessionConfig {
                segment_duration: parse_var("SEGMENT_DURATION")
                    .filter(|d: &f64| *d > 0.0)
                    .unwrap_or(defaults.segment_duration),
                look_ahead_window: parse_var("LOOK_AHEAD_WINDOW")
                    .filter(|w: &u64| *w > 0)
                    .unwrap_or(defaults.look_ahead_window),
                seek_restart_distance: parse_var("SEEK_RESTART_DISTANCE")
                    .unwrap_or(defaults.seek_restart_distance),
                segment_wait: parse_var("SEGMENT_WAIT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.segment_wait),
                poll_interval: parse_var("SEGMENT_POLL_MS")
                    .filter(|ms: &u64| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll_interval),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.look_ahead_window, 10);
        assert_eq!(config.seek_restart_distance, 10);
        assert_eq!(config.segment_duration, 3.0);
        assert_eq!(config.segment_wait, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("VODSTREAM_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_var::<u64>("VODSTREAM_TEST_GARBAGE"), None);

        env::set_var("VODSTREAM_TEST_NUMBER", " 42 ");
        assert_eq!(parse_var::<u64>("VODSTREAM_TEST_NUMBER"), Some(42));

        assert_eq!(parse_var::<u64>("VODSTREAM_TEST_UNSET"), None);
    }

    #[test]
    fn test_bind_address() {
        let config = ServerConfig {
            addr: "0.0.0.0".to_string(),
            port: "8080".to_string(),
            media_path: PathBuf::from("media"),
            stream_dir: PathBuf::from("streams"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            session: SessionConfig::default(),
        };
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }
}
