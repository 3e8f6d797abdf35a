//! Vodstream server - wires the ffmpeg adapters, the session layer and the HTTP router.

use std::sync::Arc;
use vodstream::adapters::ffmpeg::FfmpegEncoder;
use vodstream::adapters::http::{router, AppState};
use vodstream::application::{Dispatcher, SessionRegistry, StreamOpener};
use vodstream::config::ServerConfig;
use vodstream::domain::ladder::StandardLadder;
use vodstream::ports::prober::Prober;

#[cfg(not(feature = "native-probe"))]
fn prober(config: &ServerConfig) -> Arc<dyn Prober> {
    Arc::new(vodstream::adapters::ffmpeg::FfprobeProber::new(&config.ffprobe_path))
}

#[cfg(feature = "native-probe")]
fn prober(_config: &ServerConfig) -> Arc<dyn Prober> {
    Arc::new(vodstream::adapters::ffmpeg::NativeProber)
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt::init();

    if let Err(e) = tokio::fs::create_dir_all(&config.stream_dir).await {
        tracing::error!(path = %config.stream_dir.display(), error = %e, "Failed to create stream directory");
        std::process::exit(1);
    }

    // 1. Adapters
    let encoder = Arc::new(FfmpegEncoder::new(&config.ffmpeg_path));
    let ladder = Arc::new(StandardLadder::new(config.session.segment_duration));

    // 2. Application services
    let registry = Arc::new(SessionRegistry::new());
    let opener = StreamOpener::new(
        registry.clone(),
        prober(&config),
        ladder,
        encoder,
        config.media_path.clone(),
        config.stream_dir.clone(),
        config.session.clone(),
    );
    let dispatcher = Dispatcher::new(registry);

    // 3. HTTP layer
    let app = router(AppState {
        opener: Arc::new(opener),
        dispatcher: Arc::new(dispatcher),
    });

    // 4. Start server
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!(
        address = %config.bind_address(),
        media = %config.media_path.display(),
        streams = %config.stream_dir.display(),
        "Listening"
    );
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
