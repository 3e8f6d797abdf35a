use super::registry::SessionRegistry;
use super::session::{SessionError, SessionParams, StreamSession};
use crate::config::SessionConfig;
use crate::domain::addressing::{is_plain_file_name, path_is_valid, slugify};
use crate::ports::encoder::Encoder;
use crate::ports::ladder::LadderBuilder;
use crate::ports::prober::{ProbeError, Prober};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("invalid stream request: {0}")]
    InvalidRequest(String),

    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("failed to probe source: {0}")]
    Probe(#[from] ProbeError),

    #[error("failed to start session: {0}")]
    Startup(#[from] SessionError),
}

/// Opens streams: the only place sessions are created.
pub struct StreamOpener {
    registry: Arc<SessionRegistry>,
    prober: Arc<dyn Prober>,
    ladder: Arc<dyn LadderBuilder>,
    encoder: Arc<dyn Encoder>,
    media_root: PathBuf,
    stream_root: PathBuf,
    config: SessionConfig,
}

impl StreamOpener {
    pub fn new(
        registry: Arc<SessionRegistry>,
        prober: Arc<dyn Prober>,
        ladder: Arc<dyn LadderBuilder>,
        encoder: Arc<dyn Encoder>,
        media_root: PathBuf,
        stream_root: PathBuf,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            prober,
            ladder,
            encoder,
            media_root,
            stream_root,
            config,
        }
    }

    /// Attach to the session called `name` (default: slug of the file stem), creating
    /// it from `file` under the media root if it does not exist yet.
    pub async fn open(
        &self,
        file: &str,
        name: Option<&str>,
    ) -> Result<Arc<StreamSession>, OpenError> {
        if !path_is_valid(Path::new(file)) {
            return Err(OpenError::InvalidRequest(format!("invalid file {file:?}")));
        }
        let name = session_name(file, name)?;

        if let Some(session) = self.registry.get(&name) {
            tracing::debug!(session = %name, "Attaching to existing session");
            return Ok(session);
        }

        self.registry
            .get_or_create(&name, || self.create(file, &name))
            .await
    }

    async fn create(&self, file: &str, name: &str) -> Result<Arc<StreamSession>, OpenError> {
        let source_path = self.media_root.join(file);
        if !tokio::fs::try_exists(&source_path).await.unwrap_or(false) {
            tracing::warn!(path = %source_path.display(), "File not found");
            return Err(OpenError::SourceNotFound(source_path));
        }

        let media = self.prober.probe(&source_path).await.map_err(|e| {
            tracing::error!(path = %source_path.display(), error = %e, "Did not probe successfully");
            e
        })?;
        let ladder = self.ladder.build(&media);

        let params = SessionParams {
            name: name.to_string(),
            stream_directory: self.stream_root.join(name),
            source_path,
            media,
            ladder,
            config: self.config.clone(),
        };
        Ok(StreamSession::create(params, self.encoder.clone()).await?)
    }
}

fn session_name(file: &str, name: Option<&str>) -> Result<String, OpenError> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if is_plain_file_name(name) => Ok(name.to_string()),
        Some(name) => Err(OpenError::InvalidRequest(format!("invalid session name {name:?}"))),
        None => {
            let stem = Path::new(file)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default();
            let slug = slugify(stem);
            if slug.is_empty() {
                Err(OpenError::InvalidRequest(format!(
                    "cannot derive a session name from {file:?}"
                )))
            } else {
                Ok(slug)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{ladder, media, FakeEncoder};
    use crate::domain::ladder::StandardLadder;
    use crate::ports::ladder::MockLadderBuilder;
    use crate::ports::prober::MockProber;

    struct Fixture {
        dir: tempfile::TempDir,
        registry: Arc<SessionRegistry>,
        encoder: FakeEncoder,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("media")).unwrap();
            std::fs::write(dir.path().join("media/movie.mp4"), b"not really a movie").unwrap();
            Self {
                dir,
                registry: Arc::new(SessionRegistry::new()),
                encoder: FakeEncoder::default(),
            }
        }

        fn opener(&self, prober: MockProber, ladder: Arc<dyn LadderBuilder>) -> StreamOpener {
            StreamOpener::new(
                self.registry.clone(),
                Arc::new(prober),
                ladder,
                Arc::new(self.encoder.clone()),
                self.dir.path().join("media"),
                self.dir.path().join("streams"),
                SessionConfig::default(),
            )
        }
    }

    fn probing(duration: f64) -> MockProber {
        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .times(1)
            .returning(move |_| Ok(media(duration)));
        prober
    }

    #[test]
    fn test_session_name_defaults_to_slug() {
        assert_eq!(session_name("Big Movie.mp4", None).unwrap(), "big-movie");
        assert_eq!(session_name("shows/Pilot.mkv", Some("  ")).unwrap(), "pilot");
        assert_eq!(session_name("movie.mp4", Some("custom")).unwrap(), "custom");
        assert!(session_name("movie.mp4", Some("a/b")).is_err());
        assert!(session_name("!!!.mp4", None).is_err());
    }

    #[tokio::test]
    async fn test_open_creates_session_with_manifest() {
        let f = Fixture::new();
        let opener = f.opener(probing(30.0), Arc::new(StandardLadder::new(3.0)));

        let session = opener.open("movie.mp4", None).await.unwrap();

        assert_eq!(session.name(), "movie");
        assert_eq!(session.total_segments(), 10);
        let master = std::fs::read_to_string(session.master_manifest_path()).unwrap();
        assert!(master.contains("variant_0.m3u8"));
        for variation in 0..session.ladder().len() {
            let variant = session.file_path(&format!("variant_{}.m3u8", variation));
            let content = std::fs::read_to_string(variant).unwrap();
            assert_eq!(content.matches("#EXTINF:").count(), 10);
        }
        assert_eq!(f.encoder.starts().len(), 1);
        assert!(f.registry.get("movie").is_some());
    }

    #[tokio::test]
    async fn test_repeat_open_is_idempotent() {
        let f = Fixture::new();
        let mut builder = MockLadderBuilder::new();
        builder.expect_build().times(1).returning(|_| ladder(2));
        // The prober expects exactly one call
        let opener = f.opener(probing(30.0), Arc::new(builder));

        let first = opener.open("movie.mp4", None).await.unwrap();
        let manifest = std::fs::read_to_string(first.master_manifest_path()).unwrap();
        let second = opener.open("movie.mp4", None).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            std::fs::read_to_string(second.master_manifest_path()).unwrap(),
            manifest
        );
        assert_eq!(f.encoder.starts().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_opens_start_one_encoder() {
        let f = Fixture::new();
        let opener = f.opener(probing(30.0), Arc::new(StandardLadder::new(3.0)));

        let (a, b) = tokio::join!(
            opener.open("movie.mp4", Some("shared")),
            opener.open("movie.mp4", Some("shared"))
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(f.encoder.starts().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let f = Fixture::new();
        let mut prober = MockProber::new();
        prober.expect_probe().never();
        let opener = f.opener(prober, Arc::new(StandardLadder::new(3.0)));

        let result = opener.open("missing.mp4", None).await;
        assert!(matches!(result, Err(OpenError::SourceNotFound(_))));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_leaves_no_session() {
        let f = Fixture::new();
        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .returning(|_| Err(ProbeError::NoVideo));
        let opener = f.opener(prober, Arc::new(StandardLadder::new(3.0)));

        let result = opener.open("movie.mp4", None).await;
        assert!(matches!(result, Err(OpenError::Probe(ProbeError::NoVideo))));
        assert!(f.registry.get("movie").is_none());
        assert!(f.encoder.starts().is_empty());
    }

    #[tokio::test]
    async fn test_encoder_failure_is_startup_error() {
        let f = Fixture::new();
        f.encoder.fail_next_start();
        let opener = f.opener(probing(30.0), Arc::new(StandardLadder::new(3.0)));

        let result = opener.open("movie.mp4", None).await;
        assert!(matches!(result, Err(OpenError::Startup(_))));
        assert!(f.registry.get("movie").is_none());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let f = Fixture::new();
        let mut prober = MockProber::new();
        prober.expect_probe().never();
        let opener = f.opener(prober, Arc::new(StandardLadder::new(3.0)));

        let result = opener.open("../secret.mp4", None).await;
        assert!(matches!(result, Err(OpenError::InvalidRequest(_))));
    }
}
