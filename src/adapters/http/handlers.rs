use super::AppState;
use crate::application::{OpenError, ServedFile};
use crate::domain::addressing::RequestedFile;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    file: Option<String>,
    name: Option<String>,
}

/// `GET /stream?file=<file>&name=<session>`
pub async fn open_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Some(file) = query.file.filter(|f| !f.trim().is_empty()) else {
        return OpenError::InvalidRequest("missing file parameter".to_string()).into_response();
    };

    let session = match state.opener.open(&file, query.name.as_deref()).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    tracing::info!(session = session.name(), file = %file, "Stream opened");
    transmit(ServedFile {
        path: session.master_manifest_path(),
        kind: RequestedFile::Manifest,
    })
    .await
}

/// `GET /<session>/<file>`
pub async fn serve_file(
    State(state): State<AppState>,
    Path((session, file)): Path<(String, String)>,
) -> Response {
    match state.dispatcher.dispatch(&session, &file).await {
        Ok(served) => transmit(served).await,
        Err(e) => e.into_response(),
    }
}

/// Stream a file from disk; failures past this point are transmission errors.
async fn transmit(served: ServedFile) -> Response {
    let file = match File::open(&served.path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %served.path.display(), error = %e, "Failed to open file for transmission");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let path = served.path.clone();
    let stream = ReaderStream::new(file).inspect_err(move |e| {
        tracing::error!(path = %path.display(), error = %e, "Transmission failed");
    });

    let content_type = match served.kind {
        RequestedFile::Manifest => MANIFEST_CONTENT_TYPE,
        RequestedFile::Segment => SEGMENT_CONTENT_TYPE,
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
