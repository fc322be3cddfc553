use std::{convert::Infallible, thread};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use photobooth_camera::MJPEG_CONTENT_TYPE;
use photobooth_orchestrator::SystemHandle;
use photobooth_types::{PhotoboothError, Result};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

/// Frames buffered per viewer before the producing thread blocks.
const VIEWER_BUFFER: usize = 2;

pub fn router(handle: SystemHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/capture", post(capture))
        .route("/capture_3", post(capture_three))
        .route("/captures/:filename", get(serve_capture))
        .route("/status", get(status))
        .with_state(handle)
}

/// Error body shared by every JSON endpoint.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PhotoboothError> for ApiError {
    fn from(err: PhotoboothError) -> Self {
        let status = match &err {
            PhotoboothError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !err.is_not_ready() {
            error!("Request failed: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "status": "error", "message": self.message })),
        )
            .into_response()
    }
}

/// Run a blocking core call off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(ApiError::internal(format!("capture task failed: {err}"))),
    }
}

async fn index(State(handle): State<SystemHandle>) -> Result<Html<String>, ApiError> {
    let photos = match handle.system() {
        Ok(system) => blocking(move || system.list_photos()).await?,
        Err(err) if err.is_not_ready() => Vec::new(),
        Err(err) => return Err(err.into()),
    };
    Ok(Html(render_index(handle.state().as_str(), &photos)))
}

fn render_index(state: &str, photos: &[String]) -> String {
    let gallery: String = photos
        .iter()
        .map(|name| format!("<a href=\"/captures/{name}\"><img src=\"/captures/{name}\" alt=\"{name}\"></a>\n"))
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Photobooth</title>
<style>
body {{ font-family: sans-serif; text-align: center; background: #111; color: #eee; }}
img {{ max-width: 240px; margin: 4px; }}
#feed {{ max-width: 90vw; }}
</style>
</head>
<body>
<h1>Photobooth</h1>
<p>Camera: {state}</p>
<img id="feed" src="/video_feed" alt="live preview">
<p>
<button onclick="fetch('/capture', {{method: 'POST'}}).then(() => location.reload())">Take photo</button>
<button onclick="fetch('/capture_3', {{method: 'POST'}}).then(() => location.reload())">Take three</button>
</p>
<div>
{gallery}</div>
</body>
</html>
"#
    )
}

async fn video_feed(State(handle): State<SystemHandle>) -> Result<Response, ApiError> {
    let system = handle.system()?;
    let stream = blocking(move || system.mjpeg_stream()).await?;

    let (sender, receiver) = mpsc::channel::<std::result::Result<Bytes, Infallible>>(VIEWER_BUFFER);
    thread::Builder::new()
        .name("mjpeg-viewer".into())
        .spawn(move || {
            for part in stream {
                if sender.blocking_send(Ok(part)).is_err() {
                    debug!("MJPEG viewer disconnected");
                    return;
                }
            }
            debug!("MJPEG stream ended");
        })
        .map_err(|err| PhotoboothError::Stream(format!("failed to spawn viewer thread: {err}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(ReceiverStream::new(receiver)))
        .map_err(|err| ApiError::internal(format!("failed to build stream response: {err}")))
}

async fn capture(State(handle): State<SystemHandle>) -> Result<Json<serde_json::Value>, ApiError> {
    let system = handle.system()?;
    let photo = blocking(move || system.capture_one()).await?;
    Ok(Json(json!({ "status": "success", "filename": photo.file_name })))
}

async fn capture_three(
    State(handle): State<SystemHandle>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let system = handle.system()?;
    let photos = blocking(move || system.capture_three()).await?;
    let filenames: Vec<String> = photos.into_iter().map(|photo| photo.file_name).collect();
    Ok(Json(json!({ "status": "success", "filenames": filenames })))
}

async fn serve_capture(
    State(handle): State<SystemHandle>,
    Path(filename): Path<String>,
) -> Response {
    if !is_safe_file_name(&filename) {
        warn!("Rejected capture request for {filename:?}");
        return (StatusCode::BAD_REQUEST, "invalid file name").into_response();
    }
    let system = match handle.system() {
        Ok(system) => system,
        Err(err) => return ApiError::from(err).into_response(),
    };
    let path = system.capture_dir().join(&filename);
    match tokio::fs::read(&path).await {
        Ok(contents) => ([(header::CONTENT_TYPE, "image/jpeg")], contents).into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
        Err(err) => ApiError::internal(format!("failed to read {filename}: {err}")).into_response(),
    }
}

async fn status(State(handle): State<SystemHandle>) -> Json<serde_json::Value> {
    let system = handle.system().ok();
    Json(json!({
        "state": handle.state(),
        "failure": handle.failure(),
        "streaming": system.as_ref().map(|s| s.is_streaming()),
        "latest_photo": system.as_ref().and_then(|s| s.latest_photo().ok().flatten()),
        "last_frame_at": system.as_ref().and_then(|s| s.output().latest()).map(|f| f.captured_at),
        "uploads": system.as_ref().and_then(|s| s.upload_stats()),
    }))
}

/// A bare file name: no separators, no parent references.
fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, http_exchange, initialized_handle};
    use photobooth_types::lifecycle::LifecycleState;

    #[test]
    fn file_name_validation() {
        assert!(is_safe_file_name("photo_12.jpg"));
        assert!(!is_safe_file_name("../secrets.txt"));
        assert!(!is_safe_file_name("a/photo_1.jpg"));
        assert!(!is_safe_file_name("a\\photo_1.jpg"));
        assert!(!is_safe_file_name(""));
    }

    #[test]
    fn not_ready_maps_to_error_status() {
        let err = ApiError::from(PhotoboothError::NotReady(LifecycleState::Uninitialized));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("not initialized"));
    }

    #[test]
    fn index_lists_photos_newest_first() {
        let html = render_index("ready", &["photo_2.jpg".into(), "photo_1.jpg".into()]);
        let newest = html.find("photo_2.jpg").expect("photo_2");
        let oldest = html.find("photo_1.jpg").expect("photo_1");
        assert!(newest < oldest);
        assert!(html.contains("/video_feed"));
    }

    async fn serve_router(handle: SystemHandle) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(handle)).await;
        });
        addr
    }

    #[tokio::test]
    async fn capture_before_initialization_returns_json_error() {
        let addr = serve_router(SystemHandle::new()).await;

        let reply = http_exchange(addr, "POST", "/capture").await;
        assert!(reply.starts_with("HTTP/1.1 500"), "{reply}");
        assert!(reply.contains(r#""status":"error""#), "{reply}");
        assert!(reply.contains("not initialized"), "{reply}");

        let reply = http_exchange(addr, "POST", "/capture_3").await;
        assert!(reply.starts_with("HTTP/1.1 500"), "{reply}");
        assert!(reply.contains(r#""status":"error""#), "{reply}");
    }

    #[tokio::test]
    async fn status_reports_uninitialized_system() {
        let addr = serve_router(SystemHandle::new()).await;

        let reply = http_exchange(addr, "GET", "/status").await;
        assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
        assert!(reply.contains(r#""state":"uninitialized""#), "{reply}");
        assert!(reply.contains(r#""last_frame_at":null"#), "{reply}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn capture_on_ready_system_returns_file_name() {
        let root = tempfile::tempdir().expect("tempdir");
        let handle = initialized_handle(fast_config(root.path())).await;
        let addr = serve_router(handle.clone()).await;

        let reply = http_exchange(addr, "POST", "/capture").await;
        assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
        assert!(reply.contains(r#""status":"success""#), "{reply}");
        assert!(reply.contains("photo_1.jpg"), "{reply}");

        let reply = http_exchange(addr, "GET", "/captures/photo_1.jpg").await;
        assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
        assert!(reply.contains("image/jpeg"), "{reply}");

        tokio::task::spawn_blocking(move || handle.shutdown())
            .await
            .expect("shutdown");
    }
}
