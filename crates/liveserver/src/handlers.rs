//! Request handler boundary and the file-serving wrappers composed in
//! front of the application handler.
//!
//! Handlers are stacked by delegation rather than inheritance: each
//! wrapper answers the paths it owns and forwards everything else to the
//! handler it wraps.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::errors::BoxedError;
use crate::http::{HttpRequest, HttpResponse};

pub type HandlerResult = std::result::Result<HttpResponse, BoxedError>;

/// Per-request dispatch boundary the server delegates to.
///
/// Implementations run on the server thread, one request at a time. An
/// `Err` return is contained at the connection boundary and never stops
/// the server.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: &HttpRequest) -> HandlerResult;
}

impl<F> RequestHandler for F
where
    F: Fn(&HttpRequest) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, request: &HttpRequest) -> HandlerResult {
        self(request)
    }
}

/// Serves files below a root directory for paths under a base URL,
/// delegating every other request to the wrapped handler.
///
/// The same type covers both the static-assets and the media-assets
/// path classes; the lifecycle thread stacks one instance per class.
pub struct StaticFilesHandler {
    root: PathBuf,
    base_url: String,
    inner: Arc<dyn RequestHandler>,
}

impl StaticFilesHandler {
    /// Wraps `inner` with file serving for `base_url` out of `root`.
    ///
    /// Fails when `root` is not an existing directory so a bad asset
    /// configuration surfaces at server startup, not on first request.
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: &str,
        inner: Arc<dyn RequestHandler>,
    ) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("asset root {} is not a directory", root.display()),
            ));
        }

        let mut base_url = base_url.to_string();
        if !base_url.starts_with('/') {
            base_url.insert(0, '/');
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            root,
            base_url,
            inner,
        })
    }

    /// Maps a request target to a file below the root, if the target
    /// falls under our base URL. Query strings and fragments are not
    /// part of the file name; parent-directory components are rejected.
    fn file_path(&self, target: &str) -> Option<PathBuf> {
        let path = target.split(['?', '#']).next().unwrap_or(target);
        let relative = path.strip_prefix(self.base_url.as_str())?;

        let relative = Path::new(relative);
        if relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }
}

impl RequestHandler for StaticFilesHandler {
    fn handle(&self, request: &HttpRequest) -> HandlerResult {
        let Some(file_path) = self.file_path(&request.path) else {
            return self.inner.handle(request);
        };

        // covers missing files and directory targets alike
        if !file_path.is_file() {
            tracing::debug!(path = %file_path.display(), "asset not found");
            return Ok(HttpResponse::not_found());
        }

        match fs::read(&file_path) {
            Ok(body) => Ok(HttpResponse::asset(content_type_for(&file_path), body)),
            Err(err) => Err(err.into()),
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{HandlerResult, RequestHandler, StaticFilesHandler};
    use crate::http::{HttpRequest, HttpResponse};

    fn request(path: &str) -> HttpRequest {
        HttpRequest {
            method: "GET".to_string(),
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn RequestHandler> {
        Arc::new(move |_req: &HttpRequest| -> HandlerResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::ok(b"fallthrough".to_vec()))
        })
    }

    #[test]
    fn serves_mapped_file_bytes_unchanged() {
        let root = tempfile::tempdir().expect("should create asset root");
        fs::write(root.path().join("app.css"), b"body { color: red }").expect("should write");

        let hits = Arc::new(AtomicUsize::new(0));
        let handler = StaticFilesHandler::new(root.path(), "/static/", counting_handler(hits.clone()))
            .expect("should build handler");

        let response = handler
            .handle(&request("/static/app.css?v=2"))
            .expect("should serve");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"body { color: red }");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_file_under_base_url_is_not_found() {
        let root = tempfile::tempdir().expect("should create asset root");
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = StaticFilesHandler::new(root.path(), "/static/", counting_handler(hits.clone()))
            .expect("should build handler");

        let response = handler
            .handle(&request("/static/missing.js"))
            .expect("should respond");
        assert_eq!(response.status, 404);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn directory_targets_are_not_found_not_errors() {
        let root = tempfile::tempdir().expect("should create asset root");
        fs::create_dir(root.path().join("subdir")).expect("should create subdir");

        let hits = Arc::new(AtomicUsize::new(0));
        let handler = StaticFilesHandler::new(root.path(), "/static/", counting_handler(hits.clone()))
            .expect("should build handler");

        let response = handler
            .handle(&request("/static/subdir"))
            .expect("directory target should still get a response");
        assert_eq!(response.status, 404);

        let response = handler
            .handle(&request("/static/"))
            .expect("base url itself should still get a response");
        assert_eq!(response.status, 404);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn delegates_unmatched_paths_to_inner_handler() {
        let root = tempfile::tempdir().expect("should create asset root");
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = StaticFilesHandler::new(root.path(), "/static/", counting_handler(hits.clone()))
            .expect("should build handler");

        let response = handler.handle(&request("/api/users")).expect("should delegate");
        assert_eq!(response.body, b"fallthrough");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_parent_directory_traversal() {
        let root = tempfile::tempdir().expect("should create asset root");
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = StaticFilesHandler::new(root.path(), "/static/", counting_handler(hits.clone()))
            .expect("should build handler");

        // Falls through to the inner handler instead of escaping the root.
        handler
            .handle(&request("/static/../secrets.txt"))
            .expect("should respond");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_root_directory_fails_construction() {
        let hits = Arc::new(AtomicUsize::new(0));
        let result =
            StaticFilesHandler::new("/definitely/not/a/dir", "/static/", counting_handler(hits));
        assert!(result.is_err());
    }
}
