//! Static file serving.
//!
//! Every GET path resolves under the served directory. HTML files get the
//! reload client injected; everything else is returned byte-for-byte.
//!
//! Directories: `/dir` redirects to `/dir/`, `/dir/` serves `dir/index.html`,
//! and a directory without an index gets an HTML listing of its entries.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{Method, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::ContentError;
use crate::inject::ReloadScript;
use crate::state::AppState;

/// File served for directory requests.
const INDEX_FILE: &str = "index.html";

/// Characters percent-encoded in listing links.
const LINK_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Create router serving the directory for every path.
pub(crate) fn static_router() -> Router<Arc<AppState>> {
    Router::new().fallback(serve_file)
}

/// Serve a file from the served directory.
async fn serve_file(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> Result<Response, ContentError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ContentError::MethodNotAllowed);
    }

    let request_path = decode_path(uri.path())?;
    let relative = relative_path(&request_path)?;
    let resolved = resolve(&state.root, &state.root.join(relative), &request_path).await?;

    let file = if tokio::fs::metadata(&resolved).await?.is_dir() {
        if !request_path.ends_with('/') {
            return Ok(redirect_to_directory(&uri));
        }
        match find_index(&state.root, &resolved, &request_path).await? {
            Some(index) => index,
            None => {
                let listing = directory_listing(&resolved, &request_path).await?;
                tracing::debug!(path = %request_path, "Served directory listing");
                return Ok(html_response(&state.script, listing.as_bytes()));
            }
        }
    } else {
        resolved
    };

    let content = tokio::fs::read(&file).await?;
    let mime = mime_guess::from_path(&file).first_or_octet_stream();

    tracing::debug!(path = %request_path, bytes = content.len(), "Served file");

    if mime.essence_str() == "text/html" {
        return Ok(html_response(&state.script, &content));
    }
    Ok(([(header::CONTENT_TYPE, mime.to_string())], content).into_response())
}

/// HTML response with the reload client injected.
fn html_response(script: &ReloadScript, html: &[u8]) -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        script.inject(html),
    )
        .into_response()
}

/// Resolve the index file of `dir`, if it has one.
async fn find_index(
    root: &Path,
    dir: &Path,
    request_path: &str,
) -> Result<Option<PathBuf>, ContentError> {
    let index = match resolve(root, &dir.join(INDEX_FILE), request_path).await {
        Ok(index) => index,
        Err(ContentError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(tokio::fs::metadata(&index).await?.is_file().then_some(index))
}

/// Render an HTML listing of `dir`, sorted case-insensitively.
///
/// Subdirectories are shown with a trailing slash.
async fn directory_listing(dir: &Path, request_path: &str) -> Result<String, ContentError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            ContentError::Forbidden(request_path.to_owned())
        } else {
            ContentError::Io(e)
        }
    })?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().await?.is_dir();
        names.push((name, is_dir));
    }
    names.sort_by_key(|(name, _)| name.to_lowercase());

    let title = format!("Directory listing for {}", escape_html(request_path));
    let mut html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );
    for (name, is_dir) in &names {
        let slash = if *is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{}{slash}\">{}{slash}</a></li>\n",
            utf8_percent_encode(name, LINK_SEGMENT),
            escape_html(name),
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Ok(html)
}

/// Escape HTML special characters.
fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Percent-decode the request path.
fn decode_path(raw: &str) -> Result<String, ContentError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| ContentError::BadRequest(raw.to_owned()))
}

/// Convert a decoded URL path into a path relative to the served directory.
///
/// Every segment must be a plain file name. `..`, drive prefixes and other
/// special components are rejected instead of being normalized away.
fn relative_path(request_path: &str) -> Result<PathBuf, ContentError> {
    let mut relative = PathBuf::new();

    for segment in request_path.split(['/', '\\']) {
        if segment.is_empty() || segment == "." {
            continue;
        }

        let mut components = Path::new(segment).components();
        let is_plain = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none()
            && !segment.contains('\0');
        if !is_plain {
            return Err(ContentError::Forbidden(request_path.to_owned()));
        }

        relative.push(segment);
    }

    Ok(relative)
}

/// Canonicalize `candidate` and ensure it stays inside `root`.
///
/// Catches symlinks pointing outside the served directory.
async fn resolve(root: &Path, candidate: &Path, request_path: &str) -> Result<PathBuf, ContentError> {
    let resolved = match tokio::fs::canonicalize(candidate).await {
        Ok(path) => path,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            return Err(ContentError::NotFound(request_path.to_owned()));
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(ContentError::Forbidden(request_path.to_owned()));
        }
        Err(e) => return Err(ContentError::Io(e)),
    };

    if !resolved.starts_with(root) {
        return Err(ContentError::Forbidden(request_path.to_owned()));
    }

    Ok(resolved)
}

/// Redirect `/dir?query` to `/dir/?query`.
fn redirect_to_directory(uri: &Uri) -> Response {
    let location = match uri.query() {
        Some(query) => format!("{}/?{query}", uri.path()),
        None => format!("{}/", uri.path()),
    };
    Redirect::permanent(&location).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::inject::SCRIPT_MARKER;

    /// Served site in a temp dir, plus a sibling secret outside of it.
    struct Fixture {
        _temp_dir: tempfile::TempDir,
        root: PathBuf,
        outside: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();
        let root = base.join("site");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("index.html"), "<html><body>Hi</body></html>").unwrap();
        std::fs::write(root.join("fragment.htm"), "<p>no body</p>").unwrap();
        std::fs::write(root.join("style.css"), "body { color: red; }").unwrap();
        std::fs::write(root.join("data.bin"), [0u8, 159, 146, 150, 255]).unwrap();
        std::fs::write(root.join("nested/index.html"), "<body>nested</body>").unwrap();
        std::fs::write(root.join("with space.js"), "let a = 1;").unwrap();

        let outside = base.join("secret.txt");
        std::fs::write(&outside, "top secret").unwrap();

        Fixture {
            _temp_dir: temp_dir,
            root,
            outside,
        }
    }

    fn router(root: &Path) -> Router {
        let state = Arc::new(AppState {
            root: root.to_path_buf(),
            script: ReloadScript::new("localhost", 9001),
        });
        static_router().with_state(state)
    }

    async fn request(root: &Path, method: Method, uri: &str) -> (StatusCode, Response) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(root).oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn get(root: &Path, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
        let (status, response) = request(root, Method::GET, uri).await;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec(), content_type)
    }

    #[tokio::test]
    async fn test_html_gets_script_before_closing_body() {
        let fixture = fixture();
        let (status, body, content_type) = get(&fixture.root, "/index.html").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));

        let body = String::from_utf8(body).unwrap();
        let script = ReloadScript::new("localhost", 9001);
        assert_eq!(
            body,
            format!("<html><body>Hi{}</body></html>", script.as_str())
        );
    }

    #[tokio::test]
    async fn test_html_without_body_gets_script_appended() {
        let fixture = fixture();
        let (status, body, _) = get(&fixture.root, "/fragment.htm").await;

        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("<p>no body</p><script"));
        assert_eq!(body.matches(SCRIPT_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn test_non_html_is_byte_identical() {
        let fixture = fixture();

        let (status, body, content_type) = get(&fixture.root, "/style.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, std::fs::read(fixture.root.join("style.css")).unwrap());
        assert_eq!(content_type.as_deref(), Some("text/css"));

        let (status, body, content_type) = get(&fixture.root, "/data.bin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, vec![0u8, 159, 146, 150, 255]);
        assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_percent_encoded_path() {
        let fixture = fixture();
        let (status, body, _) = get(&fixture.root, "/with%20space.js").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"let a = 1;");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let fixture = fixture();
        let (status, body, _) = get(&fixture.root, "/missing.html").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"404 Not Found\n");
    }

    #[tokio::test]
    async fn test_path_below_file_is_not_found() {
        let fixture = fixture();
        let (status, _, _) = get(&fixture.root, "/style.css/extra").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parent_dir_traversal_is_forbidden() {
        let fixture = fixture();

        for uri in [
            "/../secret.txt",
            "/../../etc/passwd",
            "/nested/../../secret.txt",
            "/%2e%2e/secret.txt",
            "/%2E%2E%2Fsecret.txt",
            "/..%5csecret.txt",
        ] {
            let (status, body, _) = get(&fixture.root, uri).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
            assert!(!String::from_utf8_lossy(&body).contains("top secret"), "{uri}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root_is_forbidden() {
        let fixture = fixture();
        std::os::unix::fs::symlink(&fixture.outside, fixture.root.join("link.txt")).unwrap();

        let (status, body, _) = get(&fixture.root, "/link.txt").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!String::from_utf8_lossy(&body).contains("top secret"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_path_is_bad_request() {
        let fixture = fixture();
        let (status, _, _) = get(&fixture.root, "/%ff.html").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let fixture = fixture();
        let (status, body, _) = get(&fixture.root, "/").await;

        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("<html><body>Hi<script data-live-reload>"));
    }

    #[tokio::test]
    async fn test_directory_without_slash_redirects() {
        let fixture = fixture();
        let (status, response) = request(&fixture.root, Method::GET, "/nested?x=1").await;

        assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/nested/?x=1");
    }

    #[tokio::test]
    async fn test_directory_with_slash_serves_index() {
        let fixture = fixture();
        let (status, body, _) = get(&fixture.root, "/nested/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap().matches(SCRIPT_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn test_directory_without_index_lists_entries() {
        let fixture = fixture();
        let listing = fixture.root.join("listing");
        std::fs::create_dir_all(listing.join("Sub")).unwrap();
        std::fs::write(listing.join("b&c.css"), "a {}").unwrap();
        std::fs::write(listing.join("a.js"), "1").unwrap();

        let (status, body, content_type) = get(&fixture.root, "/listing/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));

        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("<title>Directory listing for /listing/</title>"));
        assert!(body.contains(r#"<li><a href="a.js">a.js</a></li>"#));
        assert!(body.contains(r#"<li><a href="b%26c.css">b&amp;c.css</a></li>"#));
        assert!(body.contains(r#"<li><a href="Sub/">Sub/</a></li>"#));
        assert!(body.find("a.js") < body.find("b%26c.css"));
        assert!(body.find("b%26c.css") < body.find("Sub/"));
        assert_eq!(body.matches(SCRIPT_MARKER).count(), 1);
        assert!(body.contains("</ul>\n<hr>\n<script data-live-reload>"));
    }

    #[tokio::test]
    async fn test_empty_directory_lists_nothing() {
        let fixture = fixture();
        let (status, body, _) = get(&fixture.root, "/empty/").await;

        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("<ul>\n</ul>"));
        assert_eq!(body.matches(SCRIPT_MARKER).count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_listing_escapes_request_path() {
        let fixture = fixture();
        std::fs::create_dir_all(fixture.root.join("<x>")).unwrap();

        let (status, body, _) = get(&fixture.root, "/%3Cx%3E/").await;

        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("Directory listing for /&lt;x&gt;/"));
        assert!(!body.contains("<x>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
    }

    #[tokio::test]
    async fn test_post_is_method_not_allowed() {
        let fixture = fixture();
        let (status, _) = request(&fixture.root, Method::POST, "/index.html").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_head_is_allowed() {
        let fixture = fixture();
        let (status, _) = request(&fixture.root, Method::HEAD, "/style.css").await;

        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_relative_path_skips_empty_and_current_segments() {
        let relative = relative_path("//a/./b//c.html").unwrap();
        assert_eq!(relative, PathBuf::from("a/b/c.html"));
    }

    #[test]
    fn test_relative_path_rejects_parent_segments() {
        assert!(matches!(
            relative_path("/a/../b"),
            Err(ContentError::Forbidden(_))
        ));
    }
}
