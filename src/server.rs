//! Serves a [`Site`] over HTTP. The index, the feed, and `/ip` have fixed
//! routes. Every other request is resolved in order: a document alias (or
//! `<alias>/comment` for submissions, which go through
//! [`crate::catalog::Catalog::submit_comment`] on the blocking pool), a
//! standalone page, and finally the static file directory.

use crate::build::Site;
use crate::catalog::SubmitError;
use axum::extract::{ConnectInfo, FromRequest, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// Appended to a document alias to get its comment submission path.
const COMMENT_SUFFIX: &str = "/comment";

/// Builds the router for `site`.
pub fn router(site: Arc<Site>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/feed.xml", get(feed))
        .route("/index.xml", get(feed))
        .route("/ip", get(ip))
        .route("/ip/", get(ip))
        .fallback(resolve)
        .layer(TraceLayer::new_for_http())
        .with_state(site)
}

/// Binds `listen` and serves `site` until Ctrl-C or SIGTERM. In-flight
/// requests (including comment submissions) finish before this returns.
pub async fn serve(site: Site, listen: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");
    axum::serve(
        listener,
        router(Arc::new(site)).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "installing Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "installing SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

async fn index(State(site): State<Arc<Site>>) -> Html<String> {
    Html(site.index.to_string())
}

async fn feed(State(site): State<Arc<Site>>) -> Response {
    (
        [(header::CONTENT_TYPE, ATOM_CONTENT_TYPE)],
        site.feed.to_string(),
    )
        .into_response()
}

async fn ip(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match (forwarded, peer) {
        (Some(forwarded), _) => format!("{}\n", forwarded),
        (None, Some(ConnectInfo(addr))) => format!("{}\n", addr.ip()),
        (None, None) => String::from("\n"),
    }
}

/// The form fields of a comment submission. Missing fields are treated as
/// empty so that they're rejected with the usual message.
#[derive(Deserialize)]
struct CommentForm {
    #[serde(default)]
    name: String,

    #[serde(default)]
    body: String,
}

/// Documents (and their comment paths) first, then standalone pages, then the
/// static directory. Paths with a dot-segment (hidden files, `..`) are never
/// served from disk.
async fn resolve(State(site): State<Arc<Site>>, request: Request) -> Response {
    let path = request.uri().path().to_owned();
    let trimmed = path.trim_end_matches('/');
    let method = request.method().clone();

    if let Some(alias) = trimmed.strip_suffix(COMMENT_SUFFIX) {
        if method == Method::POST {
            let alias = alias.to_owned();
            return match Form::<CommentForm>::from_request(request, &()).await {
                Ok(Form(form)) => submit(site, alias, form).await,
                Err(rejection) => rejection.into_response(),
            };
        }
        if site.catalog.contains(alias) {
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }
    }

    let page = site
        .catalog
        .lookup(trimmed)
        .or_else(|| site.pages.get(trimmed).cloned());
    if let Some(page) = page {
        return match method {
            Method::GET | Method::HEAD => Html(page.to_string()).into_response(),
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
    }

    if path.contains("/.") {
        return not_found();
    }
    match ServeDir::new(&site.static_directory).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(err) => match err {},
    }
}

async fn submit(site: Arc<Site>, alias: String, form: CommentForm) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        site.catalog.submit_comment(&alias, &form.name, &form.body)
    })
    .await;

    match result {
        Ok(Ok(canonical)) => Redirect::to(&canonical).into_response(),
        Ok(Err(SubmitError::Invalid(invalid))) => {
            (StatusCode::BAD_REQUEST, invalid.to_string()).into_response()
        }
        Ok(Err(SubmitError::NotFound)) => not_found(),
        // logged by the catalog
        Ok(Err(SubmitError::Persist(_))) => internal_error(),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "submitting comment");
            internal_error()
        }
        Err(err) => {
            tracing::error!(error = %err, "comment submission task failed");
            internal_error()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n").into_response()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::Catalog;
    use crate::comments::CommentStore;
    use crate::document::{Aliases, Document};
    use crate::render::{Renderer, Theme};
    use axum::body::{to_bytes, Body};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        router: Router,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("public_html");
        fs::create_dir_all(public.join(".git")).unwrap();
        fs::write(public.join("style.css"), "body {}").unwrap();
        fs::write(public.join(".git/config"), "secret").unwrap();
        fs::create_dir_all(public.join("img/2021/04")).unwrap();
        fs::write(public.join("img/2021/04/a.png"), "png").unwrap();

        let catalog = Catalog::new(
            vec![
                document(4, "Notes", &["/notes/foo"]),
                document(3, "Hello", &["/posts/hello", "/2021/04/16/hello"]),
            ],
            Renderer::new(Theme::default()),
            CommentStore::new(dir.path().join("comments")),
        )
        .unwrap();

        let mut pages = HashMap::new();
        pages.insert(String::from("/learning"), Arc::from("<p>learning</p>"));
        let site = Site {
            catalog,
            index: Arc::from("<p>index</p>"),
            feed: Arc::from("<feed></feed>"),
            pages,
            static_directory: public,
        };
        Fixture {
            dir,
            router: router(Arc::new(site)),
        }
    }

    fn document(id: u64, title: &str, aliases: &[&str]) -> Document {
        Document {
            id,
            source_path: PathBuf::from(format!("posts/{}.md", id)),
            title: title.to_owned(),
            date: NaiveDate::from_ymd_opt(2021, 4, 16).unwrap(),
            raw_body: String::from("Hi"),
            rendered_body: String::from("<p>Hi</p>\n"),
            page: Arc::from(""),
            aliases: Aliases::new(aliases.iter().map(|a| a.to_string()).collect())
                .unwrap(),
            comments: Vec::new(),
        }
    }

    async fn send(router: &Router, request: Request) -> (StatusCode, HeaderMap, String) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn comment(uri: &str, form: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_document_routes() {
        let f = fixture();
        for uri in &[
            "/posts/hello",
            "/posts/hello/",
            "/2021/04/16/hello",
            "/2021/04/16/hello/",
        ] {
            let (status, _, body) = send(&f.router, get(uri)).await;
            assert_eq!(StatusCode::OK, status, "{}", uri);
            assert!(body.contains("<h2>Hello</h2>"), "{}", uri);
        }
        let (status, _, _) = send(&f.router, get("/posts/nope")).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
    }

    #[tokio::test]
    async fn test_submit_comment() {
        let f = fixture();
        let (status, headers, _) =
            send(&f.router, comment("/2021/04/16/hello/comment", "name=Al&body=Hi%21")).await;
        assert_eq!(StatusCode::SEE_OTHER, status);
        assert_eq!("/posts/hello", headers[header::LOCATION]);
        assert!(f.dir.path().join("comments/3/1.txt").is_file());

        let (_, _, body) = send(&f.router, get("/posts/hello")).await;
        assert!(body.contains("<strong>#1 Al</strong>"));
    }

    #[tokio::test]
    async fn test_invalid_comment() {
        let f = fixture();
        let (status, _, body) =
            send(&f.router, comment("/posts/hello/comment", "name=&body=Hi")).await;
        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!("Missing name or body", body);
        assert!(!f.dir.path().join("comments/3").exists());

        let (status, _, _) =
            send(&f.router, comment("/posts/nope/comment", "name=Al&body=Hi")).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let f = fixture();
        let (status, _, _) = send(&f.router, get("/posts/hello/comment")).await;
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, status);
    }

    #[tokio::test]
    async fn test_any_alias_shape_is_served() {
        let f = fixture();
        let (status, _, body) = send(&f.router, get("/notes/foo/")).await;
        assert_eq!(StatusCode::OK, status);
        assert!(body.contains("<h2>Notes</h2>"));

        let (status, headers, _) =
            send(&f.router, comment("/notes/foo/comment", "name=Al&body=Hi")).await;
        assert_eq!(StatusCode::SEE_OTHER, status);
        assert_eq!("/notes/foo", headers[header::LOCATION]);
        assert!(f.dir.path().join("comments/4/1.txt").is_file());
    }

    #[tokio::test]
    async fn test_document_misses_fall_through_to_static_files() {
        let f = fixture();
        let (status, _, body) = send(&f.router, get("/img/2021/04/a.png")).await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!("png", body);

        let (status, _, _) = send(&f.router, get("/2021/04/16/nope")).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
    }

    #[tokio::test]
    async fn test_feed() {
        let f = fixture();
        for uri in &["/feed.xml", "/index.xml"] {
            let (status, headers, body) = send(&f.router, get(uri)).await;
            assert_eq!(StatusCode::OK, status);
            assert_eq!(ATOM_CONTENT_TYPE, headers[header::CONTENT_TYPE]);
            assert_eq!("<feed></feed>", body);
        }
    }

    #[tokio::test]
    async fn test_index_pages_and_static_files() {
        let f = fixture();
        for (uri, wanted) in &[
            ("/", "<p>index</p>"),
            ("/index.html", "<p>index</p>"),
            ("/learning", "<p>learning</p>"),
            ("/learning/", "<p>learning</p>"),
            ("/style.css", "body {}"),
        ] {
            let (status, _, body) = send(&f.router, get(uri)).await;
            assert_eq!(StatusCode::OK, status, "{}", uri);
            assert_eq!(*wanted, body, "{}", uri);
        }

        let (status, _, _) = send(&f.router, get("/.git/config")).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
        let (status, _, _) = send(&f.router, get("/missing.css")).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
    }

    #[tokio::test]
    async fn test_ip() {
        let f = fixture();
        let request = Request::builder()
            .uri("/ip")
            .header("x-forwarded-for", "203.0.113.7, 198.51.100.2")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = send(&f.router, request).await;
        assert_eq!("203.0.113.7\n", body);

        let request = Request::builder()
            .uri("/ip/")
            .extension(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4321))))
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = send(&f.router, request).await;
        assert_eq!("192.0.2.1\n", body);
    }
}
