//! Integration test: the router wired to real scripts through
//! [`ProcessBackend`], with log output captured for inspection.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use scriptgate_core::{Configuration, GatewaySettings};
use scriptgate_executor::ProcessBackend;
use scriptgate_gateway::{
    cors::CorsPolicy,
    routes::{create_router, AppState},
    server::{build_app, ServerTimeouts},
};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(e) => panic!("log buffer poisoned: {e}"),
        }
    }
}

impl Write for LogBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut buf) => buf.extend_from_slice(data),
            Err(e) => panic!("log buffer poisoned: {e}"),
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn install_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .unwrap_or_else(|e| panic!("write {name}: {e}"));
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|e| panic!("chmod {name}: {e}"));
}

fn gateway(dir: &TempDir) -> Router {
    let config: Configuration = [
        ("api_port".to_owned(), "3101".to_owned()),
        ("cors_allowed_domains".to_owned(), "https://app.example".to_owned()),
    ]
    .into_iter()
    .collect();
    let settings = GatewaySettings::from_config(&config, dir.path())
        .unwrap_or_else(|e| panic!("settings: {e}"));
    let cors = CorsPolicy::new(&settings.cors_allowed_origin).unwrap_or_else(|e| panic!("cors: {e}"));
    build_app(
        create_router(AppState::new(Arc::new(ProcessBackend::new()), settings)),
        cors,
        &ServerTimeouts::default(),
    )
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap_or_else(|e| panic!("request: {e}"))
}

async fn send(app: Router, req: Request<Body>) -> Response {
    app.oneshot(req).await.unwrap_or_else(|e| panic!("handler error: {e}"))
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20)
        .await
        .unwrap_or_else(|e| panic!("body: {e}"));
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn echo_script_output_is_wrapped_in_route_field() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    install_script(dir.path(), "base64_query_base64_return.sh", r#"echo "$1 $2""#);

    let resp = send(
        gateway(&dir),
        post("/base64querypostbase64return", r#"{"database":"mydb","base64value":"aGVsbG8="}"#),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "https://app.example");
    assert_eq!(body_text(resp).await, r#"{"base64ResultsObj":"mydb aGVsbG8=\n"}"#);
}

#[tokio::test]
async fn failing_script_detail_goes_to_log_not_caller() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    install_script(dir.path(), "base64_non_query.sh", "echo 'db error' >&2\nexit 2");

    let resp = send(
        gateway(&dir),
        post("/base64nonquery", r#"{"database":"mydb","base64value":"eA=="}"#),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(resp).await;
    assert!(!text.contains("db error"), "stderr leaked to caller: {text}");
    assert!(logs.contents().contains("db error"), "stderr missing from server log");
}

#[tokio::test]
async fn missing_script_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));

    let resp = send(
        gateway(&dir),
        post("/base64postjsonreturn", r#"{"database":"mydb","base64value":"eA=="}"#),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_text(resp).await.contains(&dir.path().display().to_string()));
}

#[tokio::test]
async fn version_returns_raw_stdout() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    install_script(dir.path(), "psql_version.sh", "echo 'PostgreSQL 16.2'\necho warn >&2");

    let req = Request::builder()
        .uri("/version")
        .body(Body::empty())
        .unwrap_or_else(|e| panic!("request: {e}"));
    let resp = send(gateway(&dir), req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(body_text(resp).await, "PostgreSQL 16.2\n", "body is stdout only, not validated as JSON");
}
