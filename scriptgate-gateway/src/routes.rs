//! Axum route handlers for the scriptgate API.
//!
//! Every script-backed POST endpoint goes through [`script_gate`]; the
//! endpoints differ only in the [`ScriptRoute`] row that parameterizes it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, Method},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use scriptgate_core::{GatewaySettings, QueryEnvelope, RouteDescriptor, RouteDirectory};
use scriptgate_executor::{Invocation, ScriptBackend, SCRIPT_TIMEOUT};

use crate::error::GatewayError;

/// Upper bound on a script-backed request body: 10 MiB.
pub const MAX_BODY_BYTES: usize = 10 << 20;

/// Interpreter used for the fixed, argument-free scripts.
pub const FIXED_SCRIPT_SHELL: &str = "/bin/bash";

// ── Route tables ─────────────────────────────────────────────────────────────

/// A POST endpoint that relays `<database> <base64value>` to a script and
/// wraps its output in a single-field JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptRoute {
    pub path: &'static str,
    pub script: &'static str,
    pub result_field: &'static str,
}

/// A GET endpoint that runs a script with no arguments and returns its
/// stdout verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedScriptRoute {
    pub path: &'static str,
    pub script: &'static str,
}

pub static SCRIPT_ROUTES: [ScriptRoute; 3] = [
    ScriptRoute {
        path: "/base64querypostbase64return",
        script: "base64_query_base64_return.sh",
        result_field: "base64ResultsObj",
    },
    ScriptRoute {
        path: "/base64postjsonreturn",
        script: "base64_query_json_return.sh",
        result_field: "jsonResultsObj",
    },
    ScriptRoute {
        path: "/base64nonquery",
        script: "base64_non_query.sh",
        result_field: "jsonResultsObj",
    },
];

pub static FIXED_SCRIPT_ROUTES: [FixedScriptRoute; 2] = [
    FixedScriptRoute { path: "/listdbs", script: "psql_listdbs.sh" },
    FixedScriptRoute { path: "/version", script: "psql_version.sh" },
];

/// Endpoints listed on the index page, in registration order.
#[must_use]
pub fn route_directory() -> RouteDirectory {
    FIXED_SCRIPT_ROUTES
        .iter()
        .map(|r| r.path)
        .chain(SCRIPT_ROUTES.iter().map(|r| r.path))
        .map(RouteDescriptor::from_path)
        .collect()
}

// ── Shared state ─────────────────────────────────────────────────────────────

/// State shared read-only by every request.
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn ScriptBackend>,
    settings: Arc<GatewaySettings>,
    directory: Arc<RouteDirectory>,
}

impl AppState {
    #[must_use]
    pub fn new(backend: Arc<dyn ScriptBackend>, settings: GatewaySettings) -> Self {
        Self {
            backend,
            settings: Arc::new(settings),
            directory: Arc::new(route_directory()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router. CORS and timeouts are added by
/// [`crate::server::build_app`].
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/", get(index));

    for route in &SCRIPT_ROUTES {
        router = router.route(
            route.path,
            any(move |State(state): State<AppState>, method: Method, body: Body| {
                script_gate(state, route, method, body)
            }),
        );
    }
    for route in &FIXED_SCRIPT_ROUTES {
        router = router.route(
            route.path,
            get(move |State(state): State<AppState>| fixed_script(state, route)),
        );
    }

    router.with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /` — HTML listing of the available endpoints.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Html(state.directory.render_html(&state.settings.index_base_url))
}

/// Shared handler for the script-backed POST endpoints.
///
/// # Errors
/// - [`GatewayError::MethodNotAllowed`] for anything but `POST`
/// - [`GatewayError::BodyTooLarge`] once more than [`MAX_BODY_BYTES`] arrive
/// - [`GatewayError::InvalidBody`] when the body is not a [`QueryEnvelope`]
/// - [`GatewayError::ScriptFailed`] when the script cannot run, exits
///   non-zero or exceeds [`SCRIPT_TIMEOUT`]
pub async fn script_gate(
    state: AppState,
    route: &'static ScriptRoute,
    method: Method,
    body: Body,
) -> Result<Response, GatewayError> {
    if method != Method::POST {
        return Err(GatewayError::MethodNotAllowed);
    }

    let envelope = read_envelope(body).await?;
    let invocation = Invocation::new(script_path(&state.settings.script_dir, route.script))
        .with_args(envelope.into_args())
        .with_working_dir(&state.settings.script_dir)
        .with_deadline(SCRIPT_TIMEOUT);

    match state.backend.invoke(&invocation).await {
        Ok(output) => {
            let body = BTreeMap::from([(route.result_field, output.combined_lossy())]);
            Ok(Json(body).into_response())
        }
        Err(e) => {
            tracing::error!(
                invocation = %invocation.id,
                script = route.script,
                error = %e,
                output = %String::from_utf8_lossy(e.captured_output()),
                "script failed"
            );
            Err(GatewayError::ScriptFailed)
        }
    }
}

/// Handler for the argument-free GET endpoints.
///
/// # Errors
/// Returns [`GatewayError::FixedScriptFailed`] if the script cannot run or
/// exits non-zero.
pub async fn fixed_script(
    state: AppState,
    route: &'static FixedScriptRoute,
) -> Result<Response, GatewayError> {
    let script = script_path(&state.settings.script_dir, route.script);
    let invocation = Invocation::new(FIXED_SCRIPT_SHELL)
        .with_args([script.display().to_string()])
        .with_working_dir(&state.settings.script_dir);

    match state.backend.invoke(&invocation).await {
        Ok(output) => Ok(([(CONTENT_TYPE, "application/json")], output.stdout).into_response()),
        Err(e) => {
            tracing::error!(
                invocation = %invocation.id,
                script = route.script,
                error = %e,
                output = %String::from_utf8_lossy(e.captured_output()),
                "fixed script failed"
            );
            Err(GatewayError::FixedScriptFailed(e))
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Read at most [`MAX_BODY_BYTES`] and decode the envelope. The limit is
/// enforced frame by frame, so an oversized body is never fully buffered.
async fn read_envelope(body: Body) -> Result<QueryEnvelope, GatewayError> {
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(GatewayError::BodyTooLarge);
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            return Err(GatewayError::InvalidBody);
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "malformed request body");
        GatewayError::InvalidBody
    })
}

fn script_path(script_dir: &Path, script: &str) -> std::path::PathBuf {
    script_dir.join(script)
}
