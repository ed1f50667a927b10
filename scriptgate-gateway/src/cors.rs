//! Cross-origin headers applied to every route.
//!
//! One static origin value is sent for all requests. Matching a request's
//! `Origin` against an allow-list is not supported.

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderMap, HeaderValue, Method, Request, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::StartupError;

pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS, PATCH";
pub const ALLOW_HEADERS: &str = "Content-Type";

/// The configured origin, pre-validated as a header value.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
}

impl CorsPolicy {
    /// Build a policy from the configured origin. An empty value is allowed.
    ///
    /// # Errors
    /// Returns [`StartupError::InvalidCorsOrigin`] if `origin` contains bytes
    /// that cannot appear in a header.
    pub fn new(origin: &str) -> Result<Self, StartupError> {
        let allow_origin = HeaderValue::from_str(origin)
            .map_err(|_| StartupError::InvalidCorsOrigin { value: origin.to_owned() })?;
        Ok(Self { allow_origin })
    }

    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    }
}

/// Sets the CORS headers and answers every `OPTIONS` request with 204
/// without reaching the route.
pub async fn cors_middleware(
    State(policy): State<CorsPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    policy.apply(response.headers_mut());
    response
}
