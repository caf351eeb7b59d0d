//! HTTP response building module
//!
//! Provides builders for the responses produced by handlers and stages.
//! Builders fed only with static header values are infallible; the others
//! return `hyper::http::Error` so callers can propagate it.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCEPT_RANGES, ALLOW, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, ETAG, LOCATION, VARY,
};
use hyper::{Response, StatusCode};

const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Build 200 response for a file body
///
/// `data` is the (possibly encoded) body; for HEAD requests only its length
/// is reported.
pub fn build_file_response(
    data: Bytes,
    content_type: &'static str,
    etag: &str,
    content_encoding: Option<&'static str>,
    is_head: bool,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, content_length)
        .header(ETAG, etag)
        .header(VARY, "Accept-Encoding")
        .header(ACCEPT_RANGES, "none");
    if let Some(encoding) = content_encoding {
        builder = builder.header(CONTENT_ENCODING, encoding);
    }
    builder.body(Full::new(body))
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(ETAG, etag)
        .header(VARY, "Accept-Encoding")
        .body(Full::new(Bytes::new()))
}

/// Build redirect response with the given status code
pub fn build_redirect_response(
    target: &str,
    code: u16,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(code)
        .header(LOCATION, target)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from("Redirecting...")))
}

/// Build health check response
pub fn build_health_response(status: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(status.as_bytes())));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Build OPTIONS response for requests that are not CORS preflights
pub fn build_options_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

/// Build an error response: plain text, or `{"code":..,"message":..}` when JSON is preferred
pub fn build_error_response(status: StatusCode, json: bool) -> Response<Full<Bytes>> {
    let message = status.canonical_reason().unwrap_or("Error");
    let (body, content_type) = if json {
        (
            serde_json::json!({ "code": status.as_u16(), "message": message }).to_string(),
            "application/json",
        )
    } else {
        (format!("{} {message}", status.as_u16()), "text/plain; charset=utf-8")
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if status == StatusCode::METHOD_NOT_ALLOWED {
        headers.insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    }
    response
}
