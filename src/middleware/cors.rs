//! CORS stage
//!
//! Installed only when allowed origins are configured. Requests whose
//! `Origin` is on the list get `Access-Control-Allow-Origin`; preflight
//! requests are answered here. Other origins receive no CORS headers.

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use hyper::{Method, Response, StatusCode};

use super::{Next, RequestContext, Stage, StageResult};

const ALLOW_METHODS: &str = "GET, POST, HEAD, PUT, DELETE, PATCH";
const PREFLIGHT_MAX_AGE: &str = "86400";

pub struct Cors {
    origins: Vec<String>,
    allow_any: bool,
}

impl Cors {
    /// `None` when no origins are configured, i.e. CORS is disabled
    pub fn new(origins: &[String]) -> Option<Self> {
        if origins.is_empty() {
            return None;
        }
        Some(Self {
            allow_any: origins.iter().any(|o| o == "*"),
            origins: origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
        })
    }

    /// Value for `Access-Control-Allow-Origin`, if this origin is allowed
    fn allow_origin(&self, origin: Option<&str>) -> Option<HeaderValue> {
        if self.allow_any {
            return Some(HeaderValue::from_static("*"));
        }
        let origin = origin?;
        self.origins
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(origin))
            .then(|| HeaderValue::from_str(origin).ok())
            .flatten()
    }

    fn preflight(&self, ctx: &RequestContext) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        headers.append(VARY, HeaderValue::from_static("Origin"));

        if let Some(allow_origin) = self.allow_origin(ctx.header(ORIGIN)) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            );
            if let Some(requested) = ctx.request.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            }
            headers.insert(
                ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static(PREFLIGHT_MAX_AGE),
            );
        }
        response
    }
}

#[async_trait]
impl Stage for Cors {
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult {
        let is_preflight = ctx.method() == Method::OPTIONS
            && ctx
                .request
                .headers()
                .contains_key(ACCESS_CONTROL_REQUEST_METHOD);
        if is_preflight {
            return Ok(self.preflight(ctx));
        }

        let mut response = next.run(ctx).await?;
        if let Some(allow_origin) = self.allow_origin(ctx.header(ORIGIN)) {
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        Ok(response)
    }
}
