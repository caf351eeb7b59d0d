//! Request pipeline
//!
//! A request passes through an explicit, ordered list of [`Stage`]s before it
//! reaches the [`Endpoint`] (the router). Each stage gets the request context
//! and a [`Next`] handle; calling `next.run(ctx)` continues down the list,
//! returning early answers the request without touching later stages.
//!
//! Order, outermost first:
//!
//! ```text
//! access log -> custom headers -> cors -> recover -> expiration cache -> router
//! ```

pub mod access_log;
pub mod cache;
pub mod cors;
pub mod headers;
pub mod recover;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{AsHeaderName, ACCEPT};
use hyper::{Method, Request, Response};

use crate::config::{Config, LoadError};
use crate::error::ServeError;
use crate::handler::Router;
use crate::logger::Logger;

pub use access_log::AccessLog;
pub use cache::ExpirationCache;
pub use cors::Cors;
pub use headers::CustomHeaders;
pub use recover::Recover;

pub type StageResult = Result<Response<Full<Bytes>>, ServeError>;

/// Everything a stage may look at for one request
pub struct RequestContext {
    pub request: Request<()>,
    pub peer_addr: SocketAddr,
}

impl RequestContext {
    pub const fn new(request: Request<()>, peer_addr: SocketAddr) -> Self {
        Self { request, peer_addr }
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn is_head(&self) -> bool {
        self.request.method() == Method::HEAD
    }

    /// Header value as a string, if present and valid ASCII
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the client prefers JSON error bodies
    pub fn wants_json(&self) -> bool {
        self.header(ACCEPT)
            .is_some_and(|accept| accept.contains("application/json"))
    }
}

/// One step of the request pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult;
}

/// Terminal handler at the end of the pipeline
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, ctx: &RequestContext) -> StageResult;
}

/// The remaining stages of the pipeline
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    endpoint: &'a dyn Endpoint,
}

impl Next<'_> {
    /// Continue with the next stage, or the endpoint once stages run out
    pub async fn run(self, ctx: &RequestContext) -> StageResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    endpoint: self.endpoint,
                };
                stage.handle(ctx, next).await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}

/// Ordered stages in front of an endpoint
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Pipeline {
    pub fn new(endpoint: impl Endpoint + 'static) -> Self {
        Self {
            stages: Vec::new(),
            endpoint: Arc::new(endpoint),
        }
    }

    /// Append a stage; stages run in the order they were added
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub async fn run(&self, ctx: &RequestContext) -> StageResult {
        Next {
            stages: &self.stages,
            endpoint: self.endpoint.as_ref(),
        }
        .run(ctx)
        .await
    }
}

/// Assemble the server pipeline from configuration
pub fn build_pipeline(config: &Config, logger: &Arc<Logger>) -> Result<Pipeline, LoadError> {
    let mut pipeline = Pipeline::new(Router::new(config, Arc::clone(logger)));

    if config.logging.access_log {
        pipeline = pipeline.stage(AccessLog::new(
            Arc::clone(logger),
            config.http.trusted_proxy_header(),
        )?);
    }

    pipeline = pipeline.stage(CustomHeaders::from_config(&config.http)?);

    // Outside recover so error responses carry CORS headers too
    if let Some(cors) = Cors::new(&config.http.allowed_origins()) {
        pipeline = pipeline.stage(cors);
    }

    Ok(pipeline
        .stage(Recover::new(Arc::clone(logger)))
        .stage(ExpirationCache::new()))
}
