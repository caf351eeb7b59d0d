// Application state module
// Built once at startup and shared by every connection task

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Request, Response};

use super::types::Config;
use super::LoadError;
use crate::http;
use crate::logger::Logger;
use crate::middleware::{self, Pipeline, RequestContext};

/// Application state
pub struct AppState {
    pub config: Config,
    pub logger: Arc<Logger>,
    pipeline: Pipeline,
}

impl AppState {
    /// Assemble the request pipeline from configuration
    pub fn new(config: Config, logger: Arc<Logger>) -> Result<Self, LoadError> {
        let pipeline = middleware::build_pipeline(&config, &logger)?;
        Ok(Self {
            config,
            logger,
            pipeline,
        })
    }

    /// Run one request through the pipeline
    pub async fn dispatch(&self, request: Request<()>, peer_addr: SocketAddr) -> Response<Full<Bytes>> {
        let ctx = RequestContext::new(request, peer_addr);
        match self.pipeline.run(&ctx).await {
            Ok(response) => response,
            Err(e) => {
                self.logger.error(&format!("Unhandled error for {}: {e}", ctx.request.uri()));
                http::build_error_response(e.status(), ctx.wants_json())
            }
        }
    }
}
