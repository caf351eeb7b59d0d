//! Request routing dispatch module
//!
//! Terminal endpoint of the pipeline. Precedence, most specific first:
//! health check, custom routes (exact, then longest prefix), static files
//! from the public directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hyper::Method;

use super::static_files::StaticFiles;
use crate::config::{Config, HealthConfig, RouteHandler};
use crate::error::ServeError;
use crate::http;
use crate::logger::Logger;
use crate::middleware::{Endpoint, RequestContext, StageResult};

pub struct Router {
    health: HealthConfig,
    /// Custom routes, longest prefix first
    routes: Vec<(String, RouteHandler)>,
    public_dir: PathBuf,
    files: StaticFiles,
}

impl Router {
    pub fn new(config: &Config, logger: Arc<Logger>) -> Self {
        let mut routes: Vec<_> = config
            .routes
            .custom_routes
            .iter()
            .map(|(prefix, handler)| (prefix.clone(), handler.clone()))
            .collect();
        routes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            health: config.routes.health.clone(),
            routes,
            public_dir: PathBuf::from(&config.static_files.public_dir),
            files: StaticFiles::new(&config.static_files, logger),
        }
    }

    /// Most specific custom route for `path`
    fn match_route(&self, path: &str) -> Option<&(String, RouteHandler)> {
        self.routes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, path))
    }

    /// Dispatch to specific route handler
    async fn dispatch_route_handler(
        &self,
        ctx: &RequestContext,
        prefix: &str,
        handler: &RouteHandler,
    ) -> StageResult {
        match handler {
            RouteHandler::Dir { path, cache_time } => {
                let relative = ctx.path().strip_prefix(prefix).unwrap_or_default();
                self.files
                    .serve_directory(ctx, Path::new(path), relative, *cache_time)
                    .await
            }
            RouteHandler::File { path, cache_time } => {
                self.files
                    .serve_file(ctx, Path::new(path), *cache_time)
                    .await
            }
            RouteHandler::Redirect { target, code } => {
                Ok(http::build_redirect_response(target, *code)?)
            }
        }
    }
}

/// `/docs` matches `/docs` and `/docs/...` but not `/docsearch`
fn prefix_matches(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix).is_some_and(|rest| {
        rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
    })
}

#[async_trait]
impl Endpoint for Router {
    async fn call(&self, ctx: &RequestContext) -> StageResult {
        match *ctx.method() {
            Method::GET | Method::HEAD => {}
            Method::OPTIONS => return Ok(http::build_options_response()),
            _ => return Err(ServeError::MethodNotAllowed),
        }

        let path = ctx.path();

        if self.health.enabled && path == self.health.path {
            return Ok(http::build_health_response("ok"));
        }

        if let Some((prefix, handler)) = self.match_route(path) {
            return self.dispatch_route_handler(ctx, prefix, handler).await;
        }

        self.files
            .serve_directory(ctx, &self.public_dir, path, None)
            .await
    }
}
