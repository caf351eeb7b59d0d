//! Access log stage
//!
//! Outermost stage: emits exactly one line per request, after the response
//! is known, cache hits and error responses included.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hyper::body::Body as _;
use hyper::header::{HeaderName, REFERER, USER_AGENT};

use super::{Next, RequestContext, Stage, StageResult};
use crate::config::LoadError;
use crate::logger::{AccessLogEntry, Logger};

pub struct AccessLog {
    logger: Arc<Logger>,
    /// Header carrying the real client IP behind a proxy
    proxy_header: Option<HeaderName>,
}

impl AccessLog {
    pub fn new(logger: Arc<Logger>, proxy_header: Option<&str>) -> Result<Self, LoadError> {
        let proxy_header = proxy_header
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| LoadError::InvalidHeader(name.to_string()))
            })
            .transpose()?;
        Ok(Self {
            logger,
            proxy_header,
        })
    }

    /// First address in the trusted proxy header, else the peer IP
    fn client_ip(&self, ctx: &RequestContext) -> String {
        self.proxy_header
            .as_ref()
            .and_then(|name| ctx.header(name))
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map_or_else(|| ctx.peer_addr.ip().to_string(), ToString::to_string)
    }
}

#[async_trait]
impl Stage for AccessLog {
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult {
        let started = Instant::now();
        let time = self.logger.now();

        let result = next.run(ctx).await;

        let uri = ctx.request.uri();
        let mut entry = AccessLogEntry::new(
            self.client_ip(ctx),
            ctx.method().to_string(),
            uri.path().to_string(),
            time,
        );
        entry.query = uri.query().map(ToString::to_string);
        entry.http_version = match ctx.request.version() {
            hyper::Version::HTTP_10 => "1.0",
            hyper::Version::HTTP_2 => "2",
            _ => "1.1",
        }
        .to_string();
        entry.referer = ctx.header(REFERER).map(ToString::to_string);
        entry.user_agent = ctx.header(USER_AGENT).map(ToString::to_string);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        match &result {
            Ok(response) => {
                entry.status = response.status().as_u16();
                entry.body_bytes = response.body().size_hint().exact().unwrap_or(0);
            }
            Err(error) => entry.status = error.status().as_u16(),
        }

        self.logger.access(&entry);
        result
    }
}
