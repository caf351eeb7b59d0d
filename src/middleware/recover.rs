//! Error boundary
//!
//! Converts errors and panics from downstream stages into HTTP error
//! responses so one failing request never takes the server down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use super::{Next, RequestContext, Stage, StageResult};
use crate::error::ServeError;
use crate::http;
use crate::logger::Logger;

pub struct Recover {
    logger: Arc<Logger>,
}

impl Recover {
    pub const fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    fn report(&self, ctx: &RequestContext, error: &ServeError) {
        let status = error.status();
        let target = format!("{} {}", ctx.method(), ctx.request.uri());
        if status.is_server_error() {
            self.logger.error(&format!("{target}: {error}"));
        } else if let ServeError::Forbidden(reason) = error {
            self.logger
                .warn(&format!("{target} from {}: {reason}", ctx.peer_addr.ip()));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl Stage for Recover {
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult {
        let error = match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(error)) => error,
            Err(payload) => ServeError::Panic(panic_message(payload.as_ref())),
        };

        self.report(ctx, &error);
        Ok(http::build_error_response(error.status(), ctx.wants_json()))
    }
}
