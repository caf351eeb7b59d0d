//! Custom response headers
//!
//! Adds `Server` and the configured extra headers to every response,
//! error responses included. Headers a handler already set are left alone.

use async_trait::async_trait;
use hyper::header::{HeaderName, HeaderValue, SERVER};

use super::{Next, RequestContext, Stage, StageResult};
use crate::config::{HttpConfig, LoadError};

pub struct CustomHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl CustomHeaders {
    pub fn from_config(config: &HttpConfig) -> Result<Self, LoadError> {
        let mut headers = Vec::with_capacity(config.custom_headers.len() + 1);
        if !config.server_name.is_empty() {
            headers.push((SERVER, parse_value(&config.server_name)?));
        }

        let mut custom: Vec<_> = config.custom_headers.iter().collect();
        custom.sort();
        for (name, value) in custom {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| LoadError::InvalidHeader(name.clone()))?;
            headers.push((name, parse_value(value)?));
        }
        Ok(Self { headers })
    }
}

fn parse_value(value: &str) -> Result<HeaderValue, LoadError> {
    HeaderValue::from_str(value).map_err(|_| LoadError::InvalidHeader(value.to_string()))
}

#[async_trait]
impl Stage for CustomHeaders {
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult {
        let mut response = next.run(ctx).await?;
        let response_headers = response.headers_mut();
        for (name, value) in &self.headers {
            response_headers
                .entry(name)
                .or_insert_with(|| value.clone());
        }
        Ok(response)
    }
}
