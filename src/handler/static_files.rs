//! Static file serving module
//!
//! Resolves request paths under a root directory, loads the file and builds
//! the response: content type, `ETag`/304, gzip and the default
//! `Cache-Time` for the expiration cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::IF_NONE_MATCH;
use hyper::Response;
use percent_encoding::percent_decode_str;
use tokio::fs;

use crate::config::StaticConfig;
use crate::error::ServeError;
use crate::http::{self, cache, compress, mime};
use crate::logger::Logger;
use crate::middleware::RequestContext;

pub struct StaticFiles {
    index_files: Vec<String>,
    compress: bool,
    default_cache_time: u64,
    logger: Arc<Logger>,
}

impl StaticFiles {
    pub fn new(config: &StaticConfig, logger: Arc<Logger>) -> Self {
        Self {
            index_files: config.index_files.clone(),
            compress: config.compress,
            default_cache_time: config.default_cache_time,
            logger,
        }
    }

    /// Serve `request_path` from under `root`
    ///
    /// `cache_time` comes from a more specific route and takes precedence
    /// over the default lifetime.
    pub async fn serve_directory(
        &self,
        ctx: &RequestContext,
        root: &Path,
        request_path: &str,
        cache_time: Option<u64>,
    ) -> Result<Response<Full<Bytes>>, ServeError> {
        let file_path = match resolve_path(root, request_path, &self.index_files).await {
            Err(ServeError::Forbidden(reason)) => {
                return Err(ServeError::Forbidden(format!("{request_path}: {reason}")));
            }
            other => other?,
        };
        self.serve_file(ctx, &file_path, cache_time).await
    }

    /// Serve a single file
    pub async fn serve_file(
        &self,
        ctx: &RequestContext,
        file_path: &Path,
        cache_time: Option<u64>,
    ) -> Result<Response<Full<Bytes>>, ServeError> {
        let content = fs::read(file_path).await.map_err(|e| {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.logger.error(&format!(
                    "Failed to read file '{}': {e}",
                    file_path.display()
                ));
            }
            ServeError::Io(e)
        })?;

        let mut response = self.build_response(ctx, content, mime::content_type_for(file_path))?;

        if let Some(seconds) = cache_time {
            cache::set_cache_time(&mut response, seconds);
        }
        cache::default_cache_time(&mut response, self.default_cache_time);
        Ok(response)
    }

    fn build_response(
        &self,
        ctx: &RequestContext,
        content: Vec<u8>,
        content_type: &'static str,
    ) -> Result<Response<Full<Bytes>>, ServeError> {
        let gzip = self.compress
            && content.len() >= compress::MIN_COMPRESS_SIZE
            && mime::is_compressible(content_type)
            && compress::accepts_gzip(ctx.request.headers());

        let etag = cache::generate_etag(&content);
        let etag = if gzip {
            cache::variant_etag(&etag, "gzip")
        } else {
            etag
        };

        if cache::check_etag_match(ctx.header(IF_NONE_MATCH), &etag) {
            return Ok(http::build_304_response(&etag)?);
        }

        let (body, encoding) = if gzip {
            (compress::gzip(&content)?, Some("gzip"))
        } else {
            (content, None)
        };

        Ok(http::build_file_response(
            Bytes::from(body),
            content_type,
            &etag,
            encoding,
            ctx.is_head(),
        )?)
    }
}

/// Map a request path onto a file under `root`
///
/// Rejects `..` segments, NUL bytes, backslashes and anything whose
/// canonical path (after following symlinks) leaves the canonical root.
/// Directories resolve through `index_files`.
pub async fn resolve_path(
    root: &Path,
    request_path: &str,
    index_files: &[String],
) -> Result<PathBuf, ServeError> {
    let decoded = percent_decode_str(request_path)
        .decode_utf8()
        .map_err(|_| ServeError::BadRequest("path is not valid UTF-8".to_string()))?;

    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(ServeError::Forbidden("parent directory segment".to_string())),
            s if s.contains(['\0', '\\']) => {
                return Err(ServeError::Forbidden("invalid character in path".to_string()));
            }
            s => relative.push(s),
        }
    }

    let root = fs::canonicalize(root).await?;
    let mut candidate = root.join(&relative);

    if fs::metadata(&candidate).await?.is_dir() {
        let mut index = None;
        for name in index_files {
            let path = candidate.join(name);
            if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                index = Some(path);
                break;
            }
        }
        candidate = index.ok_or(ServeError::NotFound)?;
    }

    let canonical = fs::canonicalize(&candidate).await?;
    if !canonical.starts_with(&root) {
        return Err(ServeError::Forbidden(format!(
            "resolves outside the root to {}",
            canonical.display()
        )));
    }
    Ok(canonical)
}
