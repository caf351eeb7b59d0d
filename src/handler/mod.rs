//! Request handler module
//!
//! Connection-facing entry point: strips the request body and hands the
//! request to the shared pipeline. Routing and static file serving live in
//! the submodules.

pub mod router;
pub mod static_files;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};

use crate::config::AppState;

pub use router::Router;

/// Main request handler for one HTTP request on a connection
pub async fn handle_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    // Bodies are never read; GET and HEAD carry none
    let (parts, _body) = req.into_parts();
    Ok(state
        .dispatch(Request::from_parts(parts, ()), peer_addr)
        .await)
}
