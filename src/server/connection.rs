// Connection handling module
// Serves one accepted TCP connection on its own task

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler;

/// Serve an accepted connection in a spawned task.
///
/// The connection is registered with `graceful` so shutdown can wait for
/// in-flight requests to finish.
pub fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    graceful: &GracefulShutdown,
) {
    let io = TokioIo::new(stream);
    let performance = &state.config.performance;

    let mut builder = http1::Builder::new();
    builder.keep_alive(performance.keep_alive);
    if performance.request_timeout > 0 {
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(Duration::from_secs(performance.request_timeout));
    }

    let service_state = Arc::clone(state);
    let conn = builder.serve_connection(
        io,
        service_fn(move |req| {
            handler::handle_request(req, peer_addr, Arc::clone(&service_state))
        }),
    );
    let conn = graceful.watch(conn);

    let logger = Arc::clone(&state.logger);
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            // Clients hanging up mid-request are routine
            if !err.is_incomplete_message() {
                logger.log_connection_error(&err);
            }
        }
    });
}
