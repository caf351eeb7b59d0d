// Server loop module
// Accepts connections until shutdown, then drains in-flight connections

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;

use super::connection::serve_connection;
use crate::config::AppState;

/// Run the accept loop until `shutdown` resolves.
///
/// After shutdown the listener is closed and open connections get up to
/// `performance.shutdown_timeout` seconds to finish.
pub async fn run_server(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) {
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        serve_connection(stream, peer_addr, &state, &graceful);
                    }
                    Err(e) => {
                        state.logger.error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }
            () = &mut shutdown => break,
        }
    }

    drop(listener);
    let timeout = Duration::from_secs(state.config.performance.shutdown_timeout);
    tokio::select! {
        () = graceful.shutdown() => state.logger.info("All connections closed"),
        () = tokio::time::sleep(timeout) => {
            state.logger.warn(&format!(
                "Shutdown timed out after {}s, dropping open connections",
                timeout.as_secs()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::logger::testing::capture;
    use crate::logger::Timezone;
    use crate::server::create_listener;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn raw_get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: itest\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let public = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("index.html"), "hello over tcp").unwrap();

        let mut env = HashMap::new();
        env.insert(
            "PUBLIC_DIR".to_string(),
            public.path().to_str().unwrap().to_string(),
        );
        let config = Config::load_with_env("does-not-exist/config", env).unwrap();
        let (logger, access, _) = capture(Timezone::default());
        let state = Arc::new(AppState::new(config, Arc::new(logger)).unwrap());

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(run_server(listener, state, async {
            let _ = stop_rx.await;
        }));

        let response = raw_get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.to_ascii_lowercase().contains("cache-time: 86400"));
        assert!(response.ends_with("hello over tcp"));

        let missing = raw_get(addr, "/nope").await;
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

        stop_tx.send(()).unwrap();
        server.await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());

        let lines = access.lines();
        assert!(lines[0].ends_with(" - 200 GET / itest"), "{lines:?}");
        assert!(lines[1].ends_with(" - 404 GET /nope itest"), "{lines:?}");
    }
}
