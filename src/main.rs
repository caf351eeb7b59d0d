use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

mod config;
mod error;
mod handler;
mod http;
mod logger;
mod middleware;
mod server;

/// Configuration file used when none is given, extension optional
const DEFAULT_CONFIG_PATH: &str = "config";

fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[ERROR] Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let logger = match logger::Logger::from_config(&cfg.logging) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            eprintln!("[ERROR] Failed to open log files: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Tokio runtime, thread count from the workers setting
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = match runtime_builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            logger.error(&format!("Failed to start runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async_main(cfg, logger))
}

async fn async_main(cfg: config::Config, logger: Arc<logger::Logger>) -> ExitCode {
    let addr = match cfg.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            logger.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    if !Path::new(&cfg.static_files.public_dir).is_dir() {
        logger.warn(&format!(
            "Public directory '{}' does not exist, every static request will 404",
            cfg.static_files.public_dir
        ));
    }

    let listener = match server::create_listener(addr) {
        Ok(listener) => listener,
        Err(e) => {
            logger.error(&format!("Failed to bind {addr}: {e}"));
            return ExitCode::FAILURE;
        }
    };
    let local_addr = listener.local_addr().unwrap_or(addr);

    let state = match config::AppState::new(cfg, Arc::clone(&logger)) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            logger.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    logger.log_server_start(&local_addr, &state.config);
    server::run_server(listener, state, server::shutdown_signal(Arc::clone(&logger))).await;
    logger.info("Server stopped");
    ExitCode::SUCCESS
}
