// Configuration module entry point
// Loads application configuration and holds the runtime state built from it

mod state;
mod types;

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};

// Re-export public types
pub use state::AppState;
pub use types::{Config, HealthConfig, HttpConfig, LoggingConfig, RouteHandler, StaticConfig};

/// Prefix of the structured environment variables, e.g. `STATICD__SERVER__PORT`
const ENV_PREFIX: &str = "STATICD";

/// Short environment variables that override everything else
const SHORT_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("PUBLIC_DIR", "static_files.public_dir"),
    ("TIMEZONE", "logging.timezone"),
    ("ALLOW_ORIGINS", "http.allow_origins"),
    ("PROXY_HEADER", "http.proxy_header"),
];

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid listen address '{addr}': {reason}")]
    Address { addr: String, reason: String },
    #[error("invalid custom header '{0}'")]
    InvalidHeader(String),
}

impl Config {
    /// Load configuration from the given file path (without extension) and the process environment
    pub fn load(config_path: &str) -> Result<Self, LoadError> {
        Self::load_with_env(config_path, std::env::vars().collect())
    }

    /// Load configuration from the given file path and an explicit environment map
    pub fn load_with_env(
        config_path: &str,
        env: HashMap<String, String>,
    ) -> Result<Self, LoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("static_files.public_dir", "public")?
            .set_default("static_files.compress", true)?
            .set_default("static_files.default_cache_time", 86_400)?
            .set_default("http.server_name", "staticd")?
            .set_default("http.allow_origins", "")?
            .set_default("http.proxy_header", "")?
            .set_default("logging.timezone", "UTC")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "default")?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.request_timeout", 30)?
            .set_default("performance.shutdown_timeout", 10)?;

        for (var, key) in SHORT_ENV_OVERRIDES {
            builder = builder.set_override_option(*key, env.get(*var).cloned())?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.socket_addr()?;
        Ok(config)
    }

    /// Resolve `host:port` into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, LoadError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        let invalid = |reason: String| LoadError::Address {
            addr: addr.clone(),
            reason,
        };
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no addresses".to_string()))
    }
}

impl HttpConfig {
    /// Configured CORS origins, empty when CORS is disabled
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allow_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Header trusted for the client IP, if proxy headers are trusted at all
    pub fn trusted_proxy_header(&self) -> Option<&str> {
        let header = self.proxy_header.trim();
        (!header.is_empty()).then_some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Timezone;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Config, LoadError> {
        Config::load_with_env("does-not-exist/config", env(pairs))
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.static_files.public_dir, "public");
        assert_eq!(cfg.static_files.default_cache_time, 86_400);
        assert_eq!(cfg.static_files.index_files, vec!["index.html", "index.htm"]);
        assert_eq!(cfg.logging.timezone, Timezone::Named(chrono_tz::UTC));
        assert!(cfg.http.allowed_origins().is_empty());
        assert!(cfg.http.trusted_proxy_header().is_none());
        assert!(cfg.routes.health.enabled);
        assert_eq!(cfg.routes.health.path, "/healthz");
    }

    #[test]
    fn test_short_env_overrides() {
        let cfg = load(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9090"),
            ("PUBLIC_DIR", "/srv/www"),
            ("TIMEZONE", "Asia/Jakarta"),
            ("ALLOW_ORIGINS", "https://a.example, https://b.example"),
            ("PROXY_HEADER", "X-Forwarded-For"),
        ])
        .unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.static_files.public_dir, "/srv/www");
        assert_eq!(
            cfg.logging.timezone,
            Timezone::Named(chrono_tz::Asia::Jakarta)
        );
        assert_eq!(
            cfg.http.allowed_origins(),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(cfg.http.trusted_proxy_header(), Some("X-Forwarded-For"));
    }

    #[test]
    fn test_prefixed_env() {
        let cfg = load(&[
            ("STATICD__SERVER__PORT", "7000"),
            ("STATICD__STATIC_FILES__COMPRESS", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.server.port, 7000);
        assert!(!cfg.static_files.compress);
    }

    #[test]
    fn test_short_env_wins_over_prefixed() {
        let cfg = load(&[("STATICD__SERVER__PORT", "7000"), ("PORT", "7001")]).unwrap();
        assert_eq!(cfg.server.port, 7001);
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let err = load(&[("TIMEZONE", "Mars/Olympus_Mons")]).unwrap_err();
        assert!(matches!(err, LoadError::Config(_)));
        assert!(err.to_string().contains("Mars/Olympus_Mons"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(load(&[("PORT", "not-a-port")]).is_err());
    }

    #[test]
    fn test_routes_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staticd.toml");
        std::fs::write(
            &path,
            r#"
[routes.health]
path = "/ping"

[routes.custom_routes."/docs"]
type = "dir"
path = "/srv/docs"
cache_time = 60

[routes.custom_routes."/old"]
type = "redirect"
target = "/"
"#,
        )
        .unwrap();

        let cfg = Config::load_with_env(path.to_str().unwrap(), HashMap::new()).unwrap();
        assert_eq!(cfg.routes.health.path, "/ping");
        assert_eq!(
            cfg.routes.custom_routes["/docs"],
            RouteHandler::Dir {
                path: "/srv/docs".to_string(),
                cache_time: Some(60),
            }
        );
        assert_eq!(
            cfg.routes.custom_routes["/old"],
            RouteHandler::Redirect {
                target: "/".to_string(),
                code: 302,
            }
        );
    }

    #[test]
    fn test_socket_addr() {
        let cfg = load(&[("HOST", "127.0.0.1"), ("PORT", "8123")]).unwrap();
        assert_eq!(
            cfg.socket_addr().unwrap(),
            "127.0.0.1:8123".parse::<SocketAddr>().unwrap()
        );
    }
}
