//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality, decoupled from the
//! pipeline and the handlers that use it.

pub mod cache;
pub mod compress;
pub mod mime;
pub mod response;

// Re-export commonly used items
pub use cache::CACHE_TIME;
pub use response::{
    build_304_response, build_error_response, build_file_response, build_health_response,
    build_options_response, build_redirect_response,
};
