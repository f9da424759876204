pub mod config;
pub mod dataframeutils;
pub mod endpoints;
pub mod error;
pub mod hybrid;
pub mod io;
pub mod service;

use tracing_subscriber::EnvFilter;

pub use error::{RecoError, Result};

/// Installs the fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
