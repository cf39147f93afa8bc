use std::sync::OnceLock;

use tracing::debug;

use crate::config::HttpConfig;
use crate::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` used for segment transfers.
///
/// No overall request timeout is set: a segment can legitimately take longer
/// than any fixed bound, so stalls are caught by the read timeout instead.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(8);

    let connect_timeout = config.connect_timeout();
    if !connect_timeout.is_zero() {
        builder = builder.connect_timeout(connect_timeout);
    }

    let read_timeout = config.read_timeout();
    if !read_timeout.is_zero() {
        builder = builder.read_timeout(read_timeout);
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}
