pub mod git_service;
pub mod ledger;

use std::time::Duration;

use crate::error::{CollectorError, Result};

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("contrib-engine/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(CollectorError::from)
}

pub(crate) fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(CollectorError::ConfigError(format!(
            "service URL must start with http:// or https://, got '{}'",
            base_url
        )));
    }
    Ok(trimmed.to_string())
}

/// Error body for logging, truncated to 512 bytes.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let mut text = response.text().await.unwrap_or_default();
    if text.len() > 512 {
        let mut cut = 512;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
