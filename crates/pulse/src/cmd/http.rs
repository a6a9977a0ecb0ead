//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use serde::Deserialize;

use pulse_transfer::link;

/// HTTP base of a relay given in `ws://` or `wss://` form.
pub fn base_url(relay_url: &str) -> String {
    link::http_base(relay_url)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to reach relay at {url}; is it running?"))?
        .error_for_status()
        .with_context(|| format!("relay returned an error for {url}"))?
        .json::<T>()
        .await
        .context("failed to parse response")
}
