//! Knobs for the HTTP tile session along with validation helpers.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_TILE_URL_TEMPLATE: &str =
    "https://www.marinetraffic.com/getData/get_data_json_4/z:{z}/X:{x}/Y:{y}/station:0";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSessionOptions {
    pub url_template: String,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for HttpSessionOptions {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_URL_TEMPLATE.to_owned(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl HttpSessionOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_url_template(&self.url_template)?;
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.user_agent.trim().is_empty() {
            bail!("user_agent cannot be empty");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be greater than 0");
        }
        Ok(())
    }
}

pub(crate) fn validate_url_template(template: &str) -> Result<()> {
    let template = template.trim();
    if !(template.starts_with("http://") || template.starts_with("https://")) {
        bail!("tile_url_template must start with http:// or https://");
    }
    for placeholder in ["{z}", "{x}", "{y}"] {
        if !template.contains(placeholder) {
            bail!("tile_url_template must contain the {placeholder} placeholder");
        }
    }
    Ok(())
}
