use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::archive::explode;
use crate::config::{Config, DOWNLOAD_TIMEOUT};
use crate::contract::UnpackedEntry;
use crate::error::UnpackError;
use crate::sanitize::{is_raw_archive_name, sanitize_member_name};

const FALLBACK_NAME: &str = "download";

static FILENAME_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)filename\*\s*=\s*([^;]+)").expect("valid regex"));
static FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)filename\s*=\s*([^;]+)").expect("valid regex"));

/// Extract a filename from a `Content-Disposition` header value.
///
/// The RFC 5987 `filename*=` form is preferred and percent-decoded.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    if let Some(caps) = FILENAME_EXT.captures(value) {
        let raw = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
        let encoded = raw.split_once("''").map(|(_, v)| v).unwrap_or(raw);
        return Some(percent_decode_str(encoded).decode_utf8_lossy().into_owned());
    }
    FILENAME.captures(value).map(|caps| {
        caps[1]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string()
    })
}

fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path().rsplit('/').next()?;
    let decoded = percent_decode_str(last).decode_utf8_lossy().into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

/// Downloads exactly one HTTP(S) resource with a byte cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    user_agent: String,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            user_agent: user_agent.into(),
            max_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.user_agent.clone(), config.max_download_bytes)
    }

    fn size_error(&self, url: &str) -> UnpackError {
        UnpackError::SizeLimitExceeded {
            url: url.to_string(),
            limit_mb: self.max_bytes / (1024 * 1024),
        }
    }

    /// GET `url`, following redirects, and return the sanitised filename and body.
    ///
    /// Fails with [`UnpackError::SizeLimitExceeded`] as soon as the body would
    /// exceed the cap; nothing is returned in that case.
    pub async fn fetch(&self, url: &str) -> Result<(String, Bytes), UnpackError> {
        let client = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| UnpackError::from_reqwest(url, e))?;

        info!(url = url, "Starting download");
        let mut response = client
            .get(url)
            .send()
            .await
            .map_err(|e| UnpackError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "Download returned error status");
            return Err(UnpackError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_content_disposition);
        let raw_name = disposition
            .or_else(|| filename_from_url(response.url()))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let mut filename = sanitize_member_name(&raw_name);
        if filename.is_empty() {
            filename = FALLBACK_NAME.to_string();
        }

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            warn!(url = url, limit = self.max_bytes, "Declared length exceeds download cap");
            return Err(self.size_error(url));
        }

        let mut buffer = BytesMut::new();
        let mut total: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| UnpackError::from_reqwest(url, e))?
        {
            total += chunk.len() as u64;
            if total > self.max_bytes {
                warn!(url = url, limit = self.max_bytes, "Download aborted at size cap");
                return Err(self.size_error(url));
            }
            buffer.extend_from_slice(&chunk);
        }

        info!(url = url, filename = %filename, size = total, "Download finished");
        Ok((filename, buffer.freeze()))
    }

    /// [`fetch`](Self::fetch), exploding the body when the resolved name is a raw archive.
    pub async fn fetch_entries(&self, url: &str) -> Result<Vec<UnpackedEntry>, UnpackError> {
        let (filename, data) = self.fetch(url).await?;
        if !is_raw_archive_name(&filename) {
            return Ok(vec![UnpackedEntry::new(filename, data)]);
        }
        debug!(filename = %filename, "Exploding downloaded archive");
        tokio::task::spawn_blocking(move || explode(&filename, data))
            .await
            .map_err(|e| UnpackError::Task(e.to_string()))?
    }
}
