//! Remote endpoint configuration consumed by the sync engine.
//!
//! The engine never owns credentials; callers construct a `RemoteConfig`
//! (or load one from the environment) and hand it to the adapter. Rotating
//! credentials means constructing a new adapter, not mutating shared state.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const ENV_SYNC_URL: &str = "WAKEEL_SYNC_URL";
const ENV_SYNC_KEY: &str = "WAKEEL_SYNC_KEY";
const ENV_SYNC_BUCKET: &str = "WAKEEL_SYNC_BUCKET";
const ENV_OWNER_ID: &str = "WAKEEL_OWNER_ID";

/// Default object-storage bucket for case document blobs.
pub const DEFAULT_DOCUMENT_BUCKET: &str = "case-documents";

/// Remote backend configuration.
///
/// Presence of `url` + `api_key` is what distinguishes "unconfigured"
/// (local-only mode) from a syncable installation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Backend base URL (e.g. `https://project.example.co`)
    pub url: Option<String>,
    /// Service key used for both REST and storage calls
    pub api_key: Option<String>,
    /// Object-storage bucket holding document blobs
    pub bucket: String,
    /// Scope identifier stamped onto every uploaded row
    pub owner_id: Option<String>,
}

impl RemoteConfig {
    /// Create a configuration for the given endpoint and key.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            api_key: Some(api_key.into()),
            bucket: DEFAULT_DOCUMENT_BUCKET.to_string(),
            owner_id: None,
        }
    }

    /// Set the scope identifier injected into upload rows.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Set the object-storage bucket for document blobs.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Check if sync is configured.
    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no sync variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        let url = normalize_text_option(env::var(ENV_SYNC_URL).ok());
        let api_key = normalize_text_option(env::var(ENV_SYNC_KEY).ok());

        match (url, api_key) {
            (None, None) => Ok(None),
            (Some(url), Some(api_key)) => {
                if !is_http_url(&url) {
                    return Err(Error::InvalidInput(format!(
                        "{ENV_SYNC_URL} must include http:// or https://"
                    )));
                }
                let bucket = normalize_text_option(env::var(ENV_SYNC_BUCKET).ok())
                    .unwrap_or_else(|| DEFAULT_DOCUMENT_BUCKET.to_string());
                Ok(Some(Self {
                    url: Some(url.trim_end_matches('/').to_string()),
                    api_key: Some(api_key),
                    bucket,
                    owner_id: normalize_text_option(env::var(ENV_OWNER_ID).ok()),
                }))
            }
            _ => Err(Error::InvalidInput(format!(
                "both {ENV_SYNC_URL} and {ENV_SYNC_KEY} must be set to enable sync"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_is_configured() {
        let config = RemoteConfig::new("https://backend.example.co", "service-key");
        assert!(config.is_configured());
        assert_eq!(config.bucket, DEFAULT_DOCUMENT_BUCKET);
    }

    #[test]
    fn default_config_is_not_configured() {
        let config = RemoteConfig::default();
        assert!(!config.is_configured());
    }

    #[test]
    fn with_owner_sets_scope() {
        let config = RemoteConfig::new("https://backend.example.co", "key").with_owner("owner-1");
        assert_eq!(config.owner_id.as_deref(), Some("owner-1"));
    }
}
