//! HTTP collaborator configuration.
//!
//! Points the client at the API under test and describes the few places
//! where commerce backends differ: which verb serves listings, where the
//! join/login endpoint lives, and where the token sits in its response.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// HTTP verb used for listing calls. Listing bodies carry filters, so the
/// usual verb is `PATCH` or `POST` rather than `GET`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMethod {
    #[default]
    Patch,
    Post,
}

impl ListMethod {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Patch => reqwest::Method::PATCH,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl FromStr for ListMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "post" => Ok(Self::Post),
            _ => Err(ConfigError::InvalidListMethod(s.to_string())),
        }
    }
}

/// Configuration for [`HttpApi`](crate::HttpApi).
///
/// Custom `Debug` implementation redacts any password embedded in the base
/// URL.
#[derive(Clone)]
pub struct ClientConfig {
    /// Root every path is resolved against. Always ends with `/`.
    pub base_url: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub list_method: ListMethod,
    /// Authenticate path; `{role}` is replaced with the role name.
    pub auth_path_template: String,
    /// JSON pointer to the bearer token in the authenticate response.
    pub token_pointer: String,
    /// JSON pointer to the actor id in the authenticate response.
    pub actor_id_pointer: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut base_url = self.base_url.clone();
        if base_url.password().is_some() {
            let _ = base_url.set_password(Some("[REDACTED]"));
        }
        f.debug_struct("ClientConfig")
            .field("base_url", &base_url.as_str())
            .field("timeout_secs", &self.timeout_secs)
            .field("list_method", &self.list_method)
            .field("auth_path_template", &self.auth_path_template)
            .field("token_pointer", &self.token_pointer)
            .field("actor_id_pointer", &self.actor_id_pointer)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: with_trailing_slash(base_url),
            timeout_secs: 30,
            list_method: ListMethod::default(),
            auth_path_template: "auth/{role}".into(),
            token_pointer: "/token".into(),
            actor_id_pointer: "/id".into(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `LISTGUARD_BASE_URL` (required)
    /// - `LISTGUARD_TIMEOUT_SECS` (default: 30)
    /// - `LISTGUARD_LIST_METHOD` (`patch` or `post`, default: `patch`)
    /// - `LISTGUARD_AUTH_PATH` (default: `auth/{role}`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup("LISTGUARD_BASE_URL").ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = parse_url("LISTGUARD_BASE_URL", &raw)?;
        let mut config = Self::new(base_url);
        if let Some(secs) = lookup("LISTGUARD_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.timeout_secs = secs;
        }
        if let Some(method) = lookup("LISTGUARD_LIST_METHOD") {
            config.list_method = method.parse()?;
        }
        if let Some(template) = lookup("LISTGUARD_AUTH_PATH") {
            config.auth_path_template = template;
        }
        Ok(config)
    }

    /// Path of the authenticate endpoint for `role`, relative to the base URL.
    pub fn auth_path(&self, role: &str) -> String {
        self.auth_path_template.replace("{role}", role)
    }

    /// Resolve an API path against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl(path.to_string(), e.to_string()))
    }
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LISTGUARD_BASE_URL environment variable is required")]
    MissingBaseUrl,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid list method \"{0}\" (expected patch or post)")]
    InvalidListMethod(String),
}
