//! Connection settings shared by every request issued through one client.
//!
//! [`ConnectionSettings`] is validated once when it is built and is read-only
//! afterwards. Collaborators that load configuration from files can deserialize
//! a [`ConnectionConfig`] and convert it with `TryFrom`.

use crate::retry::{Backoff, RetryAttempts};
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// The timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved connection settings for one API.
///
/// # Examples
///
/// ```
/// use restbind::ConnectionSettings;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), restbind::Error> {
/// let settings = ConnectionSettings::builder()
///     .base_address("https://api.example.com/")?
///     .resource_path_prefix("api")
///     .timeout(Duration::from_secs(10))
///     .retry_attempts(3)
///     .build()?;
///
/// assert_eq!(settings.retry_attempts().total_attempts(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    base_address: Url,
    resource_name: Option<String>,
    resource_path_prefix: Option<String>,
    timeout: Duration,
    retry_attempts: RetryAttempts,
    backoff: Backoff,
    default_headers: HeaderMap,
}

impl ConnectionSettings {
    /// Creates a new `ConnectionSettingsBuilder`.
    pub fn builder() -> ConnectionSettingsBuilder {
        ConnectionSettingsBuilder::new()
    }

    /// The absolute base address. Its path always ends with `/`.
    pub fn base_address(&self) -> &Url {
        &self.base_address
    }

    /// Overrides the resource name declared by the schema, if set.
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// Path segments placed before the resource name, if any.
    pub fn resource_path_prefix(&self) -> Option<&str> {
        self.resource_path_prefix.as_deref()
    }

    /// Wall-clock timeout for a single attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The attempt budget for transient failures.
    pub fn retry_attempts(&self) -> RetryAttempts {
        self.retry_attempts
    }

    /// The delay policy between attempts.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }
}

/// Builder for [`ConnectionSettings`].
///
/// Every value is validated: the base address when it is set, the rest in
/// [`build`](ConnectionSettingsBuilder::build).
#[derive(Debug, Clone)]
pub struct ConnectionSettingsBuilder {
    base_address: Option<Url>,
    resource_name: Option<String>,
    resource_path_prefix: Option<String>,
    timeout: Duration,
    retry_attempts: u32,
    backoff: Backoff,
    default_headers: HeaderMap,
}

impl ConnectionSettingsBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            base_address: None,
            resource_name: None,
            resource_path_prefix: None,
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: 0,
            backoff: Backoff::None,
            default_headers: HeaderMap::new(),
        }
    }

    /// Sets the base address for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not an absolute `http`/`https` URL or
    /// if its path does not end with `/`.
    pub fn base_address(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "Base address must be an absolute http(s) URL, got `{}`",
                url
            )));
        }
        if !url.path().ends_with('/') {
            return Err(Error::Configuration(format!(
                "Base address must end with '/', got `{}`",
                url
            )));
        }
        self.base_address = Some(url);
        Ok(self)
    }

    /// Overrides the resource name declared by the schema.
    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    /// Sets path segments placed before the resource name.
    pub fn resource_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_path_prefix = Some(prefix.into());
        self
    }

    /// Sets the per-attempt timeout. Must be positive.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the attempt budget. Must be `0` or within `1..=5`.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the delay policy between attempts.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Adds a header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no base address was provided, the timeout is zero,
    /// or the retry budget is out of range.
    pub fn build(self) -> Result<ConnectionSettings> {
        let base_address = self
            .base_address
            .ok_or_else(|| Error::Configuration("Base address is required".to_string()))?;

        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "Timeout must be greater than zero".to_string(),
            ));
        }

        let retry_attempts = RetryAttempts::new(self.retry_attempts)?;

        Ok(ConnectionSettings {
            base_address,
            resource_name: self.resource_name.filter(|name| !name.trim().is_empty()),
            resource_path_prefix: self
                .resource_path_prefix
                .filter(|prefix| !prefix.trim_matches('/').is_empty()),
            timeout: self.timeout,
            retry_attempts,
            backoff: self.backoff,
            default_headers: self.default_headers,
        })
    }
}

impl Default for ConnectionSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Serializable form of [`ConnectionSettings`].
///
/// # Examples
///
/// ```
/// use restbind::{ConnectionConfig, ConnectionSettings};
///
/// let config: ConnectionConfig = serde_json::from_str(
///     r#"{ "base_address": "https://api.example.com/", "retry_attempts": 2 }"#,
/// ).unwrap();
///
/// let settings = ConnectionSettings::try_from(config).unwrap();
/// assert_eq!(settings.timeout().as_secs(), 30);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Absolute base address ending with `/`.
    pub base_address: String,
    /// Overrides the schema's resource name.
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Segments placed before the resource name.
    #[serde(default)]
    pub resource_path_prefix: Option<String>,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempt budget: 0 disables retries, otherwise 1 to 5.
    #[serde(default)]
    pub retry_attempts: u32,
    /// Headers sent with every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

impl TryFrom<ConnectionConfig> for ConnectionSettings {
    type Error = Error;

    fn try_from(config: ConnectionConfig) -> Result<Self> {
        let mut builder = ConnectionSettings::builder()
            .base_address(&config.base_address)?
            .timeout(Duration::from_secs(config.timeout_secs))
            .retry_attempts(config.retry_attempts);

        if let Some(name) = config.resource_name {
            builder = builder.resource_name(name);
        }
        if let Some(prefix) = config.resource_path_prefix {
            builder = builder.resource_path_prefix(prefix);
        }
        for (name, value) in &config.default_headers {
            builder = builder.default_header(name, value)?;
        }

        builder.build()
    }
}
