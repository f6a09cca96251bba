//! Client configuration: loading and startup validation.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::secret::Secret;
use crate::transport::CallbackScriptTransport;

/// Marker left in an endpoint that was never filled in at deploy time.
pub const PLACEHOLDER_SCRIPT_URL: &str = "PLACEHOLDER_SCRIPT_URL";
/// Marker left in an API key that was never filled in at deploy time.
pub const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_API_KEY";

const SCRIPT_HOST: &str = "script.google.com";
const SCRIPT_PATH: &str = "/macros/s/";

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_max_url_len() -> usize {
    CallbackScriptTransport::DEFAULT_MAX_URL_LEN
}

/// Everything the client needs to reach the backend.
///
/// Nothing is checked at construction; [`ClientConfig::validate`] runs all
/// startup checks at once and the client refuses to build on any failure.
///
/// # Examples
///
/// ```
/// use reservation_relay::ClientConfig;
///
/// let config = ClientConfig::from_yaml_str(
///     r#"
/// endpoint: https://script.google.com/macros/s/AKfycb/exec
/// origin: https://tutoring.github.io
/// allowed_origins: ["https://tutoring.github.io"]
/// request_timeout_ms: 10000
/// "#,
/// )
/// .unwrap();
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.retry_count, 3);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Script endpoint for form submissions and queries.
    pub endpoint: String,
    /// Separate endpoint for admin operations, if any.
    #[serde(default)]
    pub admin_endpoint: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Read and logged; delivery never retries beyond the fallback.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Origins the client may run from.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Origin stamped on every request.
    pub origin: String,
    /// Shared key forwarded as `apikey`.
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    /// Ceiling on callback-script URL length.
    #[serde(default = "default_max_url_len")]
    pub max_url_len: usize,
    /// Production deployments must run from an https origin.
    #[serde(default)]
    pub production: bool,
}

impl ClientConfig {
    /// A configuration for `endpoint` running from `origin`, which is also
    /// the only allowed origin.
    pub fn new(endpoint: impl Into<String>, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            endpoint: endpoint.into(),
            admin_endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
            retry_count: default_retry_count(),
            allowed_origins: vec![origin.clone()],
            origin,
            api_key: None,
            max_url_len: default_max_url_len(),
            production: false,
        }
    }

    pub fn with_admin_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.admin_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(Secret::new(api_key.into()));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::new(vec![format!("failed to parse configuration: {}", e)]))
    }

    /// Reads and parses a YAML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(vec![format!("failed to read {}: {}", path.display(), e)])
        })?;
        Self::from_yaml_str(&content)
    }

    /// Reads `RELAY_*` environment variables.
    ///
    /// `RELAY_ENDPOINT` and `RELAY_ORIGIN` are mandatory.
    /// `RELAY_ALLOWED_ORIGINS` is comma-separated and defaults to the origin.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut issues = Vec::new();
        let mut required = |key: &str| {
            lookup(key).unwrap_or_else(|| {
                issues.push(format!("{} is not set", key));
                String::new()
            })
        };
        let endpoint = required("RELAY_ENDPOINT");
        let origin = required("RELAY_ORIGIN");

        let mut parsed = |key: &str, default: u64| -> u64 {
            match lookup(key) {
                None => default,
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    issues.push(format!("{} is not a number: {}", key, raw));
                    default
                }),
            }
        };
        let request_timeout_ms = parsed("RELAY_REQUEST_TIMEOUT_MS", default_request_timeout_ms());
        let retry_count = parsed("RELAY_RETRY_COUNT", u64::from(default_retry_count()));
        let max_url_len = parsed("RELAY_MAX_URL_LEN", default_max_url_len() as u64);

        if !issues.is_empty() {
            return Err(ConfigError::new(issues));
        }

        let allowed_origins = match lookup("RELAY_ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![origin.clone()],
        };

        Ok(Self {
            endpoint,
            admin_endpoint: lookup("RELAY_ADMIN_ENDPOINT"),
            request_timeout_ms,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            allowed_origins,
            origin,
            api_key: lookup("RELAY_API_KEY").map(Secret::new),
            max_url_len: usize::try_from(max_url_len).unwrap_or(usize::MAX),
            production: lookup("RELAY_PRODUCTION")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Runs every startup check and reports all failures together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        check_endpoint("endpoint", &self.endpoint, &mut issues);
        if let Some(admin) = &self.admin_endpoint {
            check_endpoint("admin_endpoint", admin, &mut issues);
        }

        if !self.allowed_origins.iter().any(|o| o == &self.origin) {
            issues.push(format!("origin {} is not in allowed_origins", self.origin));
        }

        if let Some(key) = &self.api_key {
            let key = key.expose_secret();
            if key.trim().is_empty() {
                issues.push("api_key is empty".to_string());
            } else if key == PLACEHOLDER_API_KEY {
                issues.push(format!("api_key is still {}", PLACEHOLDER_API_KEY));
            }
        }

        if self.production && !self.origin.starts_with("https://") {
            issues.push(format!("production origin must use https: {}", self.origin));
        }
        if self.request_timeout_ms == 0 {
            issues.push("request_timeout_ms must be positive".to_string());
        }
        if self.max_url_len == 0 {
            issues.push("max_url_len must be positive".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(issues))
        }
    }

    /// The parsed submission endpoint.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_endpoint("endpoint", &self.endpoint)
    }

    /// The parsed admin endpoint, if configured.
    pub fn admin_endpoint_url(&self) -> Result<Option<Url>, ConfigError> {
        self.admin_endpoint
            .as_deref()
            .map(|raw| parse_endpoint("admin_endpoint", raw))
            .transpose()
    }
}

fn parse_endpoint(label: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw)
        .map_err(|e| ConfigError::new(vec![format!("{} is not a valid URL: {}", label, e)]))
}

fn check_endpoint(label: &str, raw: &str, issues: &mut Vec<String>) {
    if raw.trim().is_empty() {
        issues.push(format!("{} is empty", label));
        return;
    }
    if raw.contains(PLACEHOLDER_SCRIPT_URL) {
        issues.push(format!("{} is still {}", label, PLACEHOLDER_SCRIPT_URL));
        return;
    }
    let url = match parse_endpoint(label, raw) {
        Ok(url) => url,
        Err(e) => {
            issues.extend(e.issues().iter().cloned());
            return;
        }
    };
    if url.scheme() != "https" {
        issues.push(format!("{} must use https", label));
    }
    if url.host_str() != Some(SCRIPT_HOST) {
        issues.push(format!("{} host must be {}", label, SCRIPT_HOST));
    }
    if !url.path().contains(SCRIPT_PATH) {
        issues.push(format!("{} path must contain {}", label, SCRIPT_PATH));
    }
}
