use std::fmt;
use std::time::Duration;

use crate::errors::ClientError;

/// Browser flavour the remote agent drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserProfile {
    /// Fast standard browser for sites without bot protection.
    #[default]
    Lite,
    /// Anti-detection browser; slower, pair with a proxy for best results.
    Stealth,
}

/// Countries the geographic proxy can exit from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyCountry {
    Au,
    Ca,
    Fr,
    De,
    Jp,
    Gb,
    Us,
}

impl ProxyCountry {
    pub const ALL: [ProxyCountry; 7] = [
        Self::Au,
        Self::Ca,
        Self::Fr,
        Self::De,
        Self::Jp,
        Self::Gb,
        Self::Us,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Au => "AU",
            Self::Ca => "CA",
            Self::Fr => "FR",
            Self::De => "DE",
            Self::Jp => "JP",
            Self::Gb => "GB",
            Self::Us => "US",
        }
    }

    pub fn parse(code: &str) -> Result<Self, ClientError> {
        let upper = code.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.code() == upper)
            .ok_or_else(|| ClientError::Validation(format!("unsupported proxy country: {code}")))
    }
}

impl fmt::Display for ProxyCountry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Proxy settings sent as `proxy_config`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProxyConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country_code: Option<ProxyCountry>,
}

/// One automation job: where to go and what to do there.
///
/// Built through [`RunRequest::builder`], which validates the url and goal.
/// Serializes to the JSON body shared by every run endpoint.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RunRequest {
    url: String,
    goal: String,
    browser_profile: BrowserProfile,
    #[serde(rename = "proxy_config", skip_serializing_if = "Option::is_none")]
    proxy: Option<ProxyConfig>,
}

impl RunRequest {
    pub fn builder(url: impl Into<String>, goal: impl Into<String>) -> RunRequestBuilder {
        RunRequestBuilder {
            url: url.into(),
            goal: goal.into(),
            browser_profile: BrowserProfile::default(),
            proxy_enabled: false,
            proxy_country: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn browser_profile(&self) -> BrowserProfile {
        self.browser_profile
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    /// JSON body for the run endpoints.
    pub fn to_payload(&self) -> Result<serde_json::Value, ClientError> {
        serde_json::to_value(self)
            .map_err(|e| ClientError::Validation(format!("failed to serialize run request: {e}")))
    }
}

/// Builder for [`RunRequest`].
#[derive(Clone, Debug)]
pub struct RunRequestBuilder {
    url: String,
    goal: String,
    browser_profile: BrowserProfile,
    proxy_enabled: bool,
    proxy_country: Option<ProxyCountry>,
}

impl RunRequestBuilder {
    pub fn browser_profile(mut self, profile: BrowserProfile) -> Self {
        self.browser_profile = profile;
        self
    }

    /// Routes the browser through a proxy, optionally pinned to a country.
    pub fn proxy(mut self, country: Option<ProxyCountry>) -> Self {
        self.proxy_enabled = true;
        self.proxy_country = country;
        self
    }

    pub fn build(self) -> Result<RunRequest, ClientError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ClientError::Validation("url is required".into()));
        }
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ClientError::Validation(format!("url must be absolute ({e}): {url}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Validation(format!(
                "url must use http or https: {url}"
            )));
        }
        if self.goal.trim().is_empty() {
            return Err(ClientError::Validation("goal is required".into()));
        }

        let proxy = self.proxy_enabled.then_some(ProxyConfig {
            enabled: true,
            country_code: self.proxy_country,
        });
        Ok(RunRequest {
            url: url.to_string(),
            goal: self.goal,
            browser_profile: self.browser_profile,
            proxy,
        })
    }
}

/// Client-side deadline for a streamed run, in whole seconds within
/// [`StreamTimeout::MIN_SECS`, `StreamTimeout::MAX_SECS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct StreamTimeout(u64);

impl StreamTimeout {
    pub const MIN_SECS: u64 = 30;
    pub const MAX_SECS: u64 = 600;
    pub const DEFAULT_SECS: u64 = 300;

    pub fn new(secs: u64) -> Result<Self, ClientError> {
        if !(Self::MIN_SECS..=Self::MAX_SECS).contains(&secs) {
            return Err(ClientError::Validation(format!(
                "timeout must be between {} and {} seconds, got {secs}",
                Self::MIN_SECS,
                Self::MAX_SECS
            )));
        }
        Ok(Self(secs))
    }

    /// Saturates out-of-range values to the nearest bound.
    pub fn clamped(secs: u64) -> Self {
        Self(secs.clamp(Self::MIN_SECS, Self::MAX_SECS))
    }

    pub fn secs(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for StreamTimeout {
    fn default() -> Self {
        Self(Self::DEFAULT_SECS)
    }
}

impl TryFrom<u64> for StreamTimeout {
    type Error = ClientError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamTimeout> for u64 {
    fn from(value: StreamTimeout) -> Self {
        value.0
    }
}
