use crate::errors::ClientError;

pub const API_KEY_ENV: &str = "TINYFISH_API_KEY";

/// Source of the API key sent in the `X-API-Key` header.
///
/// Called once per request so rotating providers take effect immediately.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Result<String, ClientError>;
}

/// A fixed API key.
#[derive(Clone)]
pub struct StaticApiKey(String);

impl StaticApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ClientError> {
        let key = key.into();
        check_key(&key)?;
        Ok(Self(key))
    }
}

impl std::fmt::Debug for StaticApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticApiKey(<redacted>)")
    }
}

impl CredentialProvider for StaticApiKey {
    fn api_key(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

/// Reads the API key from an environment variable on every call.
#[derive(Clone, Debug)]
pub struct EnvApiKey {
    var: String,
}

impl EnvApiKey {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvApiKey {
    fn default() -> Self {
        Self::new(API_KEY_ENV)
    }
}

impl CredentialProvider for EnvApiKey {
    fn api_key(&self) -> Result<String, ClientError> {
        let key = std::env::var(&self.var).unwrap_or_default();
        check_key(&key).map_err(|_| ClientError::Config(format!("missing {}", self.var)))?;
        Ok(key)
    }
}

fn check_key(key: &str) -> Result<(), ClientError> {
    if key.trim().is_empty() {
        return Err(ClientError::Config("API key is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_key_rejects_blank_and_redacts_debug() {
        assert!(matches!(
            StaticApiKey::new("  "),
            Err(ClientError::Config(msg)) if msg == "API key is required"
        ));
        let key = StaticApiKey::new("sk-secret").expect("key");
        assert_eq!(key.api_key().expect("api key"), "sk-secret");
        assert!(!format!("{key:?}").contains("sk-secret"));
    }

    #[test]
    fn env_key_reports_missing_variable() {
        let provider = EnvApiKey::new("WEBAGENT_CLIENT_TEST_KEY_THAT_IS_NEVER_SET");
        assert!(matches!(
            provider.api_key(),
            Err(ClientError::Config(msg)) if msg.contains("WEBAGENT_CLIENT_TEST_KEY_THAT_IS_NEVER_SET")
        ));
    }
}
