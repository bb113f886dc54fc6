use tracing::warn;

/// Source of the API credential for the remote service.
///
/// Injected into the session so the core never reaches into ambient global
/// state; platform keychains or secret managers implement this trait.
pub trait CredentialStore: Send + Sync {
    /// Return the credential, or None if it has not been provisioned.
    fn get(&self) -> Option<String>;
}

/// Reads the credential from an environment variable.
pub struct EnvCredentialStore {
    var_name: String,
}

impl EnvCredentialStore {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new("LOQA_LIVE_API_KEY")
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get(&self) -> Option<String> {
        match std::env::var(&self.var_name) {
            Ok(key) if !key.is_empty() => Some(key),
            _ => {
                warn!("No credential found in ${}", self.var_name);
                None
            }
        }
    }
}

/// Minimal validity check applied before any connection attempt.
///
/// Accepts keys of at least 16 ASCII alphanumeric / `-` / `_` characters.
pub fn is_valid_credential(key: &str) -> bool {
    key.len() >= 16
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
