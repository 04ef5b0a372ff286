//! # Configuration
//!
//! Service configuration. The base URL determines the shape of every URI
//! the service mints: credentials live under `<base>/v1/credentials` and
//! status list credentials under `<base>/v1/credentials/status`.

/// Credential service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new("https://credential.example.com")
    }
}

impl Config {
    /// Creates a configuration for a service reachable at `base_url`.
    /// A trailing slash is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    /// The URI of the credential with the given local id.
    pub fn credential_uri(&self, credential_id: &str) -> String {
        format!("{}/v1/credentials/{credential_id}", self.base_url)
    }

    /// The URI of the status list credential with the given local id.
    pub fn status_credential_uri(&self, status_credential_id: &str) -> String {
        format!("{}/v1/credentials/status/{status_credential_id}", self.base_url)
    }
}
