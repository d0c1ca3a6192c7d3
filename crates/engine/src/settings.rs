//! Engine configuration resolved from the environment.

use std::env;
use std::time::Duration;

use quarry_util::UserPreferences;
use tracing::{debug, warn};

pub const GRAPH_API_URL_ENV: &str = "QUARRY_GRAPH_API_URL";
pub const GRAPH_HOSTED_SERVICE_URL_ENV: &str = "QUARRY_GRAPH_HOSTED_SERVICE_URL";
pub const GRAPH_API_KEY_ENV: &str = "QUARRY_GRAPH_API_KEY";
pub const IPFS_GATEWAY_ENV: &str = "QUARRY_IPFS_GATEWAY";
pub const IPNS_GATEWAY_ENV: &str = "QUARRY_IPNS_GATEWAY";
pub const HTTP_TIMEOUT_ENV: &str = "QUARRY_HTTP_TIMEOUT_SECS";

pub const DEFAULT_GRAPH_API_URL: &str = "https://gateway.thegraph.com/api";
pub const DEFAULT_GRAPH_HOSTED_SERVICE_URL: &str = "https://api.thegraph.com/subgraphs/name";
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints and credentials used by the built-in provider adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub graph_api_url: String,
    pub graph_hosted_service_url: String,
    /// Key inserted into gateway URLs. Empty when unset.
    pub graph_api_key: String,
    pub ipfs_gateway: String,
    pub ipns_gateway: String,
    pub http_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            graph_api_url: DEFAULT_GRAPH_API_URL.to_string(),
            graph_hosted_service_url: DEFAULT_GRAPH_HOSTED_SERVICE_URL.to_string(),
            graph_api_key: String::new(),
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            ipns_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl EngineSettings {
    /// Read settings from `QUARRY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let settings = Self {
            graph_api_url: url_var(GRAPH_API_URL_ENV).unwrap_or(defaults.graph_api_url),
            graph_hosted_service_url: url_var(GRAPH_HOSTED_SERVICE_URL_ENV).unwrap_or(defaults.graph_hosted_service_url),
            graph_api_key: string_var(GRAPH_API_KEY_ENV).unwrap_or_default(),
            ipfs_gateway: url_var(IPFS_GATEWAY_ENV).unwrap_or(defaults.ipfs_gateway),
            ipns_gateway: url_var(IPNS_GATEWAY_ENV).unwrap_or(defaults.ipns_gateway),
            http_timeout: timeout_var().unwrap_or(defaults.http_timeout),
        };
        debug!(
            graph_api_url = %settings.graph_api_url,
            ipfs_gateway = %settings.ipfs_gateway,
            has_graph_api_key = !settings.graph_api_key.is_empty(),
            timeout_secs = settings.http_timeout.as_secs(),
            "engine settings resolved"
        );
        settings
    }

    /// Prefer the user's saved Graph API key over the environment default.
    ///
    /// The key is copied into the graph provider when a
    /// [`ProviderRegistry`](crate::ProviderRegistry) is built from these
    /// settings. A key saved afterwards only takes effect in a new registry.
    pub fn apply_preferences(&mut self, preferences: &UserPreferences) {
        if let Some(api_key) = preferences.graph_api_key() {
            debug!("using graph api key from user preferences");
            self.graph_api_key = api_key;
        }
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn url_var(name: &str) -> Option<String> {
    string_var(name).map(|value| value.trim_end_matches('/').to_string())
}

fn timeout_var() -> Option<Duration> {
    let raw = string_var(HTTP_TIMEOUT_ENV)?;
    match raw.parse::<u64>() {
        Ok(seconds) if seconds > 0 => Some(Duration::from_secs(seconds)),
        _ => {
            warn!(value = %raw, "ignoring invalid {HTTP_TIMEOUT_ENV}; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_uses_defaults_when_unset() {
        temp_env::with_vars(
            [
                (GRAPH_API_URL_ENV, None::<&str>),
                (GRAPH_HOSTED_SERVICE_URL_ENV, None),
                (GRAPH_API_KEY_ENV, None),
                (IPFS_GATEWAY_ENV, None),
                (IPNS_GATEWAY_ENV, None),
                (HTTP_TIMEOUT_ENV, None),
            ],
            || {
                assert_eq!(EngineSettings::from_env(), EngineSettings::default());
            },
        );
    }

    #[test]
    fn from_env_reads_overrides_and_trims_slashes() {
        temp_env::with_vars(
            [
                (GRAPH_API_URL_ENV, Some("https://gw.example/api/")),
                (GRAPH_API_KEY_ENV, Some(" abc ")),
                (IPNS_GATEWAY_ENV, Some("https://names.example")),
                (HTTP_TIMEOUT_ENV, Some("5")),
            ],
            || {
                let settings = EngineSettings::from_env();
                assert_eq!(settings.graph_api_url, "https://gw.example/api");
                assert_eq!(settings.graph_api_key, "abc");
                assert_eq!(settings.ipns_gateway, "https://names.example");
                assert_eq!(settings.http_timeout, Duration::from_secs(5));
            },
        );
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        temp_env::with_var(HTTP_TIMEOUT_ENV, Some("soon"), || {
            assert_eq!(EngineSettings::from_env().http_timeout, DEFAULT_HTTP_TIMEOUT);
        });
    }

    #[test]
    fn saved_key_overrides_environment_key() {
        let preferences = UserPreferences::ephemeral();
        let mut settings = EngineSettings {
            graph_api_key: "from-env".into(),
            ..EngineSettings::default()
        };

        settings.apply_preferences(&preferences);
        assert_eq!(settings.graph_api_key, "from-env");

        preferences.set_graph_api_key(Some("saved".into())).expect("save");
        settings.apply_preferences(&preferences);
        assert_eq!(settings.graph_api_key, "saved");
    }

    #[test]
    fn registry_keeps_the_key_it_was_built_with() {
        let preferences = UserPreferences::ephemeral();
        preferences.set_graph_api_key(Some("first".into())).expect("save");
        let mut settings = EngineSettings::default();
        settings.apply_preferences(&preferences);
        let registry = crate::ProviderRegistry::with_defaults(&settings).expect("registry");

        preferences.set_graph_api_key(Some("second".into())).expect("save");
        let graph = registry.graph().expect("graph provider");
        assert_eq!(graph.endpoints().api_key, "first");

        settings.apply_preferences(&preferences);
        let rebuilt = crate::ProviderRegistry::with_defaults(&settings).expect("registry");
        assert_eq!(rebuilt.graph().expect("graph provider").endpoints().api_key, "second");
    }
}
