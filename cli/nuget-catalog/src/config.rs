use std::fmt::Debug;
use std::time::Duration;

/// Per-package results are cached this long unless configured otherwise.
pub const DEFAULT_PACKAGE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Environment variables consulted for a proxy, in order.
const PROXY_ENV_VARS: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];

#[derive(Clone)]
pub struct CatalogClientConfig {
    /// URL of the registry's service index, e.g. `https://api.nuget.org/v3/index.json`
    pub index_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Proxy set by the user, takes precedence over the environment
    pub proxy: Option<String>,
    pub user_agent: String,
    pub package_cache_ttl: Duration,
}

impl CatalogClientConfig {
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            index_url: index_url.into(),
            username: None,
            password: None,
            proxy: None,
            user_agent: format!("nuget-feeds/{}", env!("CARGO_PKG_VERSION")),
            package_cache_ttl: DEFAULT_PACKAGE_CACHE_TTL,
        }
    }

    /// Basic auth is only sent when both username and password are known.
    pub(crate) fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }
}

impl Debug for CatalogClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClientConfig")
            .field("index_url", &self.index_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("proxy", &self.proxy)
            .field("user_agent", &self.user_agent)
            .field("package_cache_ttl", &self.package_cache_ttl)
            .finish()
    }
}

/// The proxy requests should go through.
///
/// A configured proxy wins, otherwise the first non-empty of
/// `HTTPS_PROXY`, `https_proxy`, `HTTP_PROXY` and `http_proxy` is used.
pub fn resolve_proxy(configured: Option<&str>) -> Option<String> {
    if let Some(proxy) = configured.map(str::trim).filter(|proxy| !proxy.is_empty()) {
        return Some(proxy.to_string());
    }

    PROXY_ENV_VARS.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
    })
}
