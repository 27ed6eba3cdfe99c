use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures::future::join_all;
use nuget_sources::CacheEntry;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{CatalogClientConfig, resolve_proxy};
use crate::error::CatalogClientError;
use crate::types::{
    CatalogEntry,
    CatalogEntryRef,
    Package,
    PackageDetails,
    RegistrationIndex,
    RegistrationLeaf,
    RegistrationLeafDocument,
    RegistrationPage,
    SearchQuery,
    SearchResponse,
    ServiceIndex,
    package_from_registration,
};

const SEARCH_RESOURCE: &str = "SearchQueryService";
const REGISTRATIONS_RESOURCE: &str = "RegistrationsBaseUrl/3.6.0";

/// Service endpoints advertised by a registry's service index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoints {
    pub search_url: String,
    pub registration_base_url: String,
}

#[allow(async_fn_in_trait)]
pub trait ClientTrait {
    /// The service index URL this client talks to.
    fn index_url(&self) -> &str;

    /// Search the registry for packages matching `query`.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Package>, CatalogClientError>;

    /// Get a package and all of its versions, `id` is case-insensitive.
    async fn get_package(&self, id: &str) -> Result<Package, CatalogClientError>;

    /// Get the dependencies of a single package version.
    ///
    /// `version_url` is the registration leaf URL of the version,
    /// see [crate::PackageVersion::id].
    async fn get_package_details(
        &self,
        version_url: &str,
    ) -> Result<PackageDetails, CatalogClientError>;

    /// Evict the cached package `id`, or every cached package if `None`.
    fn clear_package_cache(&self, id: Option<&str>);
}

/// A client for a single package registry.
///
/// Endpoints are resolved from the service index on first use and kept for
/// the lifetime of the client. Packages are cached by lowercase id for
/// [CatalogClientConfig::package_cache_ttl].
pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogClientConfig,
    endpoints: OnceCell<CatalogEndpoints>,
    packages: Mutex<HashMap<String, CacheEntry<Package>>>,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints.get())
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn new(config: CatalogClientConfig) -> Result<Self, CatalogClientError> {
        Ok(Self {
            http: Self::build_http_client(&config)?,
            config,
            endpoints: OnceCell::new(),
            packages: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CatalogClientConfig {
        &self.config
    }

    fn build_http_client(
        config: &CatalogClientConfig,
    ) -> Result<reqwest::Client, CatalogClientError> {
        let headers = Self::build_header_map(config)?;

        let mut builder = {
            let conn_timeout = Duration::from_secs(15);
            let req_timeout = Duration::from_secs(60);
            reqwest::ClientBuilder::new()
                .connect_timeout(conn_timeout)
                .timeout(req_timeout)
                .user_agent(&config.user_agent)
                .default_headers(headers)
                // proxies are resolved by us, not picked up from the environment
                .no_proxy()
        };

        if let Some(proxy) = resolve_proxy(config.proxy.as_deref()) {
            debug!(index_url = %config.index_url, "sending requests through proxy");
            let proxy = reqwest::Proxy::all(&proxy)
                .map_err(|err| CatalogClientError::BuildClient(format!("invalid proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|err| CatalogClientError::BuildClient(err.to_string()))
    }

    fn build_header_map(config: &CatalogClientConfig) -> Result<HeaderMap, CatalogClientError> {
        let mut header_map = HeaderMap::new();

        if let Some((username, password)) = config.basic_auth() {
            let token = BASE64_STANDARD.encode(format!("{username}:{password}"));
            let mut value = HeaderValue::from_str(&format!("Basic {token}")).map_err(|err| {
                CatalogClientError::BuildClient(format!("invalid credentials: {err}"))
            })?;
            value.set_sensitive(true);
            header_map.insert(header::AUTHORIZATION, value);
        }

        Ok(header_map)
    }

    /// Resolve the search and registration endpoints.
    ///
    /// The service index is fetched at most once per client.
    pub async fn ensure_endpoints(&self) -> Result<&CatalogEndpoints, CatalogClientError> {
        self.endpoints
            .get_or_try_init(|| self.fetch_endpoints())
            .await
    }

    #[instrument(skip(self), fields(index_url = %self.config.index_url))]
    async fn fetch_endpoints(&self) -> Result<CatalogEndpoints, CatalogClientError> {
        let index: ServiceIndex = self.fetch_json(&self.config.index_url).await?;

        let resource = |which: &str| {
            index
                .find_resource(which)
                .map(with_trailing_slash)
                .ok_or_else(|| CatalogClientError::EndpointNotFound {
                    index_url: self.config.index_url.clone(),
                    which: which.to_string(),
                })
        };

        let endpoints = CatalogEndpoints {
            search_url: resource(SEARCH_RESOURCE)?,
            registration_base_url: resource(REGISTRATIONS_RESOURCE)?,
        };
        debug!(?endpoints, "resolved endpoints");
        Ok(endpoints)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CatalogClientError> {
        debug!(%url, "fetching");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| CatalogClientError::SourceUnreachable {
                url: url.to_string(),
                err,
            })?;

        response
            .json::<T>()
            .await
            .map_err(|err| CatalogClientError::InvalidDocument {
                url: url.to_string(),
                err,
            })
    }

    /// Items of a registration page, fetching the page if it isn't inlined.
    ///
    /// A page that can't be fetched contributes no items.
    async fn page_items(&self, page: RegistrationPage) -> Vec<RegistrationLeaf> {
        if let Some(items) = page.items {
            return items;
        }
        let Some(page_url) = page.id else {
            warn!("registration page has neither items nor a url");
            return Vec::new();
        };

        match self.fetch_json::<RegistrationPage>(&page_url).await {
            Ok(fetched) => fetched.items.unwrap_or_default(),
            Err(err) => {
                warn!(url = %page_url, error = %err, "skipping registration page");
                Vec::new()
            },
        }
    }

    fn cached_package(&self, key: &str) -> Option<Package> {
        let mut packages = self.packages.lock().unwrap_or_else(PoisonError::into_inner);
        match packages.get(key) {
            Some(entry) if entry.is_valid(self.config.package_cache_ttl) => {
                Some(entry.value.clone())
            },
            Some(_) => {
                packages.remove(key);
                None
            },
            None => None,
        }
    }
}

impl ClientTrait for CatalogClient {
    fn index_url(&self) -> &str {
        &self.config.index_url
    }

    #[instrument(skip(self), fields(index_url = %self.config.index_url))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Package>, CatalogClientError> {
        let endpoints = self.ensure_endpoints().await?;

        let skip = query.skip.to_string();
        let take = query.take.to_string();
        let prerelease = query.include_prerelease.to_string();
        let url = Url::parse_with_params(&endpoints.search_url, [
            ("q", query.filter.as_str()),
            ("skip", skip.as_str()),
            ("take", take.as_str()),
            ("prerelease", prerelease.as_str()),
            ("semVerLevel", "2.0.0"),
        ])
        .map_err(|err| CatalogClientError::InvalidUrl {
            url: endpoints.search_url.clone(),
            err,
        })?;

        let response: SearchResponse = self.fetch_json(url.as_str()).await?;
        debug!(n_results = response.data.len(), "search finished");
        Ok(response.data.into_iter().map(Package::from).collect())
    }

    #[instrument(skip(self), fields(index_url = %self.config.index_url))]
    async fn get_package(&self, id: &str) -> Result<Package, CatalogClientError> {
        let key = id.to_lowercase();
        if let Some(package) = self.cached_package(&key) {
            debug!("using cached package");
            return Ok(package);
        }

        let endpoints = self.ensure_endpoints().await?;
        let url = format!("{}{key}/index.json", endpoints.registration_base_url);

        let fetched = self.fetch_json::<RegistrationIndex>(&url).await;
        let index = match fetched {
            Err(CatalogClientError::SourceUnreachable { err, .. })
                if err.status() == Some(StatusCode::NOT_FOUND) =>
            {
                return Err(CatalogClientError::PackageNotFound { url });
            },
            result => result?,
        };

        let pages = join_all(index.items.into_iter().map(|page| self.page_items(page))).await;
        let items = pages.into_iter().flatten().collect::<Vec<_>>();

        let package = package_from_registration(items)
            .ok_or_else(|| CatalogClientError::PackageNotFound { url })?;

        let mut packages = self.packages.lock().unwrap_or_else(PoisonError::into_inner);
        packages.insert(key, CacheEntry::new(package.clone()));
        Ok(package)
    }

    #[instrument(skip(self), fields(index_url = %self.config.index_url))]
    async fn get_package_details(
        &self,
        version_url: &str,
    ) -> Result<PackageDetails, CatalogClientError> {
        self.ensure_endpoints().await?;

        let leaf: RegistrationLeafDocument = self.fetch_json(version_url).await?;
        let entry = match leaf.catalog_entry {
            None => {
                debug!("version has no catalog entry");
                return Ok(PackageDetails::default());
            },
            Some(CatalogEntryRef::Inline(entry)) => *entry,
            Some(CatalogEntryRef::Url(entry_url)) => {
                self.fetch_json::<CatalogEntry>(&entry_url).await?
            },
        };

        Ok(PackageDetails::from(entry))
    }

    fn clear_package_cache(&self, id: Option<&str>) {
        let mut packages = self.packages.lock().unwrap_or_else(PoisonError::into_inner);
        match id {
            Some(id) => {
                packages.remove(&id.to_lowercase());
            },
            None => packages.clear(),
        }
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
