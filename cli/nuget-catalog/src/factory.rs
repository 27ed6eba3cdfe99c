use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use nuget_sources::{SourceDeclaration, SourceResolver};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::aggregate::{first_package, search_sources};
use crate::client::{CatalogClient, ClientTrait};
use crate::config::CatalogClientConfig;
use crate::error::CatalogClientError;
use crate::types::{Package, PackageDetails, SearchQuery};

/// A package together with the source it was found in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundPackage {
    pub source_url: String,
    pub package: Package,
}

/// Hands out one [CatalogClient] per registry URL.
///
/// Clients are built with the credentials [SourceResolver] resolves for the
/// source with a matching URL and are kept until [ClientFactory::clear_all_cache].
#[derive(Debug)]
pub struct ClientFactory {
    resolver: SourceResolver,
    workspace_root: Option<PathBuf>,
    defaults: CatalogClientConfig,
    clients: Mutex<HashMap<String, Arc<CatalogClient>>>,
}

impl ClientFactory {
    pub fn new(resolver: SourceResolver, workspace_root: Option<PathBuf>) -> Self {
        Self {
            resolver,
            workspace_root,
            defaults: CatalogClientConfig::new(""),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Proxy, user agent and cache TTL for every client built from now on.
    ///
    /// URL and credentials of `defaults` are ignored.
    pub fn with_client_defaults(mut self, defaults: CatalogClientConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    /// All sources that apply to the workspace, with credentials resolved.
    pub async fn sources(&self) -> Vec<SourceDeclaration> {
        self.resolver
            .resolve_sources(self.workspace_root.as_deref())
            .await
    }

    /// The client for the registry at `url`, built on first request.
    #[instrument(skip(self))]
    pub async fn get_client(&self, url: &str) -> Result<Arc<CatalogClient>, CatalogClientError> {
        if let Some(client) = self.cached_client(url) {
            return Ok(client);
        }

        let source = self
            .sources()
            .await
            .into_iter()
            .find(|source| source.url == url);
        if source.is_none() {
            debug!("no configured source for url, connecting without credentials");
        }
        self.client_for(url, source.as_ref())
    }

    fn cached_client(&self, url: &str) -> Option<Arc<CatalogClient>> {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.get(url).cloned()
    }

    fn client_for(
        &self,
        url: &str,
        source: Option<&SourceDeclaration>,
    ) -> Result<Arc<CatalogClient>, CatalogClientError> {
        if let Some(client) = self.cached_client(url) {
            return Ok(client);
        }

        let config = CatalogClientConfig {
            index_url: url.to_string(),
            username: source.and_then(|source| source.username.clone()),
            password: source.and_then(|source| source.password.clone()),
            ..self.defaults.clone()
        };
        let client = Arc::new(CatalogClient::new(config)?);

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(clients.entry(url.to_string()).or_insert(client).clone())
    }

    /// Clients for `source`, or for every resolved source if `None`.
    ///
    /// In the latter case sources whose client can't be built are logged and skipped.
    async fn clients(
        &self,
        source: Option<&str>,
    ) -> Result<Vec<Arc<CatalogClient>>, CatalogClientError> {
        if let Some(url) = source {
            return Ok(vec![self.get_client(url).await?]);
        }

        let mut clients: Vec<Arc<CatalogClient>> = Vec::new();
        for declaration in self.sources().await {
            if clients
                .iter()
                .any(|client| client.index_url() == declaration.url)
            {
                continue;
            }
            match self.client_for(&declaration.url, Some(&declaration)) {
                Ok(client) => clients.push(client),
                Err(err) => warn!(
                    source = %declaration.name,
                    url = %declaration.url,
                    error = %err,
                    "skipping source"
                ),
            }
        }
        Ok(clients)
    }

    /// Search `source`, or all sources concurrently if `None`.
    ///
    /// Searching a single source propagates its failure, searching all
    /// sources skips the ones that fail.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &SearchQuery,
        source: Option<&str>,
    ) -> Result<Vec<Package>, CatalogClientError> {
        let clients = self.clients(source).await?;
        if source.is_some() {
            return match clients.first() {
                Some(client) => client.search(query).await,
                None => Err(CatalogClientError::NoSources),
            };
        }
        Ok(search_sources(clients.iter().map(Arc::as_ref), query).await)
    }

    /// Look up package `id` in `source`, or in each source in turn if `None`.
    #[instrument(skip(self))]
    pub async fn get_package(
        &self,
        id: &str,
        source: Option<&str>,
    ) -> Result<FoundPackage, CatalogClientError> {
        let clients = self.clients(source).await?;
        let (client, package) = first_package(clients.iter().map(Arc::as_ref), id).await?;
        Ok(FoundPackage {
            source_url: client.index_url().to_string(),
            package,
        })
    }

    /// Dependencies of the package version at `version_url` in `source_url`.
    pub async fn get_package_details(
        &self,
        version_url: &str,
        source_url: &str,
    ) -> Result<PackageDetails, CatalogClientError> {
        self.get_client(source_url)
            .await?
            .get_package_details(version_url)
            .await
    }

    /// Forget everything: cached packages, clients, decoded secrets and credentials.
    ///
    /// The next request re-reads config files and re-resolves endpoints.
    pub fn clear_all_cache(&self) {
        let dropped = {
            let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
            clients.drain().map(|(_, client)| client).collect::<Vec<_>>()
        };
        for client in &dropped {
            client.clear_package_cache(None);
        }
        self.resolver.decoder().clear_cache();
        self.resolver.credentials().clear_all();
        debug!(n_clients = dropped.len(), "cleared all caches");
    }
}
