//! Operations spanning several registries.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::client::ClientTrait;
use crate::error::CatalogClientError;
use crate::types::{Package, SearchQuery};

/// Search all `clients` concurrently and merge the results.
///
/// A failing source contributes nothing and is logged. Results keep the
/// order of `clients` and, within a source, the order of its results.
/// Packages are de-duplicated by case-insensitive id, the first one seen wins.
pub async fn search_sources<'a, C, I>(clients: I, query: &SearchQuery) -> Vec<Package>
where
    C: ClientTrait + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let clients = clients.into_iter().collect::<Vec<_>>();
    let results = join_all(clients.iter().map(|client| client.search(query))).await;

    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    for (client, result) in clients.iter().zip(results) {
        match result {
            Ok(found) => {
                debug!(source = client.index_url(), n_results = found.len(), "source searched");
                packages.extend(
                    found
                        .into_iter()
                        .filter(|package| seen.insert(package.id.to_lowercase())),
                );
            },
            Err(err) => warn!(
                source = client.index_url(),
                error = %err,
                "search failed for source, skipping it"
            ),
        }
    }
    packages
}

/// Look `id` up in each client in turn and return the first hit.
///
/// When every client fails the last error is returned.
pub async fn first_package<'a, C, I>(
    clients: I,
    id: &str,
) -> Result<(&'a C, Package), CatalogClientError>
where
    C: ClientTrait + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let mut last_err = CatalogClientError::NoSources;
    for client in clients {
        match client.get_package(id).await {
            Ok(package) => return Ok((client, package)),
            Err(err) => {
                debug!(
                    source = client.index_url(),
                    error = %err,
                    "package lookup failed, trying next source"
                );
                last_err = err;
            },
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use nuget_sources::utils::logging::test_helpers::test_subscriber;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::PackageDetails;

    /// A registry that either fails every call or knows a fixed set of packages.
    #[derive(Debug)]
    struct FakeClient {
        url: &'static str,
        packages: Option<Vec<&'static str>>,
    }

    impl FakeClient {
        fn serving(url: &'static str, ids: &[&'static str]) -> Self {
            Self {
                url,
                packages: Some(ids.to_vec()),
            }
        }

        fn broken(url: &'static str) -> Self {
            Self {
                url,
                packages: None,
            }
        }

        fn package(&self, id: &str) -> Package {
            Package {
                id: id.to_string(),
                name: id.to_string(),
                project_url: self.url.to_string(),
                ..Default::default()
            }
        }
    }

    impl ClientTrait for FakeClient {
        fn index_url(&self) -> &str {
            self.url
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<Package>, CatalogClientError> {
            match &self.packages {
                Some(ids) => Ok(ids.iter().map(|id| self.package(id)).collect()),
                None => Err(CatalogClientError::EndpointNotFound {
                    index_url: self.url.to_string(),
                    which: "SearchQueryService".to_string(),
                }),
            }
        }

        async fn get_package(&self, id: &str) -> Result<Package, CatalogClientError> {
            self.packages
                .iter()
                .flatten()
                .find(|known| known.eq_ignore_ascii_case(id))
                .map(|known| self.package(known))
                .ok_or_else(|| CatalogClientError::PackageNotFound {
                    url: format!("{}/{id}", self.url),
                })
        }

        async fn get_package_details(
            &self,
            _version_url: &str,
        ) -> Result<PackageDetails, CatalogClientError> {
            Ok(PackageDetails::default())
        }

        fn clear_package_cache(&self, _id: Option<&str>) {}
    }

    fn ids(packages: &[Package]) -> Vec<&str> {
        packages.iter().map(|package| package.id.as_str()).collect()
    }

    #[tokio::test]
    async fn failing_source_is_skipped_and_logged() {
        let clients = [
            FakeClient::serving("https://a", &["Alpha", "Shared"]),
            FakeClient::broken("https://broken"),
            FakeClient::serving("https://c", &["Gamma"]),
        ];

        let (subscriber, writer) = test_subscriber();
        let packages = {
            let _guard = tracing::subscriber::set_default(subscriber);
            search_sources(&clients, &SearchQuery::new("x")).await
        };

        assert_eq!(ids(&packages), vec!["Alpha", "Shared", "Gamma"]);
        let logs = writer.to_string();
        assert!(logs.contains("search failed for source"), "{logs}");
        assert!(logs.contains("https://broken"), "{logs}");
    }

    #[tokio::test]
    async fn duplicates_keep_the_first_source() {
        let clients = [
            FakeClient::serving("https://a", &["Shared", "Alpha"]),
            FakeClient::serving("https://b", &["SHARED", "Beta", "alpha"]),
        ];

        let packages = search_sources(&clients, &SearchQuery::new("x")).await;

        assert_eq!(ids(&packages), vec!["Shared", "Alpha", "Beta"]);
        assert_eq!(packages[0].project_url, "https://a");
    }

    #[tokio::test]
    async fn no_sources_no_results() {
        let clients: [FakeClient; 0] = [];
        assert!(search_sources(&clients, &SearchQuery::new("x")).await.is_empty());
    }

    #[tokio::test]
    async fn first_package_fails_over_in_order() {
        let clients = [
            FakeClient::broken("https://broken"),
            FakeClient::serving("https://b", &["Foo"]),
            FakeClient::serving("https://c", &["Foo"]),
        ];

        let (client, package) = first_package(&clients, "foo").await.unwrap();
        assert_eq!(client.url, "https://b");
        assert_eq!(package.id, "Foo");
    }

    #[tokio::test]
    async fn first_package_returns_the_last_error() {
        let clients = [
            FakeClient::serving("https://a", &[]),
            FakeClient::serving("https://b", &[]),
        ];

        let err = first_package(&clients, "Foo").await.unwrap_err();
        assert_eq!(err.url(), Some("https://b/Foo"));

        let none: [FakeClient; 0] = [];
        let err = first_package(&none, "Foo").await.unwrap_err();
        assert!(matches!(err, CatalogClientError::NoSources), "{err}");
    }
}
