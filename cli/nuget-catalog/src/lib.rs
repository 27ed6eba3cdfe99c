//! Package metadata retrieval from NuGet v3 registries.
//!
//! A [CatalogClient] talks to a single registry: it resolves the registry's
//! search and registration endpoints from its service index, runs searches,
//! and fetches (and caches) package registrations and dependency metadata.
//!
//! [ClientFactory] hands out one client per registry URL, wired up with the
//! credentials [nuget_sources::SourceResolver] resolves, and implements
//! searches and lookups spanning all configured sources.

mod aggregate;
mod client;
mod config;
mod error;
mod factory;
mod types;

pub use aggregate::{first_package, search_sources};
pub use client::{CatalogClient, CatalogEndpoints, ClientTrait};
pub use config::{CatalogClientConfig, DEFAULT_PACKAGE_CACHE_TTL, resolve_proxy};
pub use error::CatalogClientError;
pub use factory::{ClientFactory, FoundPackage};
pub use types::{
    ANY_FRAMEWORK,
    Package,
    PackageDependency,
    PackageDetails,
    PackageVersion,
    SearchQuery,
    Vulnerability,
};
