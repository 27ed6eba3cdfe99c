//! Registry documents as they arrive over the wire, and the records built from them.
//!
//! Every wire field is optional; defaults are filled in when converting
//! into [Package] and [PackageDetails].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A string that some registries send as a list, and vice versa.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub(crate) fn contains(&self, needle: &str) -> bool {
        match self {
            StringOrList::One(value) => value.contains(needle),
            StringOrList::Many(values) => values.iter().any(|value| value.contains(needle)),
        }
    }

    /// Flatten into a list, splitting single strings on commas.
    pub(crate) fn into_list(self) -> Vec<String> {
        let values = match self {
            StringOrList::One(value) => value.split(',').map(str::to_string).collect(),
            StringOrList::Many(values) => values,
        };
        values
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum NumberOrString {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl NumberOrString {
    /// Severity on the 0 (low) to 3 (critical) scale.
    fn severity(&self) -> u8 {
        let raw = match self {
            NumberOrString::Integer(value) => *value,
            NumberOrString::Float(value) => *value as i64,
            NumberOrString::Text(text) => text.trim().parse().unwrap_or(0),
        };
        raw.clamp(0, 3) as u8
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceIndex {
    #[serde(default)]
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceResource {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@type")]
    pub kind: Option<StringOrList>,
}

impl ServiceIndex {
    /// The `@id` of the first resource whose type contains `kind`.
    pub(crate) fn find_resource(&self, kind: &str) -> Option<&str> {
        self.resources
            .iter()
            .filter(|resource| {
                resource
                    .kind
                    .as_ref()
                    .is_some_and(|declared| declared.contains(kind))
            })
            .find_map(|resource| resource.id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub data: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub authors: Option<StringOrList>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub total_downloads: Option<u64>,
    pub verified: Option<bool>,
    pub tags: Option<StringOrList>,
    #[serde(default)]
    pub versions: Vec<SearchVersion>,
    #[serde(default)]
    pub vulnerabilities: Vec<WireVulnerability>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchVersion {
    pub version: Option<String>,
    #[serde(rename = "@id")]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistrationIndex {
    #[serde(default)]
    pub items: Vec<RegistrationPage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistrationPage {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    /// Only present when the page is inlined into the index.
    pub items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistrationLeaf {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    pub catalog_entry: Option<CatalogEntry>,
}

/// A registration leaf fetched on its own, its catalog entry is usually a link.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistrationLeafDocument {
    pub catalog_entry: Option<CatalogEntryRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CatalogEntryRef {
    Url(String),
    Inline(Box<CatalogEntry>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CatalogEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub authors: Option<StringOrList>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub total_downloads: Option<u64>,
    pub verified: Option<bool>,
    pub tags: Option<StringOrList>,
    #[serde(default)]
    pub vulnerabilities: Vec<WireVulnerability>,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireVulnerability {
    pub advisory_url: Option<String>,
    pub severity: Option<NumberOrString>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DependencyGroup {
    pub target_framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<WireDependency>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireDependency {
    pub id: Option<String>,
    pub range: Option<String>,
}

/// Framework name used for dependency groups that don't declare one.
pub const ANY_FRAMEWORK: &str = "any";

/// Package metadata as returned by search and package lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub name: String,
    pub authors: Vec<String>,
    pub description: String,
    pub icon_url: String,
    pub license_url: String,
    pub project_url: String,
    pub total_downloads: u64,
    pub verified: bool,
    /// The current (latest) version
    pub version: String,
    pub versions: Vec<PackageVersion>,
    pub tags: Vec<String>,
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub version: String,
    /// URL of this version's registration leaf, see [crate::CatalogClient::get_package_details]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    /// 0 (low) to 3 (critical)
    pub severity: u8,
    pub advisory_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetails {
    /// Target framework to its dependencies, frameworks without dependencies are omitted
    pub dependencies: IndexMap<String, Vec<PackageDependency>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDependency {
    pub package_id: String,
    pub version_range: String,
}

/// Parameters of a search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub filter: String,
    pub include_prerelease: bool,
    pub skip: u32,
    pub take: u32,
}

impl SearchQuery {
    pub const DEFAULT_TAKE: u32 = 20;

    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            include_prerelease: false,
            skip: 0,
            take: Self::DEFAULT_TAKE,
        }
    }
}

fn name_or_id(title: Option<String>, id: &str) -> String {
    title
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| id.to_string())
}

fn vulnerabilities(wire: Vec<WireVulnerability>) -> Vec<Vulnerability> {
    wire.into_iter()
        .map(|vulnerability| Vulnerability {
            severity: vulnerability
                .severity
                .as_ref()
                .map(NumberOrString::severity)
                .unwrap_or_default(),
            advisory_url: vulnerability.advisory_url.unwrap_or_default(),
        })
        .collect()
}

impl From<SearchEntry> for Package {
    fn from(entry: SearchEntry) -> Self {
        let id = entry.id.unwrap_or_default();
        Package {
            name: name_or_id(entry.title, &id),
            authors: entry.authors.map(StringOrList::into_list).unwrap_or_default(),
            description: entry.description.unwrap_or_default(),
            icon_url: entry.icon_url.unwrap_or_default(),
            license_url: entry.license_url.unwrap_or_default(),
            project_url: entry.project_url.unwrap_or_default(),
            total_downloads: entry.total_downloads.unwrap_or_default(),
            verified: entry.verified.unwrap_or_default(),
            version: entry.version.unwrap_or_default(),
            versions: entry
                .versions
                .into_iter()
                .map(|version| PackageVersion {
                    version: version.version.unwrap_or_default(),
                    id: version.id.unwrap_or_default(),
                })
                .collect(),
            tags: entry.tags.map(StringOrList::into_list).unwrap_or_default(),
            vulnerabilities: vulnerabilities(entry.vulnerabilities),
            id,
        }
    }
}

/// The entry treated as the current version of a package.
///
/// Registration pages list versions in ascending order, so this is the last item.
pub(crate) fn latest_entry(items: &[RegistrationLeaf]) -> Option<&RegistrationLeaf> {
    items.last()
}

/// Build a [Package] from all registration items of a package.
///
/// Returns `None` if there are no items.
pub(crate) fn package_from_registration(items: Vec<RegistrationLeaf>) -> Option<Package> {
    let versions = items
        .iter()
        .map(|leaf| PackageVersion {
            version: leaf
                .catalog_entry
                .as_ref()
                .and_then(|entry| entry.version.clone())
                .unwrap_or_default(),
            id: leaf.id.clone().unwrap_or_default(),
        })
        .collect();

    let entry = latest_entry(&items)?
        .catalog_entry
        .clone()
        .unwrap_or_default();
    let id = entry.id.unwrap_or_default();

    Some(Package {
        name: name_or_id(entry.title, &id),
        authors: entry.authors.map(StringOrList::into_list).unwrap_or_default(),
        description: entry.description.unwrap_or_default(),
        icon_url: entry.icon_url.unwrap_or_default(),
        license_url: entry.license_url.unwrap_or_default(),
        project_url: entry.project_url.unwrap_or_default(),
        total_downloads: entry.total_downloads.unwrap_or_default(),
        verified: entry.verified.unwrap_or_default(),
        version: entry.version.unwrap_or_default(),
        versions,
        tags: entry.tags.map(StringOrList::into_list).unwrap_or_default(),
        vulnerabilities: vulnerabilities(entry.vulnerabilities),
        id,
    })
}

impl From<CatalogEntry> for PackageDetails {
    fn from(entry: CatalogEntry) -> Self {
        let mut dependencies: IndexMap<String, Vec<PackageDependency>> = IndexMap::new();
        for group in entry.dependency_groups {
            let framework = group
                .target_framework
                .filter(|framework| !framework.is_empty())
                .unwrap_or_else(|| ANY_FRAMEWORK.to_string());
            let packages = group.dependencies.into_iter().filter_map(|dependency| {
                Some(PackageDependency {
                    package_id: dependency.id.filter(|id| !id.is_empty())?,
                    version_range: dependency.range.unwrap_or_default(),
                })
            });
            dependencies.entry(framework).or_default().extend(packages);
        }
        dependencies.retain(|_, packages| !packages.is_empty());
        PackageDetails { dependencies }
    }
}
