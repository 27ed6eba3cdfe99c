use std::fmt::Write;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use nuget_catalog::{ClientFactory, FoundPackage, Package, PackageDetails};
use serde::Serialize;
use tracing::instrument;

use crate::utils::message;

// Show details about a single package
#[derive(Debug, Bpaf, Clone)]
pub struct Show {
    /// Display the package as JSON
    #[bpaf(long)]
    pub json: bool,

    /// Only look in the source with this service index URL
    #[bpaf(long, argument("URL"))]
    pub source: Option<String>,

    /// Also list the dependencies of the latest version
    #[bpaf(long)]
    pub dependencies: bool,

    /// Id of the package, case-insensitive
    #[bpaf(positional("package-id"))]
    pub package_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowOutput<'a> {
    #[serde(flatten)]
    found: &'a FoundPackage,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a PackageDetails>,
}

impl Show {
    #[instrument(name = "show", fields(package_id = %self.package_id), skip_all)]
    pub async fn handle(self, factory: &ClientFactory) -> Result<()> {
        let found = factory
            .get_package(&self.package_id, self.source.as_deref())
            .await
            .with_context(|| format!("Could not find package '{}'", self.package_id))?;

        let details = if self.dependencies {
            Some(self.dependencies_of(factory, &found).await?)
        } else {
            None
        };

        if self.json {
            let output = ShowOutput {
                found: &found,
                details: details.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        print!("{}", render_package(&found));
        if let Some(details) = &details {
            print!("{}", render_dependencies(details));
        }
        Ok(())
    }

    async fn dependencies_of(
        &self,
        factory: &ClientFactory,
        found: &FoundPackage,
    ) -> Result<PackageDetails> {
        let Some(version_url) = latest_version_url(&found.package) else {
            message::warning(format!(
                "'{}' does not list a registration for version {}",
                found.package.id, found.package.version
            ));
            return Ok(PackageDetails::default());
        };

        factory
            .get_package_details(version_url, &found.source_url)
            .await
            .context("Could not fetch dependencies")
    }
}

/// Registration URL of the current version, falling back to the last one listed.
fn latest_version_url(package: &Package) -> Option<&str> {
    package
        .versions
        .iter()
        .find(|version| version.version == package.version)
        .or(package.versions.last())
        .map(|version| version.id.as_str())
        .filter(|url| !url.is_empty())
}

fn render_package(found: &FoundPackage) -> String {
    let package = &found.package;
    let mut out = String::new();

    let _ = writeln!(out, "{} {}", package.name, package.version);
    if package.name != package.id {
        let _ = writeln!(out, "id:          {}", package.id);
    }
    let _ = writeln!(out, "source:      {}", found.source_url);
    if !package.authors.is_empty() {
        let _ = writeln!(out, "authors:     {}", package.authors.join(", "));
    }
    if !package.description.is_empty() {
        let _ = writeln!(out, "description: {}", package.description.trim());
    }
    if !package.project_url.is_empty() {
        let _ = writeln!(out, "project:     {}", package.project_url);
    }
    if !package.license_url.is_empty() {
        let _ = writeln!(out, "license:     {}", package.license_url);
    }
    if !package.tags.is_empty() {
        let _ = writeln!(out, "tags:        {}", package.tags.join(" "));
    }
    let versions = package
        .versions
        .iter()
        .map(|version| version.version.as_str())
        .collect::<Vec<_>>();
    let _ = writeln!(out, "versions:    {}", versions.join(", "));
    for vulnerability in &package.vulnerabilities {
        let _ = writeln!(
            out,
            "vulnerable:  severity {} {}",
            vulnerability.severity, vulnerability.advisory_url
        );
    }
    out
}

fn render_dependencies(details: &PackageDetails) -> String {
    if details.dependencies.is_empty() {
        return "dependencies: none\n".to_string();
    }

    let mut out = String::from("dependencies:\n");
    for (framework, dependencies) in &details.dependencies {
        let _ = writeln!(out, "  {framework}");
        for dependency in dependencies {
            let _ = writeln!(
                out,
                "    {} {}",
                dependency.package_id, dependency.version_range
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use nuget_catalog::{PackageDependency, PackageVersion, Vulnerability};
    use pretty_assertions::assert_eq;

    use super::*;

    fn found() -> FoundPackage {
        FoundPackage {
            source_url: "https://api.nuget.org/v3/index.json".to_string(),
            package: Package {
                id: "Newtonsoft.Json".to_string(),
                name: "Json.NET".to_string(),
                authors: vec!["James Newton-King".to_string()],
                version: "13.0.3".to_string(),
                versions: vec![
                    PackageVersion {
                        version: "13.0.3".to_string(),
                        id: "https://reg/newtonsoft.json/13.0.3.json".to_string(),
                    },
                    PackageVersion {
                        version: "13.0.4-beta1".to_string(),
                        id: "https://reg/newtonsoft.json/13.0.4-beta1.json".to_string(),
                    },
                ],
                vulnerabilities: vec![Vulnerability {
                    severity: 2,
                    advisory_url: "https://advisory/1".to_string(),
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn latest_version_url_matches_the_current_version() {
        let found = found();
        assert_eq!(
            latest_version_url(&found.package),
            Some("https://reg/newtonsoft.json/13.0.3.json")
        );

        let unlisted = Package {
            version: "14.0.0".to_string(),
            ..found.package.clone()
        };
        assert_eq!(
            latest_version_url(&unlisted),
            Some("https://reg/newtonsoft.json/13.0.4-beta1.json")
        );

        assert_eq!(latest_version_url(&Package::default()), None);
    }

    #[test]
    fn package_rendering() {
        assert_eq!(render_package(&found()), indoc! {"
            Json.NET 13.0.3
            id:          Newtonsoft.Json
            source:      https://api.nuget.org/v3/index.json
            authors:     James Newton-King
            versions:    13.0.3, 13.0.4-beta1
            vulnerable:  severity 2 https://advisory/1
        "});
    }

    #[test]
    fn dependency_rendering() {
        let mut details = PackageDetails::default();
        assert_eq!(render_dependencies(&details), "dependencies: none\n");

        details.dependencies.insert("net8.0".to_string(), vec![PackageDependency {
            package_id: "Bar".to_string(),
            version_range: "[1.0.0, )".to_string(),
        }]);
        assert_eq!(render_dependencies(&details), indoc! {"
            dependencies:
              net8.0
                Bar [1.0.0, )
        "});
    }
}
