use std::fmt::Write;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use nuget_catalog::{ClientFactory, Package, SearchQuery};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::utils::message;

// Search for packages
#[derive(Debug, Bpaf, Clone)]
pub struct Search {
    /// Display search results as a JSON array
    #[bpaf(long)]
    pub json: bool,

    /// Only search the source with this service index URL
    #[bpaf(long, argument("URL"))]
    pub source: Option<String>,

    /// Include prerelease versions
    #[bpaf(long)]
    pub prerelease: bool,

    /// Number of results to skip
    #[bpaf(long, argument("N"), fallback(0))]
    pub skip: u32,

    /// Number of results to request from each source (default: 20)
    #[bpaf(long, argument("N"))]
    pub take: Option<u32>,

    /// The package to search for
    #[bpaf(positional("search-term"))]
    pub search_term: String,
}

impl Search {
    #[instrument(name = "search", fields(json = self.json, search_term = %self.search_term), skip_all)]
    pub async fn handle(self, config: &Config, factory: &ClientFactory) -> Result<()> {
        let query = SearchQuery {
            filter: self.search_term.clone(),
            include_prerelease: self.prerelease,
            skip: self.skip,
            take: self.take.unwrap_or(config.search_take),
        };
        debug!(?query, source = ?self.source, "searching");

        let packages = factory
            .search(&query, self.source.as_deref())
            .await
            .context("Search failed")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&packages)?);
            return Ok(());
        }

        if packages.is_empty() {
            message::plain(format!("No packages found matching '{}'", self.search_term));
            return Ok(());
        }
        print!("{}", render_results(&packages));
        Ok(())
    }
}

fn render_results(packages: &[Package]) -> String {
    let id_width = packages.iter().map(|p| p.id.len()).max().unwrap_or_default();
    let version_width = packages
        .iter()
        .map(|p| p.version.len())
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    for package in packages {
        let description = package.description.lines().next().unwrap_or_default();
        let _ = writeln!(
            out,
            "{:id_width$}  {:version_width$}  {description}",
            package.id, package.version
        );
    }
    out
}
