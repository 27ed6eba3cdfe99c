mod search;
mod show;
mod sources;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use indoc::indoc;
use nuget_catalog::{CatalogClientConfig, ClientFactory};
use nuget_sources::{
    ConfigLocations,
    CredentialStore,
    SecretDecoder,
    SourceResolver,
    parse_source_settings,
};
use tracing::debug;

use crate::config::Config;

const DESCRIPTION: &str = indoc! {"
    Inspect the NuGet package sources that apply to a workspace
    and query their registries.

    Sources are read from nuget.config files in the workspace,
    the user config and, on Windows, the machine config."
};

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

#[derive(Bpaf, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf)]
#[bpaf(options, descr(DESCRIPTION))]
pub struct FeedsCli(#[bpaf(external(feeds_args))] pub FeedsArgs);

/// Main args parser
///
/// To parse the command line, use [`FeedsCli`] instead using [`feeds_cli()`].
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)] // we don't want this struct to be interpreted as a group
pub struct FeedsArgs {
    /// Verbose mode
    ///
    /// Invoke multiple times for increasing detail.
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    /// Workspace to resolve sources for (default: current directory)
    #[bpaf(long, short('w'), argument("PATH"))]
    pub workspace: Option<PathBuf>,

    #[bpaf(external(commands))]
    command: Commands,
}

#[derive(Bpaf, Clone, Debug)]
enum Commands {
    /// List the package sources that apply to the workspace
    #[bpaf(command)]
    Sources(#[bpaf(external(sources::sources))] sources::Sources),

    /// Search for packages in all sources or a single one
    #[bpaf(command)]
    Search(#[bpaf(external(search::search))] search::Search),

    /// Show a package, its versions and optionally its dependencies
    #[bpaf(command)]
    Show(#[bpaf(external(show::show))] show::Show),
}

impl FeedsArgs {
    pub async fn handle(self, config: Config) -> Result<()> {
        let workspace = match self.workspace.or_else(|| config.workspace.clone()) {
            Some(workspace) => workspace,
            None => env::current_dir().context("Could not determine the current directory")?,
        };
        debug!(workspace = %workspace.display(), "resolving sources for workspace");

        let factory = client_factory(&config, workspace);

        match self.command {
            Commands::Sources(args) => args.handle(&factory).await,
            Commands::Search(args) => args.handle(&config, &factory).await,
            Commands::Show(args) => args.handle(&factory).await,
        }
    }
}

/// Wire up resolver and client factory from the application config.
fn client_factory(config: &Config, workspace: PathBuf) -> ClientFactory {
    let resolver = SourceResolver::new(
        ConfigLocations::from_env(),
        Arc::new(SecretDecoder::new()),
        Arc::new(CredentialStore::new()),
    )
    .with_source_settings(parse_source_settings(&config.sources));

    let mut defaults = CatalogClientConfig::new("");
    defaults.proxy = config.proxy.clone();
    defaults.package_cache_ttl = Duration::from_secs(config.package_cache_ttl_secs);
    if let Some(user_agent) = &config.user_agent {
        defaults.user_agent = user_agent.clone();
    }

    ClientFactory::new(resolver, Some(workspace)).with_client_defaults(defaults)
}

#[cfg(test)]
mod tests {
    use bpaf::Args;
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> FeedsArgs {
        let FeedsCli(args) = feeds_cli().run_inner(Args::from(args)).unwrap();
        args
    }

    #[test]
    fn verbosity_flags() {
        assert_eq!(parse(&["sources"]).verbosity, Verbosity::Verbose(0));
        assert_eq!(parse(&["-vv", "sources"]).verbosity, Verbosity::Verbose(2));
        assert_eq!(parse(&["-q", "sources"]).verbosity, Verbosity::Quiet);
    }

    #[test]
    fn search_arguments() {
        let args = parse(&[
            "-w",
            "/srv/project",
            "search",
            "json",
            "--source",
            "https://api.nuget.org/v3/index.json",
            "--prerelease",
            "--take",
            "5",
        ]);

        assert_eq!(args.workspace, Some(PathBuf::from("/srv/project")));
        let Commands::Search(search) = args.command else {
            panic!("expected search command");
        };
        assert_eq!(search.search_term, "json");
        assert_eq!(
            search.source.as_deref(),
            Some("https://api.nuget.org/v3/index.json")
        );
        assert!(search.prerelease);
        assert_eq!(search.skip, 0);
        assert_eq!(search.take, Some(5));
    }

    #[test]
    fn show_requires_a_package_id() {
        assert!(feeds_cli().run_inner(Args::from(&["show"])).is_err());

        let args = parse(&["show", "Newtonsoft.Json", "--dependencies"]);
        let Commands::Show(show) = args.command else {
            panic!("expected show command");
        };
        assert_eq!(show.package_id, "Newtonsoft.Json");
        assert!(show.dependencies);
        assert!(!show.json);
    }

    #[test]
    fn client_defaults_come_from_config() {
        let config = Config {
            sources: vec![],
            proxy: Some("http://proxy:3128".to_string()),
            workspace: None,
            search_take: 20,
            package_cache_ttl_secs: 7,
            user_agent: Some("custom/1.0".to_string()),
        };
        // building the factory must not touch the network or the file system
        let factory = client_factory(&config, PathBuf::from("/nonexistent"));
        assert!(format!("{factory:?}").contains("custom/1.0"));
    }
}
