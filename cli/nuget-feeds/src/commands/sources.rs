use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use bpaf::Bpaf;
use nuget_catalog::ClientFactory;
use nuget_sources::SourceDeclaration;
use serde::Serialize;
use tracing::instrument;

use crate::utils::message;

// List the package sources that apply to the workspace
#[derive(Debug, Bpaf, Clone)]
pub struct Sources {
    /// Display sources as a JSON array
    #[bpaf(long)]
    pub json: bool,
}

/// A source as shown to the user, the password itself is never printed.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DisplaySource<'a> {
    name: &'a str,
    url: &'a str,
    username: Option<&'a str>,
    has_password: bool,
    password_script_path: Option<&'a PathBuf>,
}

impl<'a> From<&'a SourceDeclaration> for DisplaySource<'a> {
    fn from(source: &'a SourceDeclaration) -> Self {
        DisplaySource {
            name: &source.name,
            url: &source.url,
            username: source.username.as_deref(),
            has_password: source.password.is_some(),
            password_script_path: source.password_script_path.as_ref(),
        }
    }
}

impl Sources {
    #[instrument(name = "sources", skip_all, fields(json = self.json))]
    pub async fn handle(self, factory: &ClientFactory) -> Result<()> {
        let sources = factory.sources().await;

        if self.json {
            let display = sources.iter().map(DisplaySource::from).collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&display)?);
            return Ok(());
        }

        if sources.is_empty() {
            message::plain("No package sources configured.");
            return Ok(());
        }
        print!("{}", render_sources(&sources));
        Ok(())
    }
}

fn render_sources(sources: &[SourceDeclaration]) -> String {
    let width = sources
        .iter()
        .map(|source| source.name.len())
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    for source in sources {
        let _ = write!(out, "{:width$}  {}", source.name, source.url);
        match (&source.username, &source.password) {
            (Some(username), Some(_)) => {
                let _ = write!(out, "  (user: {username}, password: ***)");
            },
            (Some(username), None) => {
                let _ = write!(out, "  (user: {username})");
            },
            (None, Some(_)) => {
                let _ = write!(out, "  (password: ***)");
            },
            (None, None) => {},
        }
        out.push('\n');
    }
    out
}
