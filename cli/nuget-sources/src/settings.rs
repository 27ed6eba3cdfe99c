//! Package sources declared in editor/user settings rather than config files.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::nuget_config::SourceDeclaration;

/// A single source setting, stored as a JSON string such as
/// `{"name": "Private", "passwordScriptPath": "/opt/decrypt.sh"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSetting {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub password_script_path: Option<PathBuf>,
}

/// Parse the raw JSON settings, skipping (and logging) entries that don't parse.
pub fn parse_source_settings<S: AsRef<str>>(raw: &[S]) -> Vec<SourceSetting> {
    raw.iter()
        .filter_map(|entry| match serde_json::from_str(entry.as_ref()) {
            Ok(setting) => Some(setting),
            Err(err) => {
                warn!(%err, "ignoring malformed source setting");
                None
            },
        })
        .collect()
}

/// Overlay settings onto the sources merged from config files.
///
/// A setting naming an existing source only attaches its
/// `passwordScriptPath`; its url is ignored. A setting for an unknown name
/// adds a new source if it has a url.
pub fn overlay_settings(sources: &mut Vec<SourceDeclaration>, settings: &[SourceSetting]) {
    for setting in settings {
        if let Some(existing) = sources.iter_mut().find(|source| source.name == setting.name) {
            if let Some(script) = &setting.password_script_path {
                debug!(source = %setting.name, "attaching password script from settings");
                existing.password_script_path = Some(script.clone());
            }
            continue;
        }

        match &setting.url {
            Some(url) => {
                debug!(source = %setting.name, %url, "adding source from settings");
                sources.push(SourceDeclaration {
                    password_script_path: setting.password_script_path.clone(),
                    ..SourceDeclaration::new(&setting.name, url)
                });
            },
            None => debug!(
                source = %setting.name,
                "ignoring setting for unknown source without url"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_settings_and_skips_malformed_entries() {
        let settings = parse_source_settings(&[
            r#"{"name": "Private", "passwordScriptPath": "/opt/decrypt.sh"}"#,
            r#"{"url": "https://no-name.example/index.json"}"#,
            "not json",
            r#"{"name": "Extra", "url": "https://extra.example/index.json"}"#,
        ]);

        assert_eq!(settings, vec![
            SourceSetting {
                name: "Private".to_string(),
                url: None,
                password_script_path: Some(PathBuf::from("/opt/decrypt.sh")),
            },
            SourceSetting {
                name: "Extra".to_string(),
                url: Some("https://extra.example/index.json".to_string()),
                password_script_path: None,
            },
        ]);
    }

    #[test]
    fn existing_sources_only_receive_the_script_path() {
        let mut sources = vec![SourceDeclaration::new(
            "Private",
            "https://private.example/index.json",
        )];
        overlay_settings(&mut sources, &[SourceSetting {
            name: "Private".to_string(),
            url: Some("https://elsewhere.example/index.json".to_string()),
            password_script_path: Some(PathBuf::from("/opt/decrypt.sh")),
        }]);

        assert_eq!(sources, vec![SourceDeclaration {
            password_script_path: Some(PathBuf::from("/opt/decrypt.sh")),
            ..SourceDeclaration::new("Private", "https://private.example/index.json")
        }]);
    }

    #[test]
    fn unknown_sources_are_added_only_with_url() {
        let mut sources = vec![];
        overlay_settings(&mut sources, &[
            SourceSetting {
                name: "NoUrl".to_string(),
                url: None,
                password_script_path: None,
            },
            SourceSetting {
                name: "New".to_string(),
                url: Some("https://new.example/index.json".to_string()),
                password_script_path: None,
            },
        ]);

        assert_eq!(sources, vec![SourceDeclaration::new(
            "New",
            "https://new.example/index.json"
        )]);
    }

    #[test]
    fn name_matching_is_case_sensitive() {
        let mut sources = vec![SourceDeclaration::new(
            "Private",
            "https://private.example/index.json",
        )];
        overlay_settings(&mut sources, &[SourceSetting {
            name: "private".to_string(),
            url: Some("https://lower.example/index.json".to_string()),
            password_script_path: None,
        }]);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].name, "private");
    }
}
