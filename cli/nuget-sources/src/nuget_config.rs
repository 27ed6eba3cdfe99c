//! Parsing and merging of `nuget.config` documents.
//!
//! Documents are applied one after another to a [SourceMerge]:
//!
//! - `<packageSources>`: `<add key= value= />` inserts or overwrites a
//!   source by name, `<clear/>` drops every source and disabled name
//!   collected so far (credentials survive)
//! - `<disabledPackageSources>`: `<add key= value="true"/>` disables a source
//! - `<packageSourceCredentials>`: one child element per source, named after
//!   the source with XML name escapes (`_x0020_` for a space), holding
//!   `Username` and `Password` (or `ClearTextPassword`) entries
//!
//! A later document overwrites sources of the same name from an earlier one.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use roxmltree::{Document, Node};
use tracing::trace;

use crate::credentials::ResolvedCredential;

const PACKAGE_SOURCES: &str = "packageSources";
const DISABLED_PACKAGE_SOURCES: &str = "disabledPackageSources";
const PACKAGE_SOURCE_CREDENTIALS: &str = "packageSourceCredentials";

static XML_NAME_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("_x([0-9A-Fa-f]{4})_").expect("escape pattern is valid"));

/// A named package source.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SourceDeclaration {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    /// Possibly still encoded, see [crate::SecretDecoder].
    pub password: Option<String>,
    pub password_script_path: Option<PathBuf>,
}

impl SourceDeclaration {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Debug for SourceDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDeclaration")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("password_script_path", &self.password_script_path)
            .finish()
    }
}

/// Accumulated state while applying config documents in order.
#[derive(Debug, Default)]
pub struct SourceMerge {
    sources: IndexMap<String, SourceDeclaration>,
    disabled: HashSet<String>,
    credentials: HashMap<String, ResolvedCredential>,
}

impl SourceMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `xml` and apply its declarations.
    ///
    /// A malformed document leaves the merge state untouched.
    /// A `<clear/>` only discards names disabled by earlier documents,
    /// wherever the document's own `<disabledPackageSources>` appears.
    pub fn apply_document(&mut self, xml: &str) -> Result<(), roxmltree::Error> {
        let document = Document::parse(xml)?;
        let root = document.root_element();

        let mut disabled = HashSet::new();
        for section in child_elements(root) {
            match section.tag_name().name() {
                PACKAGE_SOURCES => self.apply_package_sources(section),
                DISABLED_PACKAGE_SOURCES => collect_disabled_sources(section, &mut disabled),
                PACKAGE_SOURCE_CREDENTIALS => self.apply_credentials(section),
                _ => {},
            }
        }
        self.disabled.extend(disabled);
        Ok(())
    }

    fn apply_package_sources(&mut self, section: Node) {
        for node in child_elements(section) {
            match node.tag_name().name() {
                "clear" => {
                    trace!("clearing sources declared so far");
                    self.sources.clear();
                    self.disabled.clear();
                },
                "add" => {
                    let (Some(key), Some(value)) = (node.attribute("key"), node.attribute("value"))
                    else {
                        trace!("skipping package source without key or value");
                        continue;
                    };
                    self.sources
                        .insert(key.to_string(), SourceDeclaration::new(key, value));
                },
                _ => {},
            }
        }
    }

    fn apply_credentials(&mut self, section: Node) {
        for source in child_elements(section) {
            let name = decode_xml_name(source.tag_name().name());
            let mut username = None;
            let mut password = None;
            let mut clear_text_password = None;

            for node in child_elements(source).filter(|node| node.has_tag_name("add")) {
                let (Some(key), Some(value)) = (node.attribute("key"), node.attribute("value"))
                else {
                    continue;
                };
                if key.eq_ignore_ascii_case("Username") {
                    username = Some(value.to_string());
                } else if key.eq_ignore_ascii_case("Password") {
                    password = Some(value.to_string());
                } else if key.eq_ignore_ascii_case("ClearTextPassword") {
                    clear_text_password = Some(value.to_string());
                }
            }

            self.credentials.insert(name, ResolvedCredential {
                username,
                password: password.or(clear_text_password),
            });
        }
    }

    /// Apply credentials to their sources and drop disabled sources.
    pub fn finish(self) -> Vec<SourceDeclaration> {
        let SourceMerge {
            sources,
            disabled,
            mut credentials,
        } = self;

        sources
            .into_values()
            .filter(|source| !disabled.contains(&source.name))
            .map(|mut source| {
                if let Some(credential) = credentials.remove(&source.name) {
                    source.username = credential.username;
                    source.password = credential.password;
                }
                source
            })
            .collect()
    }
}

fn collect_disabled_sources(section: Node, disabled: &mut HashSet<String>) {
    for node in child_elements(section).filter(|node| node.has_tag_name("add")) {
        let is_disabled = node
            .attribute("value")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
        if let (true, Some(key)) = (is_disabled, node.attribute("key")) {
            disabled.insert(key.to_string());
        }
    }
}

fn child_elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

/// Undo XML name escaping, e.g. `My_x0020_Feed` becomes `My Feed`.
pub fn decode_xml_name(name: &str) -> String {
    XML_NAME_ESCAPE
        .replace_all(name, |captures: &Captures| {
            u32::from_str_radix(&captures[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}
