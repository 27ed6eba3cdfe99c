use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use crate::credentials::CredentialStore;
use crate::decoder::SecretDecoder;
use crate::error::ConfigParseError;
use crate::locations::ConfigLocations;
use crate::nuget_config::{SourceDeclaration, SourceMerge};
use crate::settings::{SourceSetting, overlay_settings};
use crate::utils::logging::traceable_path;

/// Resolves the package sources that apply to a workspace.
///
/// Config files are re-read on every call; the decoder and credential store
/// are shared with the rest of the process.
#[derive(Debug)]
pub struct SourceResolver {
    locations: ConfigLocations,
    settings: Vec<SourceSetting>,
    decoder: Arc<SecretDecoder>,
    credentials: Arc<CredentialStore>,
}

impl SourceResolver {
    pub fn new(
        locations: ConfigLocations,
        decoder: Arc<SecretDecoder>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            locations,
            settings: Vec::new(),
            decoder,
            credentials,
        }
    }

    /// Sources declared in editor/user settings, see [overlay_settings].
    pub fn with_source_settings(mut self, settings: Vec<SourceSetting>) -> Self {
        self.settings = settings;
        self
    }

    pub fn decoder(&self) -> &Arc<SecretDecoder> {
        &self.decoder
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Sources and credentials exactly as declared in config files.
    ///
    /// Files are merged in discovery order, so a later (lower priority) file
    /// overwrites a source of the same name from an earlier one.
    /// Unreadable or malformed files are logged and skipped.
    /// Does not touch the credential store.
    #[instrument(skip(self))]
    pub async fn resolve_sources_with_credentials(
        &self,
        workspace_root: Option<&Path>,
    ) -> Vec<SourceDeclaration> {
        let mut merge = SourceMerge::new();

        for file in self.locations.discover(workspace_root).await {
            let contribution = match tokio::fs::read_to_string(&file).await {
                Ok(xml) => merge
                    .apply_document(&xml)
                    .map_err(|err| ConfigParseError::Malformed {
                        file: file.clone(),
                        err,
                    }),
                Err(err) => Err(ConfigParseError::Read {
                    file: file.clone(),
                    err,
                }),
            };

            match contribution {
                Ok(()) => debug!(file = traceable_path(&file), "merged config file"),
                Err(err) => warn!(
                    file = traceable_path(&file),
                    error = %err,
                    "skipping config file"
                ),
            }
        }

        merge.finish()
    }

    /// Resolve all sources, including settings and decoded credentials.
    ///
    /// Every source with a username or password is recorded in the
    /// credential store. A password is decoded when the source has a
    /// password script; if decoding fails the encoded value is kept.
    #[instrument(skip(self))]
    pub async fn resolve_sources(&self, workspace_root: Option<&Path>) -> Vec<SourceDeclaration> {
        let mut sources = self.resolve_sources_with_credentials(workspace_root).await;
        overlay_settings(&mut sources, &self.settings);

        self.decoder.sweep_expired();
        for source in sources.iter_mut() {
            self.resolve_credential(source).await;
        }

        debug!(count = sources.len(), "resolved package sources");
        sources
    }

    async fn resolve_credential(&self, source: &mut SourceDeclaration) {
        let encoded = source
            .password
            .as_deref()
            .filter(|password| !password.is_empty());

        match (&source.password_script_path, encoded) {
            (Some(script), Some(encoded)) => {
                match self.decoder.decode(script, encoded).await {
                    Ok(decoded) => source.password = Some(decoded),
                    Err(err) => error!(
                        source = %source.name,
                        script = traceable_path(script),
                        error = %err,
                        "failed to decode password, using it as is"
                    ),
                }
                self.credentials.set(
                    &source.name,
                    source.username.clone(),
                    source.password.clone(),
                );
            },
            _ if source.username.is_some() || source.password.is_some() => {
                self.credentials.set(
                    &source.name,
                    source.username.clone(),
                    source.password.clone(),
                );
            },
            _ => {},
        }
    }
}
