//! Discovery of `nuget.config` files in priority order.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::utils::logging::traceable_path;

const WORKSPACE_CONFIG_NAME: &str = "nuget.config";
const WORKSPACE_NUGET_DIR: &str = ".nuget";
const USER_CONFIG_NAME: &str = "NuGet.Config";
const MACHINE_CONFIG_NAME: &str = "Microsoft.VisualStudio.Offline.config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// The platform directories config discovery looks in.
///
/// [ConfigLocations::from_env] reads them from the running process,
/// tests construct them directly.
#[derive(Debug, Clone)]
pub struct ConfigLocations {
    pub platform: Platform,
    pub home_dir: Option<PathBuf>,
    /// `%APPDATA%`
    pub app_data: Option<PathBuf>,
    /// `%ProgramFiles(x86)%`
    pub program_files_x86: Option<PathBuf>,
    /// `%ProgramFiles%`
    pub program_files: Option<PathBuf>,
}

impl ConfigLocations {
    pub fn from_env() -> Self {
        Self {
            platform: Platform::current(),
            home_dir: dirs::home_dir(),
            app_data: env_path("APPDATA"),
            program_files_x86: env_path("ProgramFiles(x86)"),
            program_files: env_path("ProgramFiles"),
        }
    }

    /// Config files that apply to `workspace_root`, highest priority first:
    ///
    /// 1. `<workspace>/nuget.config` (any filename casing)
    /// 2. `<workspace>/.nuget/nuget.config`
    /// 3. the user config
    /// 4. the machine config (Windows only)
    pub async fn discover(&self, workspace_root: Option<&Path>) -> Vec<PathBuf> {
        let mut files = Vec::new();

        if let Some(root) = workspace_root {
            files.extend(find_file_case_insensitive(root, WORKSPACE_CONFIG_NAME).await);
            files.extend(
                find_file_case_insensitive(&root.join(WORKSPACE_NUGET_DIR), WORKSPACE_CONFIG_NAME)
                    .await,
            );
        }

        files.extend(first_existing(self.user_config_candidates()).await);
        files.extend(first_existing(self.machine_config_candidates()).await);

        debug!(
            files = ?files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
            "discovered config files"
        );
        files
    }

    fn user_config_candidates(&self) -> Vec<PathBuf> {
        let dot_nuget = self
            .home_dir
            .as_ref()
            .map(|home| home.join(".nuget").join("NuGet").join(USER_CONFIG_NAME));

        match self.platform {
            Platform::Windows => {
                let app_data = self
                    .app_data
                    .as_ref()
                    .map(|app_data| app_data.join("NuGet").join(USER_CONFIG_NAME));
                app_data.into_iter().chain(dot_nuget).collect()
            },
            Platform::Unix => {
                let dot_config = self
                    .home_dir
                    .as_ref()
                    .map(|home| home.join(".config").join("NuGet").join(USER_CONFIG_NAME));
                dot_nuget.into_iter().chain(dot_config).collect()
            },
        }
    }

    fn machine_config_candidates(&self) -> Vec<PathBuf> {
        if self.platform != Platform::Windows {
            return Vec::new();
        }
        self.program_files_x86
            .as_ref()
            .or(self.program_files.as_ref())
            .map(|program_files| {
                program_files
                    .join("NuGet")
                    .join("Config")
                    .join(MACHINE_CONFIG_NAME)
            })
            .into_iter()
            .collect()
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

async fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    for candidate in candidates {
        if is_file(&candidate).await {
            return Some(candidate);
        }
        trace!(path = traceable_path(&candidate), "config candidate not found");
    }
    None
}

/// Find `file_name` in `dir` ignoring ASCII case.
///
/// If several spellings exist the lexicographically smallest path is used.
async fn find_file_case_insensitive(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut matches = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name_matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.eq_ignore_ascii_case(file_name));
        if name_matches && is_file(&entry.path()).await {
            matches.push(entry.path());
        }
    }
    matches.sort();
    matches.into_iter().next()
}
