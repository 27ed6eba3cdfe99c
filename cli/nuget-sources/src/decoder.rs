//! Decoding of obfuscated source passwords through an external decrypt script.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::cache::CacheEntry;
use crate::error::DecodeError;
use crate::utils::logging::traceable_path;

/// How long a decoded secret is reused before the script runs again.
pub const DECODE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// How a decrypt script is launched, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    /// `.ps1`, run through a PowerShell host
    PowerShell,
    /// `.bat` / `.cmd`, run through the platform command shell
    CommandShell,
    /// anything else is executed directly
    Executable,
}

impl ScriptKind {
    fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("ps1") => ScriptKind::PowerShell,
            Some("bat" | "cmd") => ScriptKind::CommandShell,
            _ => ScriptKind::Executable,
        }
    }

    /// The encoded secret is always the sole positional argument of the script.
    fn command(self, script: &Path, encoded_secret: &str) -> Command {
        let mut command = match self {
            ScriptKind::PowerShell => {
                let host = if cfg!(windows) { "powershell.exe" } else { "pwsh" };
                let mut command = Command::new(host);
                command
                    .args(["-NoProfile", "-NonInteractive"])
                    .args(["-ExecutionPolicy", "Bypass"])
                    .arg("-File")
                    .arg(script);
                command
            },
            ScriptKind::CommandShell if cfg!(windows) => {
                let mut command = Command::new("cmd.exe");
                command.args(["/D", "/C"]).arg(script);
                command
            },
            ScriptKind::CommandShell => {
                let mut command = Command::new("sh");
                command.arg(script);
                command
            },
            ScriptKind::Executable => Command::new(script),
        };
        command.arg(encoded_secret);
        command
    }
}

/// Runs decrypt scripts and caches their output.
///
/// Results are cached per `(script, encoded secret)` pair for
/// [DECODE_CACHE_TTL]. Failures are never cached.
#[derive(Debug)]
pub struct SecretDecoder {
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry<String>>>,
}

impl Default for SecretDecoder {
    fn default() -> Self {
        Self::with_ttl(DECODE_CACHE_TTL)
    }
}

impl SecretDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decode `encoded_secret` by running the script at `script_path`.
    ///
    /// The script succeeds if it exits with code 0 and prints a non-blank
    /// value on stdout, which is returned trimmed.
    #[instrument(skip_all, fields(script = traceable_path(script_path.as_ref())))]
    pub async fn decode(
        &self,
        script_path: impl AsRef<Path>,
        encoded_secret: &str,
    ) -> Result<String, DecodeError> {
        let script_path = script_path.as_ref();
        if script_path.as_os_str().is_empty() || encoded_secret.trim().is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        let key = format!("{}:{}", script_path.display(), encoded_secret);
        if let Some(decoded) = self.cached(&key) {
            debug!("using cached decoded secret");
            return Ok(decoded);
        }

        let decoded = run_script(script_path, encoded_secret).await?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(key, CacheEntry::new(decoded.clone()));
        Ok(decoded)
    }

    fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|entry| entry.is_valid(self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// Drop every cached secret.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
    }

    /// Drop only the cached secrets whose TTL has elapsed.
    pub fn sweep_expired(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, entry| entry.is_valid(self.ttl));
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.len()
    }
}

async fn run_script(script_path: &Path, encoded_secret: &str) -> Result<String, DecodeError> {
    let mut child = ScriptKind::from_path(script_path)
        .command(script_path, encoded_secret)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| DecodeError::SpawnFailure {
            message: err.to_string(),
        })?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(DecodeError::SpawnFailure {
            message: "decrypt script output was not captured".to_string(),
        });
    };

    let (stdout, stderr, status) =
        tokio::join!(read_stdout(stdout), mirror_stderr(stderr), child.wait());

    let status = status.map_err(|err| DecodeError::SpawnFailure {
        message: err.to_string(),
    })?;
    debug!(%status, "decrypt script finished");

    if !status.success() {
        return Err(DecodeError::NonZeroExit {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    let stdout = stdout?;
    let decoded = stdout.trim();
    if decoded.is_empty() {
        return Err(DecodeError::EmptyOutput);
    }
    Ok(decoded.to_string())
}

/// Stdout carries the secret, so it is collected but never logged.
async fn read_stdout(mut stdout: impl AsyncRead + Unpin) -> Result<String, DecodeError> {
    let mut buffer = Vec::new();
    stdout
        .read_to_end(&mut buffer)
        .await
        .map_err(|err| DecodeError::UnreadableOutput {
            message: err.to_string(),
        })?;
    String::from_utf8(buffer).map_err(|err| DecodeError::UnreadableOutput {
        message: err.to_string(),
    })
}

async fn mirror_stderr(stderr: impl AsyncRead + Unpin) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut collected = Vec::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "decrypt_script", "{line}");
                collected.push(line);
            },
            Ok(None) => break,
            Err(err) => {
                debug!(%err, "failed to read decrypt script stderr");
                break;
            },
        }
    }
    collected.join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn script_kind_from_extension() {
        assert_eq!(
            ScriptKind::from_path(Path::new("decrypt.ps1")),
            ScriptKind::PowerShell
        );
        assert_eq!(
            ScriptKind::from_path(Path::new("decrypt.PS1")),
            ScriptKind::PowerShell
        );
        assert_eq!(
            ScriptKind::from_path(Path::new("decrypt.bat")),
            ScriptKind::CommandShell
        );
        assert_eq!(
            ScriptKind::from_path(Path::new("decrypt.cmd")),
            ScriptKind::CommandShell
        );
        assert_eq!(
            ScriptKind::from_path(Path::new("decrypt.sh")),
            ScriptKind::Executable
        );
        assert_eq!(
            ScriptKind::from_path(Path::new("decrypt")),
            ScriptKind::Executable
        );
    }

    #[test]
    fn secret_is_the_last_positional_argument() {
        let command = ScriptKind::PowerShell.command(Path::new("decrypt.ps1"), "c2VjcmV0");
        let args = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(args.last().map(String::as_str), Some("c2VjcmV0"));
        assert!(args.contains(&"-NoProfile".to_string()));
        assert!(args.contains(&"Bypass".to_string()));
    }

    #[tokio::test]
    async fn empty_input_never_spawns() {
        let decoder = SecretDecoder::new();

        let result = decoder.decode("", "x").await;
        assert!(matches!(result, Err(DecodeError::EmptyInput)), "{result:?}");

        let result = decoder.decode("/does/not/exist.cmd", "").await;
        assert!(matches!(result, Err(DecodeError::EmptyInput)), "{result:?}");

        let result = decoder.decode("/does/not/exist.cmd", "   ").await;
        assert!(matches!(result, Err(DecodeError::EmptyInput)), "{result:?}");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let tempdir = TempDir::new().unwrap();
        let decoder = SecretDecoder::new();

        let result = decoder
            .decode(tempdir.path().join("missing-decrypt"), "secret")
            .await;
        assert!(
            matches!(result, Err(DecodeError::SpawnFailure { .. })),
            "{result:?}"
        );
    }

    /// Writes a `.cmd` script which on unix is run through `sh`,
    /// so it doesn't need to be executable.
    #[cfg(unix)]
    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("decrypt.cmd");
        fs::write(&path, body).unwrap();
        path
    }

    #[cfg(unix)]
    fn invocations(dir: &TempDir) -> usize {
        fs::read_to_string(dir.path().join("invocations"))
            .map(|content| content.lines().count())
            .unwrap_or(0)
    }

    #[cfg(unix)]
    const COUNTING_SCRIPT: &str = r#"
echo run >> "$(dirname "$0")/invocations"
printf '  decoded-%s  \n' "$1"
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn decodes_trimmed_stdout() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, COUNTING_SCRIPT);
        let decoder = SecretDecoder::new();

        let decoded = decoder.decode(&script, "abc").await.unwrap();
        assert_eq!(decoded, "decoded-abc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn repeated_decodes_run_the_script_once() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, COUNTING_SCRIPT);
        let decoder = SecretDecoder::new();

        for _ in 0..5 {
            assert_eq!(decoder.decode(&script, "abc").await.unwrap(), "decoded-abc");
        }
        assert_eq!(invocations(&tempdir), 1);

        // a different secret is a different cache key
        decoder.decode(&script, "def").await.unwrap();
        assert_eq!(invocations(&tempdir), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clear_cache_forces_a_new_invocation() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, COUNTING_SCRIPT);
        let decoder = SecretDecoder::new();

        decoder.decode(&script, "abc").await.unwrap();
        decoder.clear_cache();
        decoder.decode(&script, "abc").await.unwrap();

        assert_eq!(invocations(&tempdir), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn expired_entries_are_decoded_again_and_swept() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, COUNTING_SCRIPT);
        let decoder = SecretDecoder::with_ttl(Duration::ZERO);

        decoder.decode(&script, "abc").await.unwrap();
        decoder.decode(&script, "abc").await.unwrap();
        assert_eq!(invocations(&tempdir), 2);

        assert_eq!(decoder.cache_len(), 1);
        decoder.sweep_expired();
        assert_eq!(decoder.cache_len(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sweep_keeps_valid_entries() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, COUNTING_SCRIPT);
        let decoder = SecretDecoder::new();

        decoder.decode(&script, "abc").await.unwrap();
        decoder.sweep_expired();
        assert_eq!(decoder.cache_len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, "echo 'bad secret' >&2\nexit 3\n");
        let decoder = SecretDecoder::new();

        let result = decoder.decode(&script, "abc").await;
        match result {
            Err(DecodeError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad secret");
            },
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn blank_stdout_is_empty_output() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, "printf '   \\n'\n");
        let decoder = SecretDecoder::new();

        let result = decoder.decode(&script, "abc").await;
        assert!(matches!(result, Err(DecodeError::EmptyOutput)), "{result:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_stdout_is_unreadable_output() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(&tempdir, "printf 'secret\\377value'\n");
        let decoder = SecretDecoder::new();

        let result = decoder.decode(&script, "abc").await;
        assert!(
            matches!(result, Err(DecodeError::UnreadableOutput { .. })),
            "{result:?}"
        );
        assert_eq!(decoder.cache_len(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failures_are_not_cached() {
        let tempdir = TempDir::new().unwrap();
        let script = write_script(
            &tempdir,
            "echo run >> \"$(dirname \"$0\")/invocations\"\nexit 1\n",
        );
        let decoder = SecretDecoder::new();

        assert!(decoder.decode(&script, "abc").await.is_err());
        assert!(decoder.decode(&script, "abc").await.is_err());
        assert_eq!(invocations(&tempdir), 2);
        assert_eq!(decoder.cache_len(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn other_extensions_are_executed_directly() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let script = tempdir.path().join("decrypt.sh");
        fs::write(&script, "#!/bin/sh\necho \"plain-$1\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let decoder = SecretDecoder::new();
        assert_eq!(decoder.decode(&script, "xyz").await.unwrap(), "plain-xyz");
    }
}
