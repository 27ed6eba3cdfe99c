//! Error types for source resolution and secret decoding.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn an obfuscated secret into plaintext.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no decrypt script or encoded secret provided")]
    EmptyInput,
    #[error("decrypt script succeeded but printed nothing")]
    EmptyOutput,
    #[error("decrypt script {}: {stderr}", fmt_exit_code(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("couldn't run decrypt script: {message}")]
    SpawnFailure { message: String },
    #[error("couldn't read decrypt script output: {message}")]
    UnreadableOutput { message: String },
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// A config file that could not contribute to the merged source set.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    #[error("Couldn't read config file {file}: {err}")]
    Read { file: PathBuf, err: io::Error },
    #[error("Malformed config file {file}: {err}")]
    Malformed { file: PathBuf, err: roxmltree::Error },
}
