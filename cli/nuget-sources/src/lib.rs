//! Package source discovery and credential resolution.
//!
//! This crate provides:
//! - discovery of `nuget.config` files for a workspace, the user and the machine
//! - merging of `<packageSources>`, `<disabledPackageSources>` and
//!   `<packageSourceCredentials>` declarations across those files
//! - decoding of obfuscated passwords through an external decrypt script
//! - a process-lifetime [CredentialStore] shared by all consumers
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use nuget_sources::{ConfigLocations, CredentialStore, SecretDecoder, SourceResolver};
//!
//! let resolver = SourceResolver::new(
//!     ConfigLocations::from_env(),
//!     Arc::new(SecretDecoder::new()),
//!     Arc::new(CredentialStore::new()),
//! );
//! let sources = resolver.resolve_sources(Some(workspace_root)).await;
//! ```

mod cache;
mod credentials;
mod decoder;
mod error;
mod locations;
mod nuget_config;
mod resolver;
mod settings;
pub mod utils;

pub use cache::CacheEntry;
pub use credentials::{CredentialStore, ResolvedCredential};
pub use decoder::{DECODE_CACHE_TTL, SecretDecoder};
pub use error::{ConfigParseError, DecodeError};
pub use locations::{ConfigLocations, Platform};
pub use nuget_config::{SourceDeclaration, SourceMerge, decode_xml_name};
pub use resolver::SourceResolver;
pub use settings::{SourceSetting, overlay_settings, parse_source_settings};
