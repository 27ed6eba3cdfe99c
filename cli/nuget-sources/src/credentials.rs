use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// Username and password resolved for a package source.
///
/// The password is either the decoded secret or, if decoding failed or no
/// decrypt script was configured, the value found in the config file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Process-lifetime cache of credentials keyed by source name.
///
/// Entries are only ever overwritten by a later [CredentialStore::set] for
/// the same name or dropped by [CredentialStore::clear_all].
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: Mutex<HashMap<String, ResolvedCredential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, username: Option<String>, password: Option<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(name.into(), ResolvedCredential { username, password });
    }

    pub fn get(&self, name: &str) -> Option<ResolvedCredential> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(name)
    }

    pub fn clear_all(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }
}
