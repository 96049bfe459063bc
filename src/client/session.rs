// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-side session storage.
//!
//! A session is the token triple returned by the identity provider. Stores
//! only ever hold a complete triple; anything partial reads back as "logged
//! out".

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Name of the session document inside the store directory.
pub const SESSION_FILE: &str = "session.json";

/// Access, id and refresh tokens issued together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTriple {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds, as reported by the issuer.
    #[serde(default)]
    pub expires_in: u64,
}

impl TokenTriple {
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.id_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl std::fmt::Debug for TokenTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenTriple")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("refusing to store an incomplete token set")]
    Incomplete,

    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable slot holding at most one session.
pub trait SessionStore: Send + Sync {
    /// The current session, or `None` when logged out.
    fn get(&self) -> Option<TokenTriple>;

    /// Replace the session. Incomplete triples are rejected.
    fn set(&self, tokens: TokenTriple) -> Result<(), SessionStoreError>;

    /// Remove the session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), SessionStoreError>;

    /// Replace the session with `next`, or clear it when `next` is `None`,
    /// only if the stored session still equals `expected`.
    ///
    /// Returns `Ok(false)` and leaves the store untouched when the session
    /// changed in the meantime.
    fn replace_if_current(
        &self,
        expected: &TokenTriple,
        next: Option<TokenTriple>,
    ) -> Result<bool, SessionStoreError>;
}

fn check_complete(next: &Option<TokenTriple>) -> Result<(), SessionStoreError> {
    match next {
        Some(tokens) if !tokens.is_complete() => Err(SessionStoreError::Incomplete),
        _ => Ok(()),
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: RwLock<Option<TokenTriple>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<TokenTriple> {
        self.slot.read().ok()?.clone()
    }

    fn set(&self, tokens: TokenTriple) -> Result<(), SessionStoreError> {
        if !tokens.is_complete() {
            return Err(SessionStoreError::Incomplete);
        }
        *self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tokens);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }

    fn replace_if_current(
        &self,
        expected: &TokenTriple,
        next: Option<TokenTriple>,
    ) -> Result<bool, SessionStoreError> {
        check_complete(&next)?;
        let mut slot = self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref() != Some(expected) {
            return Ok(false);
        }
        *slot = next;
        Ok(true)
    }
}

/// Store persisting the session as JSON in `<dir>/session.json`.
///
/// Writes go to a temporary file that is renamed over the document, so a
/// crash mid-write leaves either the old or the new session. The loaded
/// session is mirrored in memory.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cached: RwLock<Option<TokenTriple>>,
}

impl FileSessionStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SessionStoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(SESSION_FILE);
        let cached = load(&path);
        debug!(path = %path.display(), restored = cached.is_some(), "session store opened");
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `next` and mirror it. Callers hold the mirror's write lock so
    /// the file and mirror never disagree.
    fn store(&self, cached: &mut Option<TokenTriple>, next: Option<TokenTriple>) -> Result<(), SessionStoreError> {
        match &next {
            Some(tokens) => self.write_atomically(&serde_json::to_vec(tokens)?)?,
            None => match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        *cached = next;
        Ok(())
    }

    fn write_atomically(&self, bytes: &[u8]) -> Result<(), SessionStoreError> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn load(path: &Path) -> Option<TokenTriple> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "session file unreadable, treating as logged out");
            return None;
        }
    };
    match serde_json::from_slice::<TokenTriple>(&bytes) {
        Ok(tokens) if tokens.is_complete() => Some(tokens),
        Ok(_) => {
            warn!(path = %path.display(), "session file holds a partial token set, treating as logged out");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "session file is corrupt, treating as logged out");
            None
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<TokenTriple> {
        self.cached.read().ok()?.clone()
    }

    fn set(&self, tokens: TokenTriple) -> Result<(), SessionStoreError> {
        let next = Some(tokens);
        check_complete(&next)?;
        let mut cached = self.cached.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.store(&mut cached, next)
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        let mut cached = self.cached.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.store(&mut cached, None)
    }

    fn replace_if_current(
        &self,
        expected: &TokenTriple,
        next: Option<TokenTriple>,
    ) -> Result<bool, SessionStoreError> {
        check_complete(&next)?;
        let mut cached = self.cached.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if cached.as_ref() != Some(expected) {
            return Ok(false);
        }
        self.store(&mut cached, next)?;
        Ok(true)
    }
}
