/*
 * This file is part of machid.
 *
 * Copyright (C) 2025 machid contributors
 *
 * machid is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * machid is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with machid. If not, see <https://www.gnu.org/licenses/>.
 */

//! Per-user identifier cache
//!
//! Keeps the last generated IDs in `~/.config/machid/cache.json` so a
//! reconstructable ID computed once as root can be read back later without
//! privilege. When run through sudo or pkexec the file goes to the invoking
//! user's home and is handed back to that user.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::constants::{limits, paths, warnings};
use crate::error::{MachIdError, Result};
use crate::machid::MachId;
use crate::privilege::{self, InvokingUser};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cached identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub remachid: String,
    #[serde(default)]
    pub emachid: String,
    /// Salt both IDs were generated with
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub action_count: u64,
    /// Unix seconds
    #[serde(default)]
    pub created_at: u64,
}

/// An ID and whether it was served from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedId {
    pub id: String,
    pub from_cache: bool,
}

/// Cache file plus the user who should own it
#[derive(Debug, Clone)]
pub struct IdentifierCache {
    path: PathBuf,
    owner: Option<InvokingUser>,
}

impl IdentifierCache {
    /// Cache in the invoking user's config directory
    pub fn for_invoking_user() -> Self {
        let owner = privilege::invoking_user();
        let dir = owner
            .as_ref()
            .map(|u| u.home.join(".config").join(paths::USER_CONFIG_DIR_NAME))
            .or_else(privilege::user_config_dir)
            .unwrap_or_else(|| env::temp_dir().join(paths::USER_CONFIG_DIR_NAME));

        Self {
            path: dir.join(paths::CACHE_FILE),
            owner,
        }
    }

    /// Cache at an explicit path, never chowned
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owner: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> Option<&InvokingUser> {
        self.owner.as_ref()
    }

    /// Read the cache. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<CacheEntry>> {
        let meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(MachIdError::file_read(&self.path, e)),
        };

        if meta.len() > limits::MAX_CACHE_SIZE {
            return Err(MachIdError::file_read(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidData, "cache file too large"),
            ));
        }

        let contents =
            fs::read_to_string(&self.path).map_err(|e| MachIdError::file_read(&self.path, e))?;
        let entry: CacheEntry = serde_json::from_str(&contents)?;
        debug!("Loaded cache from {:?}", self.path);
        Ok(Some(entry))
    }

    /// Write the cache atomically
    pub fn save(&self, entry: &CacheEntry) -> Result<()> {
        let mut created = Vec::new();
        if let Some(parent) = self.path.parent() {
            created = missing_dirs(parent, self.owner.as_ref().map(|u| u.home.as_path()));
            fs::create_dir_all(parent).map_err(|e| MachIdError::file_write(parent, e))?;
        }

        let json = serde_json::to_string_pretty(entry)?;

        let temp_path = self.path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(MachIdError::file_write(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(MachIdError::file_write(&self.path, e));
        }

        if privilege::is_elevated() {
            if let Some(owner) = &self.owner {
                self.hand_back(&created, owner);
            }
        }

        debug!("Saved cache to {:?}", self.path);
        Ok(())
    }

    /// Delete the cache file. Absent is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared cache {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MachIdError::file_write(&self.path, e)),
        }
    }

    /// Cached reMachID if it matches `salt`, else generate (needs root) and store it
    pub fn get_or_create_reconstructable(&self, machid: &MachId, salt: &str) -> Result<CachedId> {
        let mut entry = self.load_or_default();

        if !entry.remachid.is_empty() && salt_matches(&entry.salt, salt) {
            debug!("reMachID served from cache");
            return Ok(CachedId {
                id: entry.remachid,
                from_cache: true,
            });
        }

        let id = machid.reconstructable(salt)?;
        entry.remachid = id.clone();
        entry.salt = salt.to_string();
        self.store(machid, entry);

        Ok(CachedId {
            id,
            from_cache: false,
        })
    }

    /// Cached eMachID if it matches `salt`, else generate and store one
    pub fn get_or_create_ephemeral(&self, machid: &MachId, salt: &str) -> Result<CachedId> {
        if salt.is_empty() {
            return Err(MachIdError::EmptySalt);
        }
        let mut entry = self.load_or_default();

        if !entry.emachid.is_empty() && salt_matches(&entry.salt, salt) {
            debug!("eMachID served from cache");
            return Ok(CachedId {
                id: entry.emachid,
                from_cache: true,
            });
        }

        let id = machid.ephemeral(salt)?;
        if !salt_matches(&entry.salt, salt) {
            // The old reMachID was bound to the old salt
            entry.remachid.clear();
        }
        entry.emachid = id.clone();
        entry.salt = salt.to_string();
        self.store(machid, entry);

        Ok(CachedId {
            id,
            from_cache: false,
        })
    }

    /// Bump and persist the action counter
    pub fn increment_action_count(&self) -> Result<u64> {
        let mut entry = self.load()?.ok_or(MachIdError::CacheNotFound)?;
        entry.action_count = entry.action_count.saturating_add(1);
        self.save(&entry)?;
        Ok(entry.action_count)
    }

    /// Give the invoking user the cache file, its directory and every
    /// directory this save had to create
    fn hand_back(&self, created: &[PathBuf], owner: &InvokingUser) {
        for dir in created {
            chown_to(dir, owner);
        }
        if let Some(parent) = self.path.parent() {
            if !created.iter().any(|d| d == parent) {
                chown_to(parent, owner);
            }
        }
        chown_to(&self.path, owner);
    }

    fn load_or_default(&self) -> CacheEntry {
        match self.load() {
            Ok(entry) => entry.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable cache {:?}: {}", self.path, e);
                CacheEntry::default()
            }
        }
    }

    fn store(&self, machid: &MachId, mut entry: CacheEntry) {
        if entry.created_at == 0 {
            entry.created_at = current_timestamp();
        }
        if let Err(e) = self.save(&entry) {
            warn!("Failed to save cache {:?}: {}", self.path, e);
            machid
                .config()
                .warn(&format!("{}{}", warnings::CACHE_SAVE_FAILED, e));
        }
    }
}

/// Directories from `dir` upwards that do not exist yet, deepest first.
/// The walk never goes above `stop`.
fn missing_dirs(dir: &Path, stop: Option<&Path>) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.exists() {
            break;
        }
        missing.push(path.to_path_buf());
        if stop == Some(path) {
            break;
        }
        current = path.parent();
    }
    missing
}

/// An unsalted entry matches any salt
fn salt_matches(stored: &str, requested: &str) -> bool {
    stored.is_empty() || stored == requested
}

fn chown_to(path: &Path, owner: &InvokingUser) {
    if let Err(e) = std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)) {
        warn!("Failed to hand {:?} back to {}: {}", path, owner.name, e);
    }
}

/// Get current Unix timestamp
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
