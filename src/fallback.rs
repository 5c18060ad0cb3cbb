//! Persisted fallback tokens
//!
//! When the firmware exposes neither a serial nor a UUID, two random tokens
//! stored under `/etc/.machid` stand in for them. Each token is created once
//! and then returned unchanged until [`FallbackStore::clear_tokens`] removes it.
//!
//! Layout:
//! - `/etc/.machid/` (0700)
//! - `/etc/.machid/.mserial` (0600), 128 hex characters
//! - `/etc/.machid/.muuid` (0600), 128 hex characters

use std::fmt;
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::constants::{fallback, paths};
use crate::error::{MachIdError, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Serial and UUID substitutes read from (or just written to) disk
pub struct FallbackTokens {
    pub serial: Zeroizing<String>,
    pub uuid: Zeroizing<String>,
}

impl fmt::Debug for FallbackTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackTokens")
            .field("serial", &"<redacted>")
            .field("uuid", &"<redacted>")
            .finish()
    }
}

/// Location of the fallback token files
#[derive(Debug, Clone)]
pub struct FallbackStore {
    dir: PathBuf,
}

impl FallbackStore {
    /// Store under `/etc/.machid`
    pub fn new() -> Self {
        Self::with_dir(paths::FALLBACK_DIR)
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn serial_path(&self) -> PathBuf {
        self.dir.join(fallback::SERIAL_FILE)
    }

    pub fn uuid_path(&self) -> PathBuf {
        self.dir.join(fallback::UUID_FILE)
    }

    /// Return both tokens, creating whichever is missing.
    ///
    /// Safe to call repeatedly. Concurrent first-time callers converge on a
    /// single value per token: a new token is published with a create-if-absent
    /// link, and a loser re-reads the winner's token.
    pub fn ensure_tokens(&self) -> Result<FallbackTokens> {
        self.ensure_dir()?;
        let serial = read_or_create_token(&self.serial_path())?;
        let uuid = read_or_create_token(&self.uuid_path())?;
        Ok(FallbackTokens { serial, uuid })
    }

    /// Remove both token files, then the directory if it is empty
    pub fn clear_tokens(&self) -> Result<()> {
        for path in [self.serial_path(), self.uuid_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed fallback token {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(MachIdError::file_write(path, e)),
            }
        }
        // Fails when something else lives there, which is fine
        let _ = fs::remove_dir(&self.dir);
        info!("Cleared fallback tokens in {:?}", self.dir);
        Ok(())
    }

    /// True only if both token files are present
    pub fn tokens_exist(&self) -> bool {
        self.serial_path().exists() && self.uuid_path().exists()
    }

    fn ensure_dir(&self) -> Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(fallback::DIR_MODE)
            .create(&self.dir)
            .map_err(|e| MachIdError::fallback(&self.dir, e.to_string()))?;
        // An existing directory keeps its old mode unless tightened here
        fs::set_permissions(&self.dir, Permissions::from_mode(fallback::DIR_MODE))
            .map_err(|e| MachIdError::fallback(&self.dir, e.to_string()))
    }
}

impl Default for FallbackStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `Ok(None)` only for a missing or blank file. Anything else unreadable is an
/// error so a stored token is never replaced behind the caller's back.
fn read_token(path: &Path) -> Result<Option<Zeroizing<String>>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => Zeroizing::new(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MachIdError::fallback(path, e.to_string())),
    };
    let token = data.trim();
    if token.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Zeroizing::new(token.to_string())))
    }
}

fn generate_token(path: &Path) -> Result<Zeroizing<String>> {
    let mut bytes = Zeroizing::new([0u8; fallback::TOKEN_BYTES]);
    getrandom::getrandom(&mut bytes[..])
        .map_err(|e| MachIdError::fallback(path, format!("failed to generate random data: {}", e)))?;
    Ok(Zeroizing::new(hex::encode(&bytes[..])))
}

fn read_or_create_token(path: &Path) -> Result<Zeroizing<String>> {
    if let Some(token) = read_token(path)? {
        return Ok(token);
    }

    let token = generate_token(path)?;
    let tmp = write_temp(path, token.as_bytes())?;

    match fs::hard_link(&tmp, path) {
        Ok(()) => {
            let _ = fs::remove_file(&tmp);
            info!("Created fallback token {:?}", path);
            Ok(token)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // Another caller won the race, or an empty file was left behind
            match read_token(path) {
                Ok(Some(existing)) => {
                    let _ = fs::remove_file(&tmp);
                    debug!("Fallback token {:?} created concurrently, reusing it", path);
                    Ok(existing)
                }
                Ok(None) => {
                    publish_by_rename(&tmp, path)?;
                    Ok(token)
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp);
                    Err(e)
                }
            }
        }
        Err(e) => {
            warn!("hard link into {:?} failed ({}), replacing by rename", path, e);
            publish_by_rename(&tmp, path)?;
            Ok(token)
        }
    }
}

fn write_temp(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        "{}.{}.{}.tmp",
        name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let write = || -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(fallback::FILE_MODE)
            .open(&tmp)?;
        file.set_permissions(Permissions::from_mode(fallback::FILE_MODE))?;
        file.write_all(data)?;
        file.sync_all()
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(MachIdError::fallback(path, e.to_string()));
    }
    Ok(tmp)
}

fn publish_by_rename(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        MachIdError::fallback(path, e.to_string())
    })
}
