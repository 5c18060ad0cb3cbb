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

//! Privilege gate and invoking-user resolution
//!
//! Reconstructable IDs and fallback mutation need root. When root was reached
//! through sudo or pkexec, the user who asked for elevation is recovered from
//! `SUDO_USER`/`SUDO_UID`/`SUDO_GID` or `PKEXEC_UID` plus `/etc/passwd`, so
//! per-user state lands in (and stays readable from) that user's home.

use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::constants::paths;
use crate::error::{MachIdError, Result};

/// Answers "is this process privileged?"
#[cfg_attr(test, mockall::automock)]
pub trait PrivilegeCheck: Send + Sync {
    fn is_privileged(&self) -> bool;
}

/// Privileged means effective UID 0
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectiveUid;

impl PrivilegeCheck for EffectiveUid {
    fn is_privileged(&self) -> bool {
        is_elevated()
    }
}

/// Whether the effective UID is root
pub fn is_elevated() -> bool {
    // SAFETY: geteuid is always safe - it just returns the effective user ID of the process.
    unsafe { libc::geteuid() == 0 }
}

/// `Err(NotPrivileged)` unless `check` reports privilege
pub fn require_privilege(check: &dyn PrivilegeCheck) -> Result<()> {
    if check.is_privileged() {
        Ok(())
    } else {
        Err(MachIdError::NotPrivileged)
    }
}

/// The non-elevated user behind a sudo/pkexec invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

#[derive(Debug, Clone)]
struct PasswdEntry {
    name: String,
    uid: u32,
    gid: u32,
    home: PathBuf,
}

fn parse_passwd(passwd: &str) -> Vec<PasswdEntry> {
    passwd
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() < 6 || parts[0].starts_with('#') {
                return None;
            }
            Some(PasswdEntry {
                name: parts[0].to_string(),
                uid: parts[2].parse().ok()?,
                gid: parts[3].parse().ok()?,
                home: PathBuf::from(parts[5]),
            })
        })
        .collect()
}

/// Resolve the invoking user from an environment lookup and passwd content
pub fn invoking_user_from<F>(env_var: F, passwd: &str) -> Option<InvokingUser>
where
    F: Fn(&str) -> Option<String>,
{
    let entries = parse_passwd(passwd);

    if let Some(name) = env_var("SUDO_USER").filter(|n| !n.is_empty() && n != "root") {
        let entry = entries.iter().find(|e| e.name == name)?;
        let uid = env_var("SUDO_UID").and_then(|v| v.parse().ok()).unwrap_or(entry.uid);
        let gid = env_var("SUDO_GID").and_then(|v| v.parse().ok()).unwrap_or(entry.gid);
        return Some(InvokingUser {
            name,
            uid,
            gid,
            home: entry.home.clone(),
        });
    }

    if let Some(uid) = env_var("PKEXEC_UID").and_then(|v| v.parse::<u32>().ok()) {
        if uid == 0 {
            return None;
        }
        let entry = entries.iter().find(|e| e.uid == uid)?;
        return Some(InvokingUser {
            name: entry.name.clone(),
            uid,
            gid: entry.gid,
            home: entry.home.clone(),
        });
    }

    None
}

/// The user behind the current elevation, if any
pub fn invoking_user() -> Option<InvokingUser> {
    let passwd = match fs::read_to_string(paths::PASSWD) {
        Ok(p) => p,
        Err(e) => {
            debug!("Failed to read {}: {}", paths::PASSWD, e);
            return None;
        }
    };
    invoking_user_from(|key| env::var(key).ok(), &passwd)
}

/// Per-user config directory (`<config>/machid`).
///
/// Prefers the invoking user's `~/.config` while elevated, then
/// `XDG_CONFIG_HOME`, `HOME/.config`, and finally the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    let config_base = invoking_user()
        .map(|u| u.home.join(".config"))
        .or_else(|| {
            if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
                Some(PathBuf::from(xdg))
            } else if let Ok(home) = env::var("HOME") {
                Some(PathBuf::from(home).join(".config"))
            } else {
                dirs::config_dir()
            }
        });

    config_base.map(|p| p.join(paths::USER_CONFIG_DIR_NAME))
}
