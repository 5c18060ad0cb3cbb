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

//! Machine ID generation
//!
//! Two kinds of identifiers:
//! - **eMachID** (ephemeral): digest of the current time and a salt. Unique per
//!   call, needs no privilege.
//! - **reMachID** (reconstructable): digest of the hardware serial and UUID
//!   (plus optional salt). Stable across calls, reboots and reinstalls as long
//!   as the firmware reports the same values. Needs root.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::config::Config;
use crate::digest::{digest, digest_bytes};
use crate::error::{MachIdError, Result};
use crate::fallback::FallbackStore;
use crate::hw::{Dmidecode, FastPathSource, InventoryCommand, Resolver, SysfsReader};
use crate::privilege::{require_privilege, EffectiveUid, PrivilegeCheck};

/// Last timestamp handed to an ephemeral digest, kept strictly increasing
static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

/// A reconstructable ID and whether it came from the fallback tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructableId {
    pub id: String,
    pub used_fallback: bool,
}

/// Both identifiers from a single call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachIdInfo {
    pub emachid: String,
    pub remachid: String,
    pub used_fallback: bool,
}

/// Identifier generator
pub struct MachId {
    config: Arc<Config>,
    privilege: Box<dyn PrivilegeCheck>,
    resolver: Resolver,
}

impl MachId {
    /// Generator over the real system with the global config
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MachIdBuilder {
        MachIdBuilder::default()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Generate an eMachID. Two calls never return the same value.
    pub fn ephemeral(&self, salt: &str) -> Result<String> {
        if salt.is_empty() {
            return Err(MachIdError::EmptySalt);
        }
        let mut parts = vec![unique_nanos().to_string(), salt.to_string()];
        Ok(digest(&mut parts))
    }

    /// Generate a reMachID. An empty salt hashes serial and UUID only.
    pub fn reconstructable(&self, salt: &str) -> Result<String> {
        Ok(self.reconstructable_with_info(salt)?.id)
    }

    pub fn reconstructable_with_info(&self, salt: &str) -> Result<ReconstructableId> {
        require_privilege(&*self.privilege)?;

        // Serial and UUID are hashed in place from their zeroizing buffers
        let resolution = self.resolver.resolve()?;
        let mut parts: Vec<&[u8]> = vec![resolution.serial.as_bytes(), resolution.uuid.as_bytes()];
        if !salt.is_empty() {
            parts.push(salt.as_bytes());
        }
        let id = digest_bytes(&parts);

        debug!(used_fallback = resolution.used_fallback, "Generated reconstructable ID");
        Ok(ReconstructableId {
            id,
            used_fallback: resolution.used_fallback,
        })
    }

    /// Generate both IDs with the same salt
    pub fn generate_both(&self, salt: &str) -> Result<MachIdInfo> {
        let emachid = self.ephemeral(salt)?;
        let re = self.reconstructable_with_info(salt)?;
        Ok(MachIdInfo {
            emachid,
            remachid: re.id,
            used_fallback: re.used_fallback,
        })
    }

    /// Remove the fallback tokens so the next fallback resolution creates new
    /// ones. No-op for a generator without a fallback store.
    pub fn clear_fallback_tokens(&self) -> Result<()> {
        require_privilege(&*self.privilege)?;
        match self.resolver.fallback() {
            Some(store) => store.clear_tokens(),
            None => Ok(()),
        }
    }

    /// Whether both fallback token files exist
    pub fn has_fallback_tokens(&self) -> bool {
        self.resolver
            .fallback()
            .map(FallbackStore::tokens_exist)
            .unwrap_or(false)
    }
}

impl Default for MachId {
    fn default() -> Self {
        Self::new()
    }
}

fn unique_nanos() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let prev = LAST_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    now.max(prev + 1)
}

/// Builder for [`MachId`]; every unset part uses the system default
#[derive(Default)]
pub struct MachIdBuilder {
    config: Option<Arc<Config>>,
    privilege: Option<Box<dyn PrivilegeCheck>>,
    fast_path: Option<Box<dyn FastPathSource>>,
    inventory: Option<Box<dyn InventoryCommand>>,
    fallback_dir: Option<PathBuf>,
    no_fallback: bool,
}

impl MachIdBuilder {
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn privilege_check(mut self, check: impl PrivilegeCheck + 'static) -> Self {
        self.privilege = Some(Box::new(check));
        self
    }

    pub fn fast_path(mut self, source: impl FastPathSource + 'static) -> Self {
        self.fast_path = Some(Box::new(source));
        self
    }

    pub fn inventory(mut self, command: impl InventoryCommand + 'static) -> Self {
        self.inventory = Some(Box::new(command));
        self
    }

    pub fn fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// Fail with `NoHardwareIdentifiers` instead of using fallback tokens
    pub fn without_fallback(mut self) -> Self {
        self.no_fallback = true;
        self
    }

    pub fn build(self) -> MachId {
        let config = self.config.unwrap_or_else(Config::global);
        let fallback = if self.no_fallback {
            None
        } else {
            Some(
                self.fallback_dir
                    .map(FallbackStore::with_dir)
                    .unwrap_or_default(),
            )
        };
        let resolver = Resolver::with_sources(
            Arc::clone(&config),
            self.fast_path
                .unwrap_or_else(|| Box::new(SysfsReader::new())),
            self.inventory
                .unwrap_or_else(|| Box::new(Dmidecode::new())),
            fallback,
        );
        MachId {
            config,
            privilege: self.privilege.unwrap_or_else(|| Box::new(EffectiveUid)),
            resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DIGEST_HEX_LEN;
    use crate::hw::{MockFastPathSource, MockInventoryCommand};
    use crate::privilege::MockPrivilegeCheck;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn privileged(yes: bool) -> MockPrivilegeCheck {
        let mut check = MockPrivilegeCheck::new();
        check.expect_is_privileged().return_const(yes);
        check
    }

    fn fast_path(serial: &'static str, uuid: &'static str) -> MockFastPathSource {
        let mut mock = MockFastPathSource::new();
        mock.expect_read_attribute().returning(move |loc| match loc {
            "product_serial" => serial.to_string(),
            "product_uuid" => uuid.to_string(),
            _ => String::new(),
        });
        mock
    }

    fn empty_inventory() -> MockInventoryCommand {
        let mut mock = MockInventoryCommand::new();
        mock.expect_query().returning(|_| Ok(String::new()));
        mock
    }

    fn generator(tmp: &TempDir, serial: &'static str, uuid: &'static str, root: bool) -> MachId {
        let config = Arc::new(Config::new());
        config.set_warning_sink(None);
        MachId::builder()
            .config(config)
            .privilege_check(privileged(root))
            .fast_path(fast_path(serial, uuid))
            .inventory(empty_inventory())
            .fallback_dir(tmp.path().join(".machid"))
            .build()
    }

    #[test]
    fn test_ephemeral_unique_and_sized() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", false);
        let ids: HashSet<String> = (0..100).map(|_| m.ephemeral("salt").unwrap()).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.len() == DIGEST_HEX_LEN));
    }

    #[test]
    fn test_ephemeral_rejects_empty_salt() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", true);
        assert!(matches!(m.ephemeral(""), Err(MachIdError::EmptySalt)));
    }

    #[test]
    fn test_reconstructable_deterministic() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", true);
        let a = m.reconstructable("app").unwrap();
        let b = m.reconstructable("app").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_reconstructable_matches_digest_of_inputs() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", true);
        let mut salted = vec!["SN".to_string(), "UUID".to_string(), "app".to_string()];
        let mut bare = vec!["SN".to_string(), "UUID".to_string()];
        assert_eq!(m.reconstructable("app").unwrap(), digest(&mut salted));
        assert_eq!(m.reconstructable("").unwrap(), digest(&mut bare));
    }

    #[test]
    fn test_salt_changes_id() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", true);
        assert_ne!(m.reconstructable("a").unwrap(), m.reconstructable("b").unwrap());
        assert_ne!(m.reconstructable("").unwrap(), m.reconstructable("a").unwrap());
    }

    #[test]
    fn test_hardware_changes_id() {
        let tmp = TempDir::new().unwrap();
        let a = generator(&tmp, "SN-1", "UUID", true).reconstructable("x").unwrap();
        let b = generator(&tmp, "SN-2", "UUID", true).reconstructable("x").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reconstructable_requires_privilege() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", false);
        assert!(matches!(m.reconstructable("x"), Err(MachIdError::NotPrivileged)));
        assert!(matches!(m.generate_both("x"), Err(MachIdError::NotPrivileged)));
        assert!(matches!(m.clear_fallback_tokens(), Err(MachIdError::NotPrivileged)));
    }

    #[test]
    fn test_fallback_reported_in_info() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "", "", true);
        let info = m.reconstructable_with_info("x").unwrap();
        assert!(info.used_fallback);
        assert!(m.has_fallback_tokens());
        assert_eq!(m.reconstructable("x").unwrap(), info.id);

        m.clear_fallback_tokens().unwrap();
        assert!(!m.has_fallback_tokens());
        assert_ne!(m.reconstructable("x").unwrap(), info.id);
    }

    #[test]
    fn test_generate_both() {
        let tmp = TempDir::new().unwrap();
        let m = generator(&tmp, "SN", "UUID", true);
        let info = m.generate_both("app").unwrap();
        assert_eq!(info.emachid.len(), DIGEST_HEX_LEN);
        assert_eq!(info.remachid, m.reconstructable("app").unwrap());
        assert_ne!(info.emachid, info.remachid);
        assert!(!info.used_fallback);
    }

    #[test]
    fn test_without_fallback() {
        let config = Arc::new(Config::new());
        let m = MachId::builder()
            .config(config)
            .privilege_check(privileged(true))
            .fast_path(fast_path("", ""))
            .inventory(empty_inventory())
            .without_fallback()
            .build();
        assert!(matches!(m.reconstructable("x"), Err(MachIdError::NoHardwareIdentifiers)));
        assert!(!m.has_fallback_tokens());
        m.clear_fallback_tokens().unwrap();
    }

    #[test]
    fn test_unique_nanos_strictly_increasing() {
        let a = unique_nanos();
        let b = unique_nanos();
        assert!(b > a);
    }
}
