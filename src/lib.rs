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

//! machid - Machine identifiers for Linux
//!
//! Derives two kinds of machine identifiers:
//!
//! - **eMachID**: ephemeral, unique per call, salted with the current time
//! - **reMachID**: reconstructable from the firmware serial number and UUID
//!
//! # Module Structure
//!
//! - `hw/` - DMI sysfs reader, dmidecode runner, tiered resolver
//! - `fallback` - persisted substitute tokens under `/etc/.machid`
//! - `machid` - ID generation
//! - `cache` - per-user cache of generated IDs
//!
//! # Example
//!
//! ```no_run
//! use machid::{IdentifierCache, MachId};
//!
//! let generator = MachId::new();
//! let id = generator.reconstructable("app-secret").unwrap();
//!
//! // Later, without root
//! let cache = IdentifierCache::for_invoking_user();
//! let cached = cache.get_or_create_reconstructable(&generator, "app-secret").unwrap();
//! assert_eq!(cached.id, id);
//! ```

// Grouped modules
pub mod hw;

// Standalone modules
pub mod cache;
pub mod config;
pub mod constants;
pub mod digest;
pub mod error;
pub mod fallback;
pub mod machid;
pub mod privilege;

pub use cache::{CacheEntry, CachedId, IdentifierCache};
pub use config::{Config, ConfigSnapshot, WarningSink};
pub use digest::{digest, digest_bytes, DIGEST_HEX_LEN};
pub use error::{MachIdError, Result};
pub use fallback::{FallbackStore, FallbackTokens};
pub use hw::{
    Dmidecode, FastPathSource, InventoryCommand, LogicalField, Resolution, Resolver,
    SourceAttempt, SysfsReader,
};
pub use machid::{MachId, MachIdBuilder, MachIdInfo, ReconstructableId};
pub use privilege::{is_elevated, invoking_user, EffectiveUid, InvokingUser, PrivilegeCheck};

/// Toggle strict mode on the global configuration
pub fn set_strict_mode(enabled: bool) {
    Config::global().set_strict_mode(enabled);
}

/// Replace the global warning sink with a closure
pub fn set_logger<F>(logger: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Config::global().set_logger(logger);
}
