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

//! Constants and configuration values for machid
//!
//! Centralizes all paths, keywords and sizes. Add new values here first.

use std::time::Duration;

/// System paths
pub mod paths {
    /// DMI/SMBIOS attributes exported by the kernel
    pub const DMI_ID_DIR: &str = "/sys/class/dmi/id";

    /// Hidden directory holding the persisted fallback tokens
    pub const FALLBACK_DIR: &str = "/etc/.machid";

    /// Per-user directory name under the config base (e.g. ~/.config/machid)
    pub const USER_CONFIG_DIR_NAME: &str = "machid";

    /// Identifier cache file name
    pub const CACHE_FILE: &str = "cache.json";

    /// Passwd database used to resolve the invoking user's home directory
    pub const PASSWD: &str = "/etc/passwd";
}

/// DMI attribute file names under [`paths::DMI_ID_DIR`]
pub mod dmi {
    pub const PRODUCT_SERIAL: &str = "product_serial";
    pub const CHASSIS_SERIAL: &str = "chassis_serial";
    pub const BOARD_SERIAL: &str = "board_serial";
    pub const PRODUCT_UUID: &str = "product_uuid";
}

/// `dmidecode -s` keywords
pub mod dmidecode {
    /// Program name looked up on PATH
    pub const PROGRAM: &str = "dmidecode";

    pub const SYSTEM_SERIAL: &str = "system-serial-number";
    pub const CHASSIS_SERIAL: &str = "chassis-serial-number";
    pub const BASEBOARD_SERIAL: &str = "baseboard-serial-number";
    pub const SYSTEM_UUID: &str = "system-uuid";
}

/// Values firmware reports when it has nothing real to say
pub const PLACEHOLDER_VALUES: &[&str] = &["None", "Not Specified", "To Be Filled By O.E.M."];

/// Persisted fallback parameters
pub mod fallback {
    /// Serial substitute file inside the fallback directory
    pub const SERIAL_FILE: &str = ".mserial";

    /// UUID substitute file inside the fallback directory
    pub const UUID_FILE: &str = ".muuid";

    /// Random bytes per token (128 hex characters once encoded)
    pub const TOKEN_BYTES: usize = 64;

    /// Mode of the fallback directory
    pub const DIR_MODE: u32 = 0o700;

    /// Mode of each token file
    pub const FILE_MODE: u32 = 0o600;
}

/// Timing constants
pub mod timing {
    use super::*;

    /// Upper bound on a single dmidecode invocation
    pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

    /// Poll interval while waiting for a child process
    pub const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// How long to wait for a killed child to be reaped
    pub const PROCESS_REAP_TIMEOUT: Duration = Duration::from_secs(1);
}

/// Size limits
pub mod limits {
    /// Maximum stdout captured from the inventory command
    pub const MAX_COMMAND_OUTPUT: u64 = 64 * 1024;

    /// Maximum cache document size accepted on load (1MB)
    pub const MAX_CACHE_SIZE: u64 = 1024 * 1024;
}

/// Degraded-mode warnings emitted through the warning sink
pub mod warnings {
    pub const BIOS_MISSING: &str = "WARNING: machid - BIOS is not providing the system variables (serial/UUID) needed to generate hardware-based machine IDs.";
    pub const FALLING_BACK: &str = "WARNING: machid - Falling back to filesystem-based machine IDs stored in ";
    pub const NOT_HARDWARE_BOUND: &str = "WARNING: machid - These IDs will persist across reboots but are NOT tied to hardware.";
    pub const CACHE_SAVE_FAILED: &str = "WARNING: machid - Failed to save ID cache: ";
}
