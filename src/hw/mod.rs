//! Hardware identifier sources
//!
//! Two channels feed the resolver:
//! - **sysfs** (fast path): `/sys/class/dmi/id/*` attribute files
//! - **dmidecode** (command channel): `dmidecode -s <keyword>`
//!
//! Both channels trim their output and drop firmware placeholders, so "value
//! absent" always looks like an empty string.

mod dmidecode;
mod resolver;
mod sysfs;

pub use dmidecode::{Dmidecode, InventoryCommand};
pub use resolver::{LogicalField, Resolution, Resolver, SourceAttempt, SERIAL_PLAN, UUID_PLAN};
pub use sysfs::{FastPathSource, SysfsReader};

#[cfg(test)]
pub use dmidecode::MockInventoryCommand;
#[cfg(test)]
pub use sysfs::MockFastPathSource;

use crate::constants::PLACEHOLDER_VALUES;

/// Trim raw source output and map placeholders to the empty string
pub fn normalize_attribute(raw: &str) -> String {
    let content = raw.trim();
    if content.is_empty() || PLACEHOLDER_VALUES.contains(&content) {
        return String::new();
    }
    content.to_string()
}
