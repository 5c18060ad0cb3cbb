//! Tiered hardware identifier resolution
//!
//! Each logical field has an ordered plan of source attempts. Sysfs entries come
//! first, dmidecode keywords after them; the first non-empty value wins. When
//! both fields come back empty the resolver either fails (strict mode, or no
//! fallback attached) or hands out the persisted fallback tokens.
//!
//! A new tier is added by appending to [`SERIAL_PLAN`] or [`UUID_PLAN`].

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{Dmidecode, FastPathSource, InventoryCommand, SysfsReader};
use crate::config::{Config, ConfigSnapshot};
use crate::constants::{dmi, dmidecode, warnings};
use crate::error::{MachIdError, Result};
use crate::fallback::FallbackStore;

/// Identifier the resolver looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalField {
    Serial,
    Uuid,
}

impl LogicalField {
    /// Ordered source attempts for this field
    pub fn plan(self) -> &'static [SourceAttempt] {
        match self {
            Self::Serial => SERIAL_PLAN,
            Self::Uuid => UUID_PLAN,
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Uuid => write!(f, "uuid"),
        }
    }
}

/// One place a value may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAttempt {
    /// Attribute file name under the DMI sysfs directory
    FastPath(&'static str),
    /// `dmidecode -s` keyword
    Command(&'static str),
}

pub const SERIAL_PLAN: &[SourceAttempt] = &[
    SourceAttempt::FastPath(dmi::PRODUCT_SERIAL),
    SourceAttempt::FastPath(dmi::CHASSIS_SERIAL),
    SourceAttempt::FastPath(dmi::BOARD_SERIAL),
    SourceAttempt::Command(dmidecode::SYSTEM_SERIAL),
    SourceAttempt::Command(dmidecode::CHASSIS_SERIAL),
    SourceAttempt::Command(dmidecode::BASEBOARD_SERIAL),
];

pub const UUID_PLAN: &[SourceAttempt] = &[
    SourceAttempt::FastPath(dmi::PRODUCT_UUID),
    SourceAttempt::Command(dmidecode::SYSTEM_UUID),
];

/// Outcome of a successful resolution.
///
/// With `used_fallback` set, both values are fallback tokens.
pub struct Resolution {
    pub serial: Zeroizing<String>,
    pub uuid: Zeroizing<String>,
    pub used_fallback: bool,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("has_serial", &!self.serial.is_empty())
            .field("has_uuid", &!self.uuid.is_empty())
            .field("used_fallback", &self.used_fallback)
            .finish()
    }
}

/// Tiered fallback engine over the sysfs and dmidecode channels
pub struct Resolver {
    config: Arc<Config>,
    fast_path: Box<dyn FastPathSource>,
    inventory: Box<dyn InventoryCommand>,
    fallback: Option<FallbackStore>,
}

/// Per-call bookkeeping for the command channel
#[derive(Default)]
struct ChannelState {
    tool_missing: bool,
}

impl Resolver {
    /// System sources, `/etc/.machid` fallback, the global config
    pub fn new() -> Self {
        Self::with_sources(
            Config::global(),
            Box::new(SysfsReader::new()),
            Box::new(Dmidecode::new()),
            Some(FallbackStore::new()),
        )
    }

    pub fn with_sources(
        config: Arc<Config>,
        fast_path: Box<dyn FastPathSource>,
        inventory: Box<dyn InventoryCommand>,
        fallback: Option<FallbackStore>,
    ) -> Self {
        Self {
            config,
            fast_path,
            inventory,
            fallback,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn fallback(&self) -> Option<&FallbackStore> {
        self.fallback.as_ref()
    }

    /// Resolve serial and UUID.
    ///
    /// A partial result (one field empty) is returned as-is. Only when both
    /// fields are empty does strict mode or the fallback tier come into play.
    pub fn resolve(&self) -> Result<Resolution> {
        let snapshot = self.config.snapshot();
        let mut channel = ChannelState::default();

        let serial = self.resolve_field(LogicalField::Serial, &mut channel);
        let uuid = self.resolve_field(LogicalField::Uuid, &mut channel);

        if !serial.is_empty() || !uuid.is_empty() {
            debug!(
                has_serial = !serial.is_empty(),
                has_uuid = !uuid.is_empty(),
                "Resolved hardware identifiers"
            );
            return Ok(Resolution {
                serial,
                uuid,
                used_fallback: false,
            });
        }

        self.escalate(&snapshot, &channel)
    }

    fn resolve_field(&self, field: LogicalField, channel: &mut ChannelState) -> Zeroizing<String> {
        for attempt in field.plan() {
            let value = match *attempt {
                SourceAttempt::FastPath(locator) => self.fast_path.read_attribute(locator),
                SourceAttempt::Command(_) if channel.tool_missing => continue,
                SourceAttempt::Command(keyword) => match self.inventory.query(keyword) {
                    Ok(value) => value,
                    Err(MachIdError::InventoryToolMissing) => {
                        debug!(%field, keyword, "inventory command not installed");
                        channel.tool_missing = true;
                        continue;
                    }
                    Err(e) => {
                        debug!(%field, keyword, "inventory command failed: {}", e);
                        continue;
                    }
                },
            };
            if !value.is_empty() {
                debug!(%field, source = ?attempt, "field resolved");
                return Zeroizing::new(value);
            }
        }
        Zeroizing::new(String::new())
    }

    fn escalate(&self, snapshot: &ConfigSnapshot, channel: &ChannelState) -> Result<Resolution> {
        let Some(store) = &self.fallback else {
            if channel.tool_missing {
                return Err(MachIdError::InventoryToolMissing);
            }
            return Err(MachIdError::NoHardwareIdentifiers);
        };

        if snapshot.strict_mode {
            if channel.tool_missing {
                debug!("dmidecode is not installed; strict mode blocks the fallback");
            }
            return Err(MachIdError::StrictModeBlocked);
        }

        if channel.tool_missing {
            warn!("dmidecode is not installed; hardware identifiers may exist but cannot be read");
        }

        snapshot.warn(warnings::BIOS_MISSING);
        snapshot.warn(&format!("{}{}", warnings::FALLING_BACK, store.dir().display()));
        snapshot.warn(warnings::NOT_HARDWARE_BOUND);

        let tokens = store.ensure_tokens()?;
        info!("Using filesystem fallback identifiers from {:?}", store.dir());
        Ok(Resolution {
            serial: tokens.serial,
            uuid: tokens.uuid,
            used_fallback: true,
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{MockFastPathSource, MockInventoryCommand};
    use mockall::predicate::eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn fast_path(values: &[(&'static str, &'static str)]) -> Box<MockFastPathSource> {
        let map: HashMap<&str, &str> = values.iter().copied().collect();
        let mut mock = MockFastPathSource::new();
        mock.expect_read_attribute()
            .returning(move |loc| map.get(loc).map(|v| v.to_string()).unwrap_or_default());
        Box::new(mock)
    }

    fn inventory(values: &[(&'static str, &'static str)]) -> Box<MockInventoryCommand> {
        let map: HashMap<&str, &str> = values.iter().copied().collect();
        let mut mock = MockInventoryCommand::new();
        mock.expect_query()
            .returning(move |kw| Ok(map.get(kw).map(|v| v.to_string()).unwrap_or_default()));
        Box::new(mock)
    }

    fn missing_tool() -> Box<MockInventoryCommand> {
        let mut mock = MockInventoryCommand::new();
        mock.expect_query()
            .returning(|_| Err(MachIdError::InventoryToolMissing));
        Box::new(mock)
    }

    fn capture(config: &Config) -> Arc<Mutex<Vec<String>>> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        config.set_logger(move |m| sink.lock().unwrap().push(m.to_string()));
        lines
    }

    struct Fixture {
        _tmp: TempDir,
        config: Arc<Config>,
        store: FallbackStore,
        warnings: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = FallbackStore::with_dir(tmp.path().join(".machid"));
        let config = Arc::new(Config::new());
        let warnings = capture(&config);
        Fixture {
            _tmp: tmp,
            config,
            store,
            warnings,
        }
    }

    impl Fixture {
        fn resolver(
            &self,
            fast: Box<dyn FastPathSource>,
            inv: Box<dyn InventoryCommand>,
        ) -> Resolver {
            Resolver::with_sources(Arc::clone(&self.config), fast, inv, Some(self.store.clone()))
        }
    }

    #[test]
    fn test_sysfs_primary_wins() {
        let fx = fixture();
        let mut inv = MockInventoryCommand::new();
        inv.expect_query().never();
        let r = fx.resolver(
            fast_path(&[("product_serial", "SN1"), ("chassis_serial", "SN2"), ("product_uuid", "U1")]),
            Box::new(inv),
        );
        let res = r.resolve().unwrap();
        assert_eq!(*res.serial, "SN1");
        assert_eq!(*res.uuid, "U1");
        assert!(!res.used_fallback);
    }

    #[test]
    fn test_serial_aliases_in_order() {
        let fx = fixture();
        let r = fx.resolver(
            fast_path(&[("board_serial", "BOARD"), ("product_uuid", "U1")]),
            inventory(&[]),
        );
        assert_eq!(*r.resolve().unwrap().serial, "BOARD");

        let r = fx.resolver(
            fast_path(&[("chassis_serial", "CHASSIS"), ("board_serial", "BOARD")]),
            inventory(&[]),
        );
        assert_eq!(*r.resolve().unwrap().serial, "CHASSIS");
    }

    #[test]
    fn test_command_channel_after_sysfs() {
        let fx = fixture();
        let mut inv = MockInventoryCommand::new();
        inv.expect_query()
            .with(eq("system-serial-number"))
            .times(1)
            .returning(|_| Ok(String::new()));
        inv.expect_query()
            .with(eq("chassis-serial-number"))
            .times(1)
            .returning(|_| Ok("DMI-CHASSIS".to_string()));
        inv.expect_query()
            .with(eq("system-uuid"))
            .times(1)
            .returning(|_| Ok("DMI-UUID".to_string()));

        let res = fx.resolver(fast_path(&[]), Box::new(inv)).resolve().unwrap();
        assert_eq!(*res.serial, "DMI-CHASSIS");
        assert_eq!(*res.uuid, "DMI-UUID");
        assert!(!res.used_fallback);
    }

    #[test]
    fn test_partial_result_passes_through() {
        let fx = fixture();
        let res = fx
            .resolver(fast_path(&[("product_uuid", "ONLY-UUID")]), inventory(&[]))
            .resolve()
            .unwrap();
        assert_eq!(*res.serial, "");
        assert_eq!(*res.uuid, "ONLY-UUID");
        assert!(!res.used_fallback);
        assert!(!fx.store.tokens_exist());
        assert!(fx.warnings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fallback_used_when_both_empty() {
        let fx = fixture();
        let res = fx.resolver(fast_path(&[]), inventory(&[])).resolve().unwrap();

        assert!(res.used_fallback);
        assert_eq!(res.serial.len(), 128);
        assert_eq!(res.uuid.len(), 128);

        let tokens = fx.store.ensure_tokens().unwrap();
        assert_eq!(*res.serial, *tokens.serial);
        assert_eq!(*res.uuid, *tokens.uuid);

        let warnings = fx.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[1].contains(fx.store.dir().to_str().unwrap()));
    }

    #[test]
    fn test_strict_mode_blocks_fallback() {
        let fx = fixture();
        fx.config.set_strict_mode(true);
        let err = fx.resolver(fast_path(&[]), inventory(&[])).resolve().unwrap_err();
        assert!(matches!(err, MachIdError::StrictModeBlocked));
        assert!(!fx.store.dir().exists());
        assert!(fx.warnings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_strict_mode_irrelevant_with_hardware() {
        let fx = fixture();
        fx.config.set_strict_mode(true);
        let res = fx
            .resolver(fast_path(&[("product_serial", "SN")]), inventory(&[]))
            .resolve()
            .unwrap();
        assert_eq!(*res.serial, "SN");
    }

    #[test]
    fn test_strict_mode_blocks_even_when_tool_missing() {
        let fx = fixture();
        fx.config.set_strict_mode(true);
        let err = fx.resolver(fast_path(&[]), missing_tool()).resolve().unwrap_err();
        assert!(matches!(err, MachIdError::StrictModeBlocked));
        assert!(!fx.store.dir().exists());
        assert!(fx.warnings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_tool_queried_once() {
        let fx = fixture();
        let mut inv = MockInventoryCommand::new();
        inv.expect_query()
            .times(1)
            .returning(|_| Err(MachIdError::InventoryToolMissing));
        let res = fx.resolver(fast_path(&[]), Box::new(inv)).resolve().unwrap();
        assert!(res.used_fallback);
    }

    #[test]
    fn test_missing_tool_ignored_when_sysfs_has_data() {
        let fx = fixture();
        let res = fx
            .resolver(fast_path(&[("product_uuid", "U")]), missing_tool())
            .resolve()
            .unwrap();
        assert_eq!(*res.uuid, "U");
        assert!(!res.used_fallback);
    }

    #[test]
    fn test_hardware_only_resolver() {
        let fx = fixture();
        let r = Resolver::with_sources(Arc::clone(&fx.config), fast_path(&[]), inventory(&[]), None);
        assert!(matches!(r.resolve(), Err(MachIdError::NoHardwareIdentifiers)));

        let r = Resolver::with_sources(Arc::clone(&fx.config), fast_path(&[]), missing_tool(), None);
        assert!(matches!(r.resolve(), Err(MachIdError::InventoryToolMissing)));
    }

    #[test]
    fn test_fallback_is_never_mixed_with_hardware() {
        let fx = fixture();
        // Provision first, then resolve with hardware present
        fx.store.ensure_tokens().unwrap();
        let res = fx
            .resolver(fast_path(&[("product_serial", "HW-SN")]), inventory(&[]))
            .resolve()
            .unwrap();
        assert!(!res.used_fallback);
        assert_eq!(*res.serial, "HW-SN");
        assert_eq!(*res.uuid, "");
    }

    #[test]
    fn test_plans() {
        assert_eq!(LogicalField::Serial.plan().len(), 6);
        assert_eq!(LogicalField::Uuid.plan()[0], SourceAttempt::FastPath("product_uuid"));
        assert_eq!(LogicalField::Uuid.plan()[1], SourceAttempt::Command("system-uuid"));
    }
}
