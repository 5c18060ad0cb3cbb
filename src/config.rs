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

//! Runtime policy: strict mode and the warning sink
//!
//! A [`Config`] is an explicit object held by each resolver, so resolvers with
//! different policies can live side by side. [`Config::global`] is the shared
//! default used when nothing else is supplied.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

/// Callback receiving one warning line
pub type WarningSink = Arc<dyn Fn(&str) + Send + Sync>;

lazy_static! {
    static ref GLOBAL_CONFIG: Arc<Config> = Arc::new(Config::new());
}

fn stdout_sink() -> WarningSink {
    Arc::new(|msg: &str| println!("{}", msg))
}

fn silent_sink() -> WarningSink {
    Arc::new(|_: &str| {})
}

struct ConfigState {
    strict_mode: bool,
    sink: WarningSink,
}

/// Strict mode flag and warning sink behind one read-write lock
pub struct Config {
    state: RwLock<ConfigState>,
}

/// Copy of the configuration taken at the start of a resolution
#[derive(Clone)]
pub struct ConfigSnapshot {
    pub strict_mode: bool,
    sink: WarningSink,
}

impl ConfigSnapshot {
    /// Send one line to the sink captured in this snapshot
    pub fn warn(&self, msg: &str) {
        (self.sink)(msg);
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("strict_mode", &self.strict_mode)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Strict mode off, warnings printed to stdout
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConfigState {
                strict_mode: false,
                sink: stdout_sink(),
            }),
        }
    }

    /// The process-wide default configuration
    pub fn global() -> Arc<Config> {
        Arc::clone(&GLOBAL_CONFIG)
    }

    /// Enable or disable strict mode.
    ///
    /// With strict mode on, resolution fails instead of falling back to the
    /// persisted tokens when the hardware exposes no identifiers.
    pub fn set_strict_mode(&self, enabled: bool) {
        self.state.write().strict_mode = enabled;
    }

    pub fn is_strict_mode(&self) -> bool {
        self.state.read().strict_mode
    }

    /// Replace the warning sink. `None` silences warnings.
    pub fn set_warning_sink(&self, sink: Option<WarningSink>) {
        self.state.write().sink = sink.unwrap_or_else(silent_sink);
    }

    /// Replace the warning sink with a closure
    pub fn set_logger<F>(&self, logger: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.set_warning_sink(Some(Arc::new(logger)));
    }

    /// Take a consistent copy of the whole configuration
    pub fn snapshot(&self) -> ConfigSnapshot {
        let state = self.state.read();
        ConfigSnapshot {
            strict_mode: state.strict_mode,
            sink: Arc::clone(&state.sink),
        }
    }

    /// Send one line to the current sink
    pub fn warn(&self, msg: &str) {
        self.snapshot().warn(msg);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("strict_mode", &self.is_strict_mode())
            .finish_non_exhaustive()
    }
}
