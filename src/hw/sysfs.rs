//! DMI sysfs reader

use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::normalize_attribute;
use crate::constants::paths;

/// A fast, side-effect free source of hardware attributes.
///
/// Absence (missing file, unreadable file, placeholder content) is an empty
/// string, never an error.
#[cfg_attr(test, mockall::automock)]
pub trait FastPathSource: Send + Sync {
    fn read_attribute(&self, locator: &str) -> String;
}

/// Reads attribute files from a DMI id directory
#[derive(Debug, Clone)]
pub struct SysfsReader {
    root: PathBuf,
}

impl SysfsReader {
    /// Reader over `/sys/class/dmi/id`
    pub fn new() -> Self {
        Self::with_root(paths::DMI_ID_DIR)
    }

    /// Reader over another directory laid out like `/sys/class/dmi/id`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for SysfsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FastPathSource for SysfsReader {
    fn read_attribute(&self, locator: &str) -> String {
        // Locators are bare attribute names; anything path-like is refused
        if locator.is_empty() || locator.contains("..") || locator.contains('/') || locator.contains('\0') {
            return String::new();
        }
        let path = self.root.join(locator);
        match fs::read_to_string(&path) {
            Ok(content) => normalize_attribute(&content),
            Err(e) => {
                trace!("sysfs attribute {:?} unavailable: {}", path, e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dmi_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_reads_trimmed_value() {
        let dir = dmi_dir(&[("product_serial", "  SN-12345\n")]);
        let reader = SysfsReader::with_root(dir.path());
        assert_eq!(reader.read_attribute("product_serial"), "SN-12345");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = dmi_dir(&[]);
        let reader = SysfsReader::with_root(dir.path());
        assert_eq!(reader.read_attribute("product_serial"), "");
        assert_eq!(SysfsReader::with_root("/nonexistent/path").read_attribute("product_uuid"), "");
    }

    #[test]
    fn test_placeholder_is_empty() {
        let dir = dmi_dir(&[
            ("product_serial", "Not Specified\n"),
            ("chassis_serial", "To Be Filled By O.E.M."),
            ("board_serial", "None"),
        ]);
        let reader = SysfsReader::with_root(dir.path());
        assert_eq!(reader.read_attribute("product_serial"), "");
        assert_eq!(reader.read_attribute("chassis_serial"), "");
        assert_eq!(reader.read_attribute("board_serial"), "");
    }

    #[test]
    fn test_path_like_locators_rejected() {
        let dir = dmi_dir(&[("product_uuid", "abc")]);
        let nested = dir.path().join("sub");
        fs::create_dir(&nested).unwrap();
        let reader = SysfsReader::with_root(&nested);
        assert_eq!(reader.read_attribute("../product_uuid"), "");
        assert_eq!(reader.read_attribute("a/b"), "");
        assert_eq!(reader.read_attribute(""), "");
    }

    #[test]
    fn test_default_root() {
        assert_eq!(SysfsReader::new().root(), Path::new("/sys/class/dmi/id"));
    }
}
