//! Error types, re-exported from the machid-error crate

pub use machid_error::{MachIdError, Result};
