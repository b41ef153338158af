//! # Common Components
//!
//! Shared utilities used by the library and the command-line front end.
//!
//! ## Modules
//!
//! - [`error`]: Error taxonomy for every client operation
//! - [`config`]: TOML configuration parsing
//! - [`logging`]: Logger initialisation for binaries

pub mod config;
pub mod error;
pub mod logging;

pub use error::{ClientError, Result};
