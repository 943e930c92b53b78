//! Command-line interface for kgforge.
//!
//! Provides commands for dataset management, lifecycle job dispatch,
//! task inspection, and the background outcome poller.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
