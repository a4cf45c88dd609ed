//! Command implementations for the cssbundle CLI
//!
//! Each command module handles the CLI interface and delegates to
//! cssbundle-core for the actual build.

pub mod build;
