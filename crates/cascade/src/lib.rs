//! cascade command line interface.
//!
//! The binary is a thin driver over [`cascade_release`]:
//!
//! - `cascade status` - show the release pending change files would produce
//! - `cascade change add` - record a change file for a package
//! - `cascade version ensure` - align project versions with their policies
//! - `cascade version bump` - bump lockstep policies and apply change files
//! - `cascade publish` - apply changes, render changelogs and publish

pub mod cli;
pub mod commands;
pub mod tracing;

pub use cli::{Cli, CliError};
pub use commands::{Command, ReleaseContext, execute};
