//! Lifecycle management for lecture slide environments.
//!
//! [`environment::EnvironmentManager`] owns one lecture directory: it writes
//! the manifest, installs dependencies, runs the dev server and builds, and
//! records every spawned process in a [`environment::ProcessRegistry`] that
//! several managers may share.

pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod utils;
