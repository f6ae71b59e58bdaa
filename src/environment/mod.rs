//! Per-lecture environment lifecycle.
//!
//! Prepares a lecture directory for the presentation tool, installs its
//! dependencies, runs the dev server and builds, and tracks every spawned
//! process so it can be stopped later.
//!
//! ## Module structure
//! - `types` - Status, info, options and result records
//! - `manifest` - package.json loading and tool pinning
//! - `toolchain` - Package manager detection and command construction
//! - `process` - Captured runs and line streaming
//! - `registry` - Process handles and the shared registry
//! - `installer` - Dependency installation
//! - `dev_server` - Dev server start and readiness
//! - `build` - Buffered and streaming builds
//! - `manager` - EnvironmentManager coordinating the above

mod build;
mod dev_server;
mod installer;
mod manager;
mod manifest;
mod process;
mod registry;
mod toolchain;
mod types;

pub use dev_server::ReadinessPolicy;
pub use manager::EnvironmentManager;
pub use manifest::Manifest;
pub use process::{OutputLine, OutputStream};
pub use registry::{ProcessKind, ProcessRegistry, ProcessSnapshot};
pub use toolchain::{CommandSpec, CustomToolchain, PackageManager, Toolchain};
pub use types::{
    BuildResult, DevServerOptions, DevServerResult, EnvironmentInfo, EnvironmentStatus,
    InitResult, InstallMode, InstallResult,
};
