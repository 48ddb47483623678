//! Pipeline stages.
//!
//! Each stage wraps one external tool and takes every path it needs from a
//! [`FrameworkArtifact`](crate::layout::FrameworkArtifact).
//!
//! ## Stages
//!
//! | Stage | Tool | Failure |
//! |-------|------|---------|
//! | [`cmake`] / [`parallel`] | `cmake` | Recorded per platform, run continues |
//! | [`universal`] | `sh make_universal.sh` | Fatal ([`ForgeError::Merge`](crate::ForgeError::Merge)) |
//! | [`symbols`] | `dsymutil` | Logged, framework ships without symbols |
//! | [`metadata`] | `plutil` | Logged, original value kept |
//! | [`xcframework`] | `xcodebuild -create-xcframework` | Fatal ([`ForgeError::Bundle`](crate::ForgeError::Bundle)) |
//!
//! ## Common Utilities
//!
//! The [`common`] module provides the [`ToolRunner`] seam through which every
//! process is launched, plus consistent conversion of failed processes into
//! [`ToolFailure`](crate::ToolFailure) values.
//!
//! ## Example
//!
//! ```ignore
//! use xcforge_sdk::builders::{BuildRequest, build_all, report_results};
//! use xcforge_sdk::SystemRunner;
//!
//! let results = build_all(&SystemRunner, requests);
//! report_results(&results);
//! ```

pub mod cmake;
pub mod common;
pub mod metadata;
pub mod parallel;
pub mod symbols;
pub mod universal;
pub mod xcframework;

pub use cmake::{BuildRequest, BuildResult, BuildStep, run_build};
pub use common::{Invocation, ProcessOutput, SystemRunner, ToolRunner, run_tool};
pub use metadata::patch_minimum_os;
pub use parallel::{build_all, report_results};
pub use symbols::generate_symbols;
pub use universal::unify;
pub use xcframework::{BundleEntry, assemble};
