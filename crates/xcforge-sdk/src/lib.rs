//! Multi-platform xcframework build SDK
//!
//! `xcforge-sdk` drives an external CMake toolchain to compile one or more
//! native libraries for several Apple platforms at once, folds architecture
//! pairs into universal binaries, extracts debug symbols, patches bundle
//! metadata and finally packages everything into one `.xcframework` per library.
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Platform registry** ([`platform`]): immutable table of supported platforms
//!   and the architecture pairs that get merged
//! - **Layout** ([`layout`]): the single place where artifact paths are computed
//! - **Builders** ([`builders`]): one module per pipeline stage, each driving one
//!   external tool through the [`ToolRunner`] seam
//! - **Pipeline** ([`pipeline`]): the per-library state machine and the
//!   multi-library [`Forge`] driver
//! - **Summary** ([`summary`]): serialisable record of a whole run
//!
//! # Example
//!
//! ```ignore
//! use xcforge_sdk::{Forge, LibraryTarget, PlatformSet, Registry, RunConfig, SystemRunner};
//!
//! let run = RunConfig::new("/path/to/dependencies", "/opt/homebrew/bin/cmake");
//! let registry = Registry::standard();
//! let platforms = PlatformSet::all(&registry);
//! let library = LibraryTarget::new("neo_media_client", "new-qmedia", "com.cisco.quicr.qmedia");
//!
//! let summary = Forge::new(&SystemRunner, &registry, &run).run(&[library], &platforms)?;
//! println!("{} failed builds", summary.failed_builds());
//! # Ok::<(), xcforge_sdk::ForgeError>(())
//! ```

pub mod builders;
pub mod layout;
pub mod pipeline;
pub mod platform;
pub mod summary;
pub mod types;

pub use builders::common::{Invocation, ProcessOutput, SystemRunner, ToolRunner};
pub use layout::{FrameworkArtifact, GeneratorLayout, OutputLayout};
pub use pipeline::{BuildOutcome, Forge, Pipeline, PipelineReport, PipelineStage};
pub use platform::{PlatformDescriptor, PlatformId, PlatformSet, Registry, Selection, UniversalPair};
pub use summary::RunSummary;
pub use types::{CryptoBackend, ForgeError, LibraryTarget, RunConfig, ToolFailure, ToolPaths};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
