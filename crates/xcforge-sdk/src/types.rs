//! Core types for xcforge-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`ForgeError`] - Fatal error conditions that stop a run
//! - [`ToolFailure`] - Captured diagnostics of a failed external tool
//! - [`CryptoBackend`] - TLS backend selection forwarded to the toolchain
//! - [`RunConfig`] / [`ToolPaths`] - Immutable per-run configuration
//! - [`LibraryTarget`] - One library built by the pipeline

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::layout::GeneratorLayout;

/// Error types for xcforge-sdk operations.
///
/// Every variant is fatal for the run. Stages whose failures are only
/// reported (builds, symbol extraction, metadata patching) surface a
/// [`ToolFailure`] instead, which deliberately has no `From` conversion into
/// this type.
///
/// # Example
///
/// ```ignore
/// match forge.run(&libraries, &platforms) {
///     Ok(summary) => println!("{} bundles", summary.libraries.len()),
///     Err(ForgeError::Merge { prefix, failure }) => {
///         eprintln!("could not merge {}: {}", prefix, failure.stderr);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Invalid or missing configuration, detected before any process is launched.
    #[error("configuration error: {0}. Check xcforge.toml or CLI flags")]
    Config(String),

    /// A platform identifier that the registry does not know.
    #[error(
        "unknown platform '{0}'. Supported platforms: CATALYST_ARM, CATALYST_X86, IOS, IOS_SIMULATOR"
    )]
    UnknownPlatform(String),

    /// An I/O error occurred.
    ///
    /// Common causes include permission issues while creating build
    /// directories or removing a stale bundle.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// JSON serialization of the run summary failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The merge script failed to fold an architecture pair into one binary.
    ///
    /// The secondary slice was not merged, so the primary binary is
    /// incomplete and must not be shipped.
    #[error("universal merge for '{prefix}' failed.\n\n{failure}")]
    Merge {
        /// Prefix of the architecture pair (e.g. `catalyst`).
        prefix: String,
        /// Diagnostics captured from the merge script.
        failure: ToolFailure,
    },

    /// The packaging tool failed to produce the xcframework.
    #[error("xcframework creation failed.\n\n{0}")]
    Bundle(ToolFailure),

    /// Every requested build failed, so there is nothing to package.
    #[error(
        "no platforms left to bundle for '{0}'.\n\nEvery requested build failed; the captured stderr of each build is in the log above."
    )]
    NothingToBundle(String),
}

/// Captured diagnostics of an external tool that failed.
///
/// `status` is `-1` when the tool could not be spawned at all; the OS error is
/// then carried in `stderr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Human-readable tool description (e.g. `dsymutil`).
    pub tool: String,
    /// Exit status, or `-1` if the process never ran.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error, unmodified.
    pub stderr: String,
}

impl ToolFailure {
    /// Builds a failure for a tool that could not be started.
    pub fn spawn(tool: impl Into<String>, err: &std::io::Error) -> Self {
        Self {
            tool: tool.into(),
            status: -1,
            stdout: String::new(),
            stderr: format!(
                "Failed to start: {}\nEnsure the tool is installed and available on PATH.",
                err
            ),
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed.\n\nExit status: {}\n\nStdout:\n{}\n\nStderr:\n{}",
            self.tool, self.status, self.stdout, self.stderr
        )
    }
}

/// TLS backend the libraries are configured against.
///
/// Selected once per run and forwarded to every configure step as a single
/// toolchain flag.
///
/// # Example
///
/// ```
/// use xcforge_sdk::CryptoBackend;
///
/// let backend: CryptoBackend = "mbedtls".parse().unwrap();
/// assert_eq!(backend.toolchain_flag(), "-DUSE_MBEDTLS=ON");
/// assert_eq!(CryptoBackend::OpenSsl.as_str(), "openssl");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoBackend {
    /// OpenSSL (the default).
    #[default]
    OpenSsl,
    /// Mbed TLS.
    MbedTls,
}

impl CryptoBackend {
    /// Returns the string representation of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoBackend::OpenSsl => "openssl",
            CryptoBackend::MbedTls => "mbedtls",
        }
    }

    /// Returns the configure flag selecting this backend.
    pub fn toolchain_flag(&self) -> &'static str {
        match self {
            CryptoBackend::OpenSsl => "-DUSE_MBEDTLS=OFF",
            CryptoBackend::MbedTls => "-DUSE_MBEDTLS=ON",
        }
    }
}

impl fmt::Display for CryptoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CryptoBackend {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openssl" => Ok(CryptoBackend::OpenSsl),
            "mbedtls" | "mbed-tls" => Ok(CryptoBackend::MbedTls),
            other => Err(ForgeError::Config(format!(
                "unknown crypto backend '{}' (expected 'openssl' or 'mbedtls')",
                other
            ))),
        }
    }
}

/// Locations of the external tools invoked after the build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Shell used to run the merge script.
    pub shell: PathBuf,
    /// Merge script, resolved against the root directory when relative.
    pub merge_script: PathBuf,
    /// Packaging tool (`xcodebuild`).
    pub xcodebuild: PathBuf,
    /// Debug symbol extractor (`dsymutil`).
    pub dsymutil: PathBuf,
    /// Property list patcher (`plutil`).
    pub plutil: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("sh"),
            merge_script: PathBuf::from("make_universal.sh"),
            xcodebuild: PathBuf::from("xcodebuild"),
            dsymutil: PathBuf::from("dsymutil"),
            plutil: PathBuf::from("plutil"),
        }
    }
}

/// Immutable configuration for one run.
///
/// Constructed once before the pipeline starts and shared read-only by every
/// build task. Nothing in the SDK mutates it afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the sources, the toolchain file and all build outputs.
    pub root_dir: PathBuf,
    /// Path to the `cmake` executable.
    pub cmake: PathBuf,
    /// CMake toolchain file for Apple platforms.
    pub toolchain_file: PathBuf,
    /// Value passed as `CMAKE_MODULE_PATH`.
    pub module_path: PathBuf,
    /// Build counter stamped into the produced frameworks.
    pub build_number: u64,
    /// TLS backend selection.
    pub crypto: CryptoBackend,
    /// General deployment target (e.g. `16.0`).
    pub deployment_target: String,
    /// Marketing version stamped into the produced frameworks.
    pub marketing_version: String,
    /// Minimum OS value written by the metadata patcher.
    pub minimum_system_version: String,
    /// Generator selection and its product sub-path rule.
    pub generator: GeneratorLayout,
    /// Parallelism requested from each compile step.
    pub jobs: usize,
    /// Post-build tool locations.
    pub tools: ToolPaths,
}

impl RunConfig {
    /// Creates a configuration with the default settings for `root_dir`.
    ///
    /// # Arguments
    ///
    /// * `root_dir` - Directory containing sources, toolchain file and outputs
    /// * `cmake` - Path to the `cmake` executable
    pub fn new(root_dir: impl Into<PathBuf>, cmake: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            toolchain_file: root_dir.join("ios.toolchain.cmake"),
            module_path: root_dir.clone(),
            root_dir,
            cmake: cmake.into(),
            build_number: 1234,
            crypto: CryptoBackend::default(),
            deployment_target: "16.0".to_string(),
            marketing_version: "1.0".to_string(),
            minimum_system_version: "13.0".to_string(),
            generator: GeneratorLayout::default(),
            jobs: host_parallelism(),
            tools: ToolPaths::default(),
        }
    }

    /// Resolves the merge script against the root directory.
    pub fn merge_script(&self) -> PathBuf {
        self.root_dir.join(&self.tools.merge_script)
    }
}

/// Number of compute units available on the host.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// A library built and packaged by the pipeline.
///
/// # Example
///
/// ```
/// use xcforge_sdk::LibraryTarget;
///
/// let lib = LibraryTarget::new("neo_media_client", "new-qmedia", "com.cisco.quicr.qmedia")
///     .sub_path("src/extern");
/// assert_eq!(lib.compile_target, "neo_media_client");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTarget {
    /// Framework name (also the produced `<name>.xcframework`).
    pub name: String,
    /// Source directory, relative to the root directory.
    pub source_dir: PathBuf,
    /// Build-system target to compile.
    pub compile_target: String,
    /// Bundle identifier stamped into each framework.
    pub bundle_identifier: String,
    /// Sub-path from a platform build directory to the produced framework.
    pub sub_path: PathBuf,
}

impl LibraryTarget {
    /// Creates a library target whose compile target matches its name.
    pub fn new(
        name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        bundle_identifier: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            compile_target: name.clone(),
            name,
            source_dir: source_dir.into(),
            bundle_identifier: bundle_identifier.into(),
            sub_path: PathBuf::from("src"),
        }
    }

    /// Overrides the compile target.
    pub fn compile_target(mut self, target: impl Into<String>) -> Self {
        self.compile_target = target.into();
        self
    }

    /// Overrides the framework sub-path.
    pub fn sub_path(mut self, sub_path: impl Into<PathBuf>) -> Self {
        self.sub_path = sub_path.into();
        self
    }
}
