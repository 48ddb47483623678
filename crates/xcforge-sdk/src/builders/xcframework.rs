//! XCFramework assembly.
//!
//! Packages the surviving per-platform frameworks, with their symbol bundles
//! where available, into a single `<name>.xcframework` using
//! `xcodebuild -create-xcframework`.

use std::fs;
use std::path::{Path, PathBuf};

use super::common::{Invocation, ToolRunner, run_tool};
use crate::platform::PlatformId;
use crate::types::{ForgeError, ToolPaths};

/// One framework slice to package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Platform the slice was built for.
    pub platform: PlatformId,
    /// The `.framework` directory.
    pub framework: PathBuf,
    /// Companion `.dSYM`, if symbol extraction succeeded.
    pub debug_symbols: Option<PathBuf>,
}

/// Builds the `xcodebuild` invocation for `entries`.
pub fn bundle_invocation(tools: &ToolPaths, output: &Path, entries: &[BundleEntry]) -> Invocation {
    let mut inv = Invocation::new(&tools.xcodebuild).arg("-create-xcframework");
    for entry in entries {
        inv = inv.arg("-framework").path_arg(&entry.framework);
        if let Some(dsym) = &entry.debug_symbols {
            inv = inv.arg("-debug-symbols").path_arg(dsym);
        }
    }
    inv.arg("-output").path_arg(output)
}

/// Packages `entries` into the xcframework at `output`.
///
/// This performs the following steps:
/// 1. Reject an empty entry list
/// 2. Remove any bundle left at `output` by an earlier run
/// 3. Run `xcodebuild -create-xcframework` once with every entry
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to the produced bundle
/// * `Err(ForgeError::NothingToBundle)` - `entries` is empty
/// * `Err(ForgeError::Bundle)` - The packaging tool failed
/// * `Err(ForgeError::Io)` - The stale bundle could not be removed
pub fn assemble<R: ToolRunner + ?Sized>(
    runner: &R,
    tools: &ToolPaths,
    output: &Path,
    entries: &[BundleEntry],
    library_name: &str,
) -> Result<PathBuf, ForgeError> {
    if entries.is_empty() {
        return Err(ForgeError::NothingToBundle(library_name.to_string()));
    }

    remove_stale_bundle(output)?;

    let invocation = bundle_invocation(tools, output, entries);
    let result = run_tool(runner, &invocation, "xcodebuild -create-xcframework")
        .map_err(ForgeError::Bundle)?;

    if !result.stdout.trim().is_empty() {
        log::info!("{}", result.stdout.trim_end());
    }
    Ok(output.to_path_buf())
}

fn remove_stale_bundle(output: &Path) -> Result<(), ForgeError> {
    let metadata = match fs::symlink_metadata(output) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(output)?;
    } else {
        fs::remove_file(output)?;
    }
    log::debug!("Removed previous bundle at {}", output.display());
    Ok(())
}
