//! Framework metadata patching.
//!
//! Some ecosystems enforce a minimum OS version that differs from the
//! deployment target the toolchain stamped into `Info.plist`. For platforms
//! whose descriptor carries a [`MetadataOverride`](crate::platform::MetadataOverride)
//! the field is rewritten with `plutil` after the build.

use super::common::{Invocation, ToolRunner, run_tool};
use crate::layout::FrameworkArtifact;
use crate::types::ToolPaths;

/// Rewrites the platform's minimum OS field in the framework's `Info.plist`.
///
/// Runs `plutil -replace <field> -string <value> <Info.plist>`.
///
/// # Returns
///
/// `true` if the field was patched or the platform needs no patch; `false`
/// if `plutil` failed, in which case the original value is kept and the
/// failure is logged.
pub fn patch_minimum_os<R: ToolRunner + ?Sized>(
    runner: &R,
    tools: &ToolPaths,
    artifact: &FrameworkArtifact,
    value: &str,
) -> bool {
    let Some(metadata) = artifact.platform.metadata_override else {
        return true;
    };

    let invocation = Invocation::new(&tools.plutil)
        .arg("-replace")
        .arg(metadata.field)
        .arg("-string")
        .arg(value)
        .path_arg(&artifact.info_plist);

    match run_tool(runner, &invocation, "plutil") {
        Ok(_) => {
            log::debug!(
                "[{}] Set {} to {}",
                artifact.platform.id,
                metadata.field,
                value
            );
            true
        }
        Err(failure) => {
            log::warn!(
                "[{}] Failed to patch {} in {}, keeping original value\n{}",
                artifact.platform.id,
                metadata.field,
                artifact.info_plist.display(),
                failure
            );
            false
        }
    }
}
