//! Universal binary merging.
//!
//! When both members of an architecture pair built successfully, the merge
//! script folds the secondary's slice into the primary's binary. The
//! secondary then leaves the surviving set, since its architecture now ships
//! inside the primary framework.
//!
//! The script receives its inputs through the environment:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `TARGET_NAME` | Library name |
//! | `BUILD_FOLDER` | Library build root holding the platform build folders |
//! | `SUB_PATH` | Framework directory relative to a build folder |
//! | `PREFIX` | OS-family prefix of the pair (e.g. `catalyst`) |

use super::common::{Invocation, ToolRunner, run_tool};
use crate::layout::FrameworkArtifact;
use crate::platform::{PlatformSet, Registry, UniversalPair};
use crate::types::{ForgeError, LibraryTarget, RunConfig};

/// Merges every architecture pair whose members are both in `surviving`.
///
/// # Arguments
///
/// * `runner` - Runner used to execute the merge script
/// * `run` - Run configuration (root directory and script location)
/// * `registry` - Source of the pair table
/// * `surviving` - Platforms that built successfully; secondaries of merged
///   pairs are removed from it
/// * `artifacts` - Artifact paths of the surviving platforms; a merged
///   pair's primary must be among them
/// * `library` - Library being merged
///
/// # Returns
///
/// The pairs that were merged, or [`ForgeError::Merge`] on the first failed
/// merge. A failed merge leaves `surviving` untouched for that pair.
pub fn unify<R: ToolRunner + ?Sized>(
    runner: &R,
    run: &RunConfig,
    registry: &Registry,
    surviving: &mut PlatformSet,
    artifacts: &[FrameworkArtifact],
    library: &LibraryTarget,
) -> Result<Vec<UniversalPair>, ForgeError> {
    let mut merged = Vec::new();

    for pair in registry.universal_pairs() {
        if !surviving.contains(pair.primary) || !surviving.contains(pair.secondary) {
            if surviving.contains(pair.primary) || surviving.contains(pair.secondary) {
                log::debug!(
                    "[{} & {}] Only one slice available, skipping merge",
                    pair.primary,
                    pair.secondary
                );
            }
            continue;
        }

        let Some(primary) = artifacts.iter().find(|a| a.platform.id == pair.primary) else {
            return Err(ForgeError::UnknownPlatform(pair.primary.to_string()));
        };

        let invocation = Invocation::new(&run.tools.shell)
            .path_arg(&run.merge_script())
            .env("TARGET_NAME", library.name.as_str())
            .env("BUILD_FOLDER", primary.build_root.display().to_string())
            .env("SUB_PATH", primary.product_sub_path.display().to_string())
            .env("PREFIX", pair.prefix)
            .current_dir(&run.root_dir);

        run_tool(runner, &invocation, "make_universal.sh").map_err(|failure| {
            ForgeError::Merge {
                prefix: pair.prefix.to_string(),
                failure,
            }
        })?;

        surviving.remove(pair.secondary);
        log::info!(
            "[{} & {}] Patched universal {} binary",
            pair.primary,
            pair.secondary,
            pair.prefix
        );
        merged.push(*pair);
    }

    Ok(merged)
}
