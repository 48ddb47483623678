//! Debug symbol extraction.

use std::path::PathBuf;

use super::common::{Invocation, ToolRunner, run_tool};
use crate::layout::FrameworkArtifact;
use crate::types::{ToolFailure, ToolPaths};

/// Extracts debug symbols for one framework with `dsymutil`.
///
/// Runs `dsymutil <binary> -o <framework>.dSYM` and returns the symbol bundle
/// path on success. A failure is returned as a [`ToolFailure`]; callers treat
/// it as non-fatal and ship the framework without symbols.
pub fn generate_symbols<R: ToolRunner + ?Sized>(
    runner: &R,
    tools: &ToolPaths,
    artifact: &FrameworkArtifact,
) -> Result<PathBuf, ToolFailure> {
    let invocation = Invocation::new(&tools.dsymutil)
        .path_arg(&artifact.binary)
        .arg("-o")
        .path_arg(&artifact.dsym);

    run_tool(runner, &invocation, "dsymutil")?;
    log::debug!(
        "[{}] Generated symbols at {}",
        artifact.platform.id,
        artifact.dsym.display()
    );
    Ok(artifact.dsym.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::testing::ScriptedRunner;
    use crate::layout::{GeneratorLayout, OutputLayout};
    use crate::platform::{PlatformId, Registry};
    use crate::types::LibraryTarget;

    fn artifact(id: PlatformId) -> FrameworkArtifact {
        let registry = Registry::standard();
        let library = LibraryTarget::new("quicr", "libquicr", "com.cisco.quicr.quicr");
        OutputLayout::new("/deps", GeneratorLayout::default())
            .artifact(registry.get(id).unwrap(), &library)
    }

    #[test]
    fn test_dsymutil_arguments() {
        let runner = ScriptedRunner::new();
        let artifact = artifact(PlatformId::CatalystArm);

        let dsym = generate_symbols(&runner, &ToolPaths::default(), &artifact).unwrap();

        assert_eq!(
            dsym,
            PathBuf::from("/deps/build/quicr/build-catalyst/src/quicr.framework.dSYM")
        );
        let calls = runner.calls_to("dsymutil");
        assert_eq!(
            calls[0].args,
            vec![
                "/deps/build/quicr/build-catalyst/src/quicr.framework/Versions/A/quicr",
                "-o",
                "/deps/build/quicr/build-catalyst/src/quicr.framework.dSYM"
            ]
        );
    }

    #[test]
    fn test_failure_carries_streams() {
        let runner = ScriptedRunner::new().fail_when(|_| true, 1);

        let failure = generate_symbols(&runner, &ToolPaths::default(), &artifact(PlatformId::Ios))
            .unwrap_err();

        assert_eq!(failure.tool, "dsymutil");
        assert_eq!(failure.status, 1);
        assert_eq!(failure.stdout, "dsymutil stdout");
        assert_eq!(failure.stderr, "dsymutil scripted failure");
    }
}
