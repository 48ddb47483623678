//! Per-library build pipeline.
//!
//! A [`Pipeline`] takes one library through every stage:
//!
//! ```text
//! Idle → Building → Unifying → Symbolicating → MetadataPatching → Assembling → Done
//!                      │                                              │
//!                      └──────────────────→ Failed ←──────────────────┘
//! ```
//!
//! Builds run concurrently; every later stage runs sequentially on the
//! platforms that survived the build. Only the merge and packaging stages can
//! fail the pipeline. [`Forge`] runs one pipeline per library, back to back,
//! and stops at the first fatal error.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::builders::{
    BuildRequest, BuildStep, BundleEntry, ToolRunner, assemble, build_all, generate_symbols,
    patch_minimum_os, report_results, unify,
};
use crate::layout::{FrameworkArtifact, OutputLayout};
use crate::platform::{PlatformId, PlatformSet, Registry, UniversalPair};
use crate::summary::RunSummary;
use crate::types::{ForgeError, LibraryTarget, RunConfig};

/// Current stage of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Building,
    Unifying,
    Symbolicating,
    MetadataPatching,
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Building => "building",
            PipelineStage::Unifying => "unifying",
            PipelineStage::Symbolicating => "symbolicating",
            PipelineStage::MetadataPatching => "metadata patching",
            PipelineStage::Assembling => "assembling",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one platform build, as recorded in a [`PipelineReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub platform: PlatformId,
    /// Last step that ran.
    pub step: BuildStep,
    /// Exit status of that step (`-1` if it never ran).
    pub status: i32,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.step == BuildStep::Compile && self.status == 0
    }
}

/// What happened to one library during a run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Library name.
    pub library: String,
    /// One outcome per requested platform, in request order.
    pub builds: Vec<BuildOutcome>,
    /// Architecture pairs folded into universal binaries.
    pub merged: Vec<UniversalPair>,
    /// Packaged platforms whose symbol extraction failed.
    pub missing_symbols: Vec<PlatformId>,
    /// Packaged platforms whose metadata patch failed.
    pub unpatched: Vec<PlatformId>,
    /// Platforms packaged into the bundle.
    pub packaged: Vec<PlatformId>,
    /// Path of the produced xcframework.
    pub bundle: PathBuf,
}

impl PipelineReport {
    /// Number of platform builds that failed.
    pub fn failed_builds(&self) -> usize {
        self.builds.iter().filter(|b| !b.succeeded()).count()
    }
}

/// Runs the build stages for one library at a time.
///
/// # Example
///
/// ```ignore
/// use xcforge_sdk::{Pipeline, PlatformSet, Registry, RunConfig, SystemRunner};
///
/// let mut pipeline = Pipeline::new(&SystemRunner, &registry, &run);
/// let report = pipeline.run(&library, &PlatformSet::all(&registry))?;
/// println!("bundle at {}", report.bundle.display());
/// ```
pub struct Pipeline<'a, R: ToolRunner + ?Sized> {
    runner: &'a R,
    registry: &'a Registry,
    run: &'a RunConfig,
    layout: OutputLayout,
    stage: PipelineStage,
}

impl<'a, R: ToolRunner + ?Sized> Pipeline<'a, R> {
    /// Creates an idle pipeline.
    pub fn new(runner: &'a R, registry: &'a Registry, run: &'a RunConfig) -> Self {
        Self {
            runner,
            registry,
            run,
            layout: OutputLayout::new(&run.root_dir, run.generator.clone()),
            stage: PipelineStage::Idle,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Builds, merges, symbolicates, patches and packages `library` for
    /// `platforms`.
    ///
    /// Failed builds are reported and dropped; the remaining stages only see
    /// the platforms that built. The pipeline can be run again afterwards.
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineReport)` - The bundle was produced
    /// * `Err(ForgeError::UnknownPlatform)` - A platform is missing from the
    ///   registry; nothing was launched
    /// * `Err(ForgeError::Merge)` - A universal merge failed
    /// * `Err(ForgeError::NothingToBundle)` - Every build failed
    /// * `Err(ForgeError::Bundle)` - Packaging failed
    pub fn run(
        &mut self,
        library: &LibraryTarget,
        platforms: &PlatformSet,
    ) -> Result<PipelineReport, ForgeError> {
        self.stage = PipelineStage::Idle;

        let artifacts = platforms
            .iter()
            .map(|id| -> Result<FrameworkArtifact, ForgeError> {
                Ok(self.layout.artifact(self.registry.get(id)?, library))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.transition(PipelineStage::Building, library);
        let requests = artifacts
            .iter()
            .map(|a| BuildRequest::new(self.run, library, a.platform, a.build_dir.clone()))
            .collect();
        let results = build_all(self.runner, requests);
        report_results(&results);

        let builds: Vec<BuildOutcome> = results
            .iter()
            .map(|r| BuildOutcome {
                platform: r.platform.id,
                step: r.step,
                status: r.status(),
            })
            .collect();
        let mut surviving =
            PlatformSet::new(results.iter().filter(|r| r.succeeded()).map(|r| r.platform.id));

        self.transition(PipelineStage::Unifying, library);
        let merged = unify(
            self.runner,
            self.run,
            self.registry,
            &mut surviving,
            &artifacts,
            library,
        )
        .map_err(|e| self.fail(e))?;

        let survivors: Vec<&FrameworkArtifact> = surviving
            .iter()
            .filter_map(|id| artifacts.iter().find(|a| a.platform.id == id))
            .collect();

        self.transition(PipelineStage::Symbolicating, library);
        let mut missing_symbols = Vec::new();
        let mut entries = Vec::with_capacity(survivors.len());
        for artifact in &survivors {
            let debug_symbols = match generate_symbols(self.runner, &self.run.tools, artifact) {
                Ok(dsym) => Some(dsym),
                Err(failure) => {
                    log::warn!(
                        "[{}] Symbol generation failed, packaging without symbols\n{}",
                        artifact.platform.id,
                        failure
                    );
                    missing_symbols.push(artifact.platform.id);
                    None
                }
            };
            entries.push(BundleEntry {
                platform: artifact.platform.id,
                framework: artifact.framework.clone(),
                debug_symbols,
            });
        }

        self.transition(PipelineStage::MetadataPatching, library);
        let unpatched = survivors
            .iter()
            .filter(|a| {
                !patch_minimum_os(
                    self.runner,
                    &self.run.tools,
                    a,
                    &self.run.minimum_system_version,
                )
            })
            .map(|a| a.platform.id)
            .collect();

        self.transition(PipelineStage::Assembling, library);
        let bundle = assemble(
            self.runner,
            &self.run.tools,
            &self.layout.bundle_path(library),
            &entries,
            &library.name,
        )
        .map_err(|e| self.fail(e))?;

        self.transition(PipelineStage::Done, library);
        log::info!("✓ {} packaged at {}", library.name, bundle.display());

        Ok(PipelineReport {
            library: library.name.clone(),
            builds,
            merged,
            missing_symbols,
            unpatched,
            packaged: entries.iter().map(|e| e.platform).collect(),
            bundle,
        })
    }

    fn transition(&mut self, next: PipelineStage, library: &LibraryTarget) {
        log::debug!("{}: {} -> {}", library.name, self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, err: ForgeError) -> ForgeError {
        log::debug!("pipeline failed during {}: {}", self.stage, err);
        self.stage = PipelineStage::Failed;
        err
    }
}

/// Runs the pipeline for several libraries.
pub struct Forge<'a, R: ToolRunner + ?Sized> {
    runner: &'a R,
    registry: &'a Registry,
    run: &'a RunConfig,
}

impl<'a, R: ToolRunner + ?Sized> Forge<'a, R> {
    pub fn new(runner: &'a R, registry: &'a Registry, run: &'a RunConfig) -> Self {
        Self {
            runner,
            registry,
            run,
        }
    }

    /// Runs one pipeline per library, in order, on the same platform set.
    ///
    /// The first fatal error stops the run; libraries after it are not built.
    pub fn run(
        &self,
        libraries: &[LibraryTarget],
        platforms: &PlatformSet,
    ) -> Result<RunSummary, ForgeError> {
        let mut summary = RunSummary::new(self.run);
        self.run_into(libraries, platforms, &mut summary)?;
        Ok(summary)
    }

    /// Same as [`Forge::run`], but records into `summary`.
    ///
    /// Reports of libraries packaged before a fatal error stay in `summary`,
    /// and the error itself is recorded in [`RunSummary::failure`].
    pub fn run_into(
        &self,
        libraries: &[LibraryTarget],
        platforms: &PlatformSet,
        summary: &mut RunSummary,
    ) -> Result<(), ForgeError> {
        if libraries.is_empty() {
            return Err(ForgeError::Config("no libraries selected".to_string()));
        }

        for library in libraries {
            log::info!("Building {} for {}", library.name, platforms);
            let mut pipeline = Pipeline::new(self.runner, self.registry, self.run);
            match pipeline.run(library, platforms) {
                Ok(report) => summary.libraries.push(report),
                Err(err) => {
                    summary.failure = Some(format!("{}: {}", library.name, err));
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::testing::ScriptedRunner;
    use std::fs;
    use std::path::Path;

    fn library() -> LibraryTarget {
        LibraryTarget::new("neo_media_client", "new-qmedia", "com.cisco.quicr.qmedia")
            .sub_path("src/extern")
    }

    fn run_config(root: &Path) -> RunConfig {
        RunConfig::new(root, "cmake")
    }

    fn is_platform(inv: &crate::Invocation, toolchain_platform: &str) -> bool {
        inv.has_arg(&format!("-DPLATFORM={}", toolchain_platform))
    }

    fn flag_value(inv: &crate::Invocation, flag: &str) -> String {
        let pos = inv.args.iter().position(|a| a == flag).unwrap();
        inv.args[pos + 1].clone()
    }

    fn frameworks(inv: &crate::Invocation) -> Vec<String> {
        inv.args
            .windows(2)
            .filter(|w| w[0] == "-framework")
            .map(|w| w[1].clone())
            .collect()
    }

    #[test]
    fn test_catalyst_pair_is_merged_before_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new();
        let platforms = PlatformSet::new([PlatformId::CatalystArm, PlatformId::CatalystX86]);

        let mut pipeline = Pipeline::new(&runner, &registry, &run);
        let report = pipeline.run(&library(), &platforms).unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Done);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.packaged, vec![PlatformId::CatalystArm]);

        let merges = runner.calls_to("sh");
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].env_value("PREFIX"), Some("catalyst"));

        let bundles = runner.calls_to("xcodebuild");
        assert_eq!(bundles.len(), 1);
        let fws = frameworks(&bundles[0]);
        assert_eq!(fws.len(), 1);
        assert!(fws[0].contains("build-catalyst/"));
        assert!(!fws[0].contains("build-catalyst-x86"));
    }

    #[test]
    fn test_failed_build_is_skipped_by_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new().fail_when(
            |inv| inv.has_arg("-S") && is_platform(inv, "MAC_CATALYST_ARM64"),
            1,
        );
        let platforms = PlatformSet::new([PlatformId::CatalystArm, PlatformId::Ios]);

        let report = Pipeline::new(&runner, &registry, &run)
            .run(&library(), &platforms)
            .unwrap();

        assert_eq!(report.builds.len(), 2);
        assert_eq!(report.builds[0].platform, PlatformId::CatalystArm);
        assert_eq!(report.builds[0].step, BuildStep::Configure);
        assert_eq!(report.builds[0].status, 1);
        assert!(report.builds[1].succeeded());
        assert_eq!(report.failed_builds(), 1);

        let dsyms = runner.calls_to("dsymutil");
        assert_eq!(dsyms.len(), 1);
        assert!(dsyms[0].args[0].contains("build-ios"));
        assert!(runner.calls_to("plutil").is_empty());

        let bundles = runner.calls_to("xcodebuild");
        assert_eq!(bundles.len(), 1);
        assert_eq!(frameworks(&bundles[0]).len(), 1);
        assert_eq!(report.packaged, vec![PlatformId::Ios]);
    }

    #[test]
    fn test_failed_catalyst_slice_skips_merge() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new().fail_when(
            |inv| {
                inv.has_arg("--build") && inv.args.iter().any(|a| a.ends_with("build-catalyst"))
            },
            2,
        );
        let platforms = PlatformSet::new([PlatformId::CatalystArm, PlatformId::CatalystX86]);

        let report = Pipeline::new(&runner, &registry, &run)
            .run(&library(), &platforms)
            .unwrap();

        assert_eq!(report.builds[0].step, BuildStep::Compile);
        assert_eq!(report.builds[0].status, 2);
        assert!(report.builds[1].succeeded());
        assert!(report.merged.is_empty());
        assert!(runner.calls_to("sh").is_empty());
        assert_eq!(report.packaged, vec![PlatformId::CatalystX86]);

        let bundles = runner.calls_to("xcodebuild");
        assert_eq!(bundles.len(), 1);
        let fws = frameworks(&bundles[0]);
        assert_eq!(fws.len(), 1);
        assert!(fws[0].contains("build-catalyst-x86/"));
    }

    #[test]
    fn test_merge_failure_stops_before_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new().fail_when(|inv| inv.program_name() == "sh", 1);
        let platforms = PlatformSet::all(&registry);

        let mut pipeline = Pipeline::new(&runner, &registry, &run);
        let err = pipeline.run(&library(), &platforms).unwrap_err();

        assert!(matches!(err, ForgeError::Merge { .. }));
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
        assert!(runner.calls_to("xcodebuild").is_empty());
        assert!(runner.calls_to("dsymutil").is_empty());
    }

    #[test]
    fn test_all_builds_failing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new().fail_when(|inv| inv.program_name() == "cmake", 1);

        let mut pipeline = Pipeline::new(&runner, &registry, &run);
        let err = pipeline
            .run(&library(), &PlatformSet::new([PlatformId::Ios]))
            .unwrap_err();

        assert!(matches!(err, ForgeError::NothingToBundle(_)));
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
        assert!(runner.calls_to("xcodebuild").is_empty());
    }

    #[test]
    fn test_symbol_and_patch_failures_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new()
            .fail_when(|inv| inv.program_name() == "dsymutil", 1)
            .fail_when(|inv| inv.program_name() == "plutil", 1);
        let platforms = PlatformSet::new([PlatformId::CatalystArm, PlatformId::Ios]);

        let report = Pipeline::new(&runner, &registry, &run)
            .run(&library(), &platforms)
            .unwrap();

        assert_eq!(
            report.missing_symbols,
            vec![PlatformId::CatalystArm, PlatformId::Ios]
        );
        assert_eq!(report.unpatched, vec![PlatformId::CatalystArm]);
        let bundles = runner.calls_to("xcodebuild");
        assert_eq!(bundles.len(), 1);
        assert!(!bundles[0].has_arg("-debug-symbols"));
    }

    #[test]
    fn test_symbols_are_passed_to_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new();

        Pipeline::new(&runner, &registry, &run)
            .run(&library(), &PlatformSet::new([PlatformId::IosSimulator]))
            .unwrap();

        let bundle = &runner.calls_to("xcodebuild")[0];
        let pos = bundle.args.iter().position(|a| a == "-debug-symbols").unwrap();
        assert!(bundle.args[pos + 1].ends_with("neo_media_client.framework.dSYM"));
        let output = dir.path().join("neo_media_client.xcframework");
        assert_eq!(bundle.args.last().unwrap(), &output.display().to_string());
    }

    #[test]
    fn test_rerun_over_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new();
        let platforms = PlatformSet::new([PlatformId::Ios, PlatformId::IosSimulator]);
        let mut pipeline = Pipeline::new(&runner, &registry, &run);

        pipeline.run(&library(), &platforms).unwrap();
        fs::create_dir_all(dir.path().join("neo_media_client.xcframework")).unwrap();
        let report = pipeline.run(&library(), &platforms).unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Done);
        assert!(!report.bundle.exists());
        assert_eq!(runner.calls_to("xcodebuild").len(), 2);
    }

    #[test]
    fn test_unknown_platform_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::from_descriptors(
            vec![*Registry::standard().get(PlatformId::Ios).unwrap()],
            vec![],
        );
        let runner = ScriptedRunner::new();

        let err = Pipeline::new(&runner, &registry, &run)
            .run(&library(), &PlatformSet::new([PlatformId::CatalystArm]))
            .unwrap_err();

        assert!(matches!(err, ForgeError::UnknownPlatform(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_forge_runs_each_library() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new();
        let libraries = vec![
            library(),
            LibraryTarget::new("quicr", "libquicr", "com.cisco.quicr.quicr"),
        ];

        let summary = Forge::new(&runner, &registry, &run)
            .run(&libraries, &PlatformSet::new([PlatformId::Ios]))
            .unwrap();

        assert_eq!(summary.libraries.len(), 2);
        assert_eq!(summary.libraries[1].library, "quicr");
        assert_eq!(runner.calls_to("xcodebuild").len(), 2);
    }

    #[test]
    fn test_forge_gives_each_library_its_own_build_tree() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new();
        let libraries = vec![
            library(),
            LibraryTarget::new("quicr", "libquicr", "com.cisco.quicr.quicr"),
        ];

        Forge::new(&runner, &registry, &run)
            .run(&libraries, &PlatformSet::new([PlatformId::Ios]))
            .unwrap();

        let build_trees: Vec<(String, String)> = runner
            .calls_to("cmake")
            .iter()
            .filter(|inv| inv.has_arg("-S"))
            .map(|inv| (flag_value(inv, "-S"), flag_value(inv, "-B")))
            .collect();
        assert_eq!(build_trees.len(), 2);
        assert!(build_trees[0].0.ends_with("new-qmedia"));
        assert!(build_trees[1].0.ends_with("libquicr"));
        assert_ne!(build_trees[0].1, build_trees[1].1);
        assert!(build_trees[0].1.ends_with("build/neo_media_client/build-ios"));
        assert!(build_trees[1].1.ends_with("build/quicr/build-ios"));
    }

    #[test]
    fn test_forge_keeps_partial_summary_on_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new().fail_when(
            |inv| {
                inv.program_name() == "xcodebuild"
                    && inv.args.iter().any(|a| a.ends_with("/quicr.xcframework"))
            },
            1,
        );
        let libraries = vec![
            library(),
            LibraryTarget::new("quicr", "libquicr", "com.cisco.quicr.quicr"),
        ];
        let mut summary = RunSummary::new(&run);

        let err = Forge::new(&runner, &registry, &run)
            .run_into(&libraries, &PlatformSet::new([PlatformId::Ios]), &mut summary)
            .unwrap_err();

        assert!(matches!(err, ForgeError::Bundle(_)));
        assert_eq!(summary.libraries.len(), 1);
        assert_eq!(summary.libraries[0].library, "neo_media_client");
        assert!(summary.failure.as_deref().unwrap().starts_with("quicr: "));
    }

    #[test]
    fn test_forge_stops_at_first_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_config(dir.path());
        let registry = Registry::standard();
        let runner = ScriptedRunner::new().fail_when(|inv| inv.program_name() == "xcodebuild", 1);
        let libraries = vec![
            library(),
            LibraryTarget::new("quicr", "libquicr", "com.cisco.quicr.quicr"),
        ];

        let err = Forge::new(&runner, &registry, &run)
            .run(&libraries, &PlatformSet::new([PlatformId::Ios]))
            .unwrap_err();

        assert!(matches!(err, ForgeError::Bundle(_)));
        assert_eq!(runner.calls_to("xcodebuild").len(), 1);
        assert!(runner.calls().iter().all(|c| !c.has_arg("quicr")));
    }

    #[test]
    fn test_forge_requires_a_library() {
        let run = RunConfig::new("/deps", "cmake");
        let registry = Registry::standard();
        let err = Forge::new(&ScriptedRunner::new(), &registry, &run)
            .run(&[], &PlatformSet::all(&registry))
            .unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }
}
