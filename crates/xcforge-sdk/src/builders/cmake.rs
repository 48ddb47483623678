//! CMake build task
//!
//! This module builds one library for one platform: it prepares the platform's
//! build directory, runs the toolchain's configure step and, if that
//! succeeded, the compile step.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use super::common::{Invocation, ProcessOutput, ToolRunner};
use crate::layout::GeneratorLayout;
use crate::platform::PlatformDescriptor;
use crate::types::{CryptoBackend, LibraryTarget, RunConfig};

/// Everything needed to build one library for one platform.
///
/// Constructed once per platform per library and consumed by exactly one
/// [`run_build`] call.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Root directory of the run.
    pub root_dir: PathBuf,
    /// Platform being built.
    pub platform: PlatformDescriptor,
    /// Path to the `cmake` executable.
    pub cmake: PathBuf,
    /// Build counter.
    pub build_number: u64,
    /// Library source directory.
    pub source_dir: PathBuf,
    /// Framework bundle identifier.
    pub bundle_identifier: String,
    /// Build-system target to compile.
    pub compile_target: String,
    /// Output directory owned exclusively by this request.
    pub build_dir: PathBuf,
    /// Apple platforms toolchain file.
    pub toolchain_file: PathBuf,
    /// `CMAKE_MODULE_PATH` value.
    pub module_path: PathBuf,
    /// TLS backend selection.
    pub crypto: CryptoBackend,
    /// Deployment target.
    pub deployment_target: String,
    /// Marketing version.
    pub marketing_version: String,
    /// Generator and configuration.
    pub generator: GeneratorLayout,
    /// Parallelism requested from the compile step.
    pub jobs: usize,
}

impl BuildRequest {
    /// Creates the request for `library` on `platform`, writing into `build_dir`.
    pub fn new(
        run: &RunConfig,
        library: &LibraryTarget,
        platform: PlatformDescriptor,
        build_dir: PathBuf,
    ) -> Self {
        Self {
            root_dir: run.root_dir.clone(),
            platform,
            cmake: run.cmake.clone(),
            build_number: run.build_number,
            source_dir: run.root_dir.join(&library.source_dir),
            bundle_identifier: library.bundle_identifier.clone(),
            compile_target: library.compile_target.clone(),
            build_dir,
            toolchain_file: run.toolchain_file.clone(),
            module_path: run.module_path.clone(),
            crypto: run.crypto,
            deployment_target: run.deployment_target.clone(),
            marketing_version: run.marketing_version.clone(),
            generator: run.generator.clone(),
            jobs: run.jobs.max(1),
        }
    }

    /// The configure (generate) step.
    pub fn configure_invocation(&self) -> Invocation {
        let mut inv = Invocation::new(&self.cmake)
            .arg(format!(
                "-DCMAKE_TOOLCHAIN_FILE={}",
                self.toolchain_file.display()
            ))
            .arg("-S")
            .path_arg(&self.source_dir)
            .arg("-B")
            .path_arg(&self.build_dir);

        if let Some(generator) = &self.generator.generator {
            inv = inv.arg("-G").arg(generator.as_str());
        }

        inv.args([
            format!("-DCMAKE_BUILD_TYPE={}", self.generator.configuration),
            "-DCMAKE_FRAMEWORK=TRUE".to_string(),
            format!("-DPLATFORM={}", self.platform.toolchain_platform),
            format!("-DDEPLOYMENT_TARGET={}", self.deployment_target),
            "-DENABLE_VISIBILITY=ON".to_string(),
            format!("-DMACOSX_FRAMEWORK_IDENTIFIER={}", self.bundle_identifier),
            format!(
                "-DMACOSX_FRAMEWORK_SHORT_VERSION_STRING={}",
                self.marketing_version
            ),
            format!("-DMACOSX_FRAMEWORK_BUNDLE_VERSION={}", self.build_number),
            format!("-DCMAKE_MODULE_PATH={}", self.module_path.display()),
            format!("-DBUILD_NUMBER={}", self.build_number),
            self.crypto.toolchain_flag().to_string(),
            "-Wno-dev".to_string(),
        ])
    }

    /// The compile step.
    pub fn compile_invocation(&self) -> Invocation {
        Invocation::new(&self.cmake)
            .arg("--build")
            .path_arg(&self.build_dir)
            .arg("--target")
            .arg(self.compile_target.as_str())
            .arg("--config")
            .arg(self.generator.configuration.as_str())
            .arg(format!("-j{}", self.jobs))
    }
}

/// Step whose status and streams a [`BuildResult`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
    /// The build directory could not be created.
    Prepare,
    /// The configure step (final only when it failed).
    Configure,
    /// The compile step.
    Compile,
}

impl BuildStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStep::Prepare => "prepare",
            BuildStep::Configure => "configure",
            BuildStep::Compile => "compile",
        }
    }
}

/// Outcome of one build task.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Platform that was built.
    pub platform: PlatformDescriptor,
    /// Step whose output is final.
    pub step: BuildStep,
    /// Status and captured streams of that step.
    pub output: ProcessOutput,
}

impl BuildResult {
    pub fn succeeded(&self) -> bool {
        self.step == BuildStep::Compile && self.output.success()
    }

    pub fn status(&self) -> i32 {
        self.output.status
    }
}

/// Builds one library for one platform.
///
/// This performs the following steps:
/// 1. Create the platform build directory (no-op when it exists)
/// 2. Run the configure step
/// 3. Stop here if configure failed
/// 4. Run the compile step with one job per host compute unit
///
/// Failures are returned as data, never retried: a toolchain that cannot be
/// started yields status `-1` with the OS error in `stderr`.
pub fn run_build<R: ToolRunner + ?Sized>(runner: &R, request: &BuildRequest) -> BuildResult {
    let id = request.platform.id;
    log::info!(
        "[{}] Building {} @ {}",
        id,
        request.compile_target,
        request.build_dir.display()
    );

    if let Err(e) = fs::create_dir_all(&request.build_dir) {
        return BuildResult {
            platform: request.platform,
            step: BuildStep::Prepare,
            output: ProcessOutput::not_started(format!(
                "Failed to create build directory {}: {}",
                request.build_dir.display(),
                e
            )),
        };
    }

    let configure = execute(runner, &request.configure_invocation());
    if !configure.success() {
        log::debug!("[{}] Generation failed ({})", id, configure.status);
        return BuildResult {
            platform: request.platform,
            step: BuildStep::Configure,
            output: configure,
        };
    }

    let compile = execute(runner, &request.compile_invocation());
    BuildResult {
        platform: request.platform,
        step: BuildStep::Compile,
        output: compile,
    }
}

fn execute<R: ToolRunner + ?Sized>(runner: &R, invocation: &Invocation) -> ProcessOutput {
    log::debug!("Running: {}", invocation);
    runner.run(invocation).unwrap_or_else(|e| {
        ProcessOutput::not_started(format!(
            "Failed to start {}: {}\nEnsure cmake is installed or pass --cmake.",
            invocation.program.display(),
            e
        ))
    })
}
