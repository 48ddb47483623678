//! Parallel build coordinator.
//!
//! Runs one build task per requested platform concurrently and waits for all
//! of them. A failing build never cancels its siblings: every task runs to
//! completion and reports its own [`BuildResult`].

use std::thread;

use super::cmake::{BuildRequest, BuildResult, BuildStep, run_build};
use super::common::{ProcessOutput, ToolRunner};

/// Builds every request concurrently.
///
/// Each request gets its own worker thread; the runner is shared read-only.
/// The call returns once every worker has finished.
///
/// # Returns
///
/// One [`BuildResult`] per request, in submission order. A worker that
/// panicked is reported as a failed result with status `-1`.
pub fn build_all<R: ToolRunner + ?Sized>(
    runner: &R,
    requests: Vec<BuildRequest>,
) -> Vec<BuildResult> {
    if requests.is_empty() {
        return Vec::new();
    }

    log::info!("Starting {} parallel builds", requests.len());

    thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .map(|request| (request, scope.spawn(move || run_build(runner, request))))
            .collect();

        handles
            .into_iter()
            .map(|(request, handle)| {
                handle.join().unwrap_or_else(|_| BuildResult {
                    platform: request.platform,
                    step: BuildStep::Prepare,
                    output: ProcessOutput::not_started(format!(
                        "build worker for {} panicked",
                        request.platform.id
                    )),
                })
            })
            .collect()
    })
}

/// Logs the outcome of each build, with captured stderr for failures.
pub fn report_results(results: &[BuildResult]) {
    for result in results {
        let id = result.platform.id;
        if result.succeeded() {
            log::info!("[{}] Build succeeded", id);
        } else {
            log::error!(
                "[{}] Build failed during {} ({})\n{}",
                id,
                result.step.as_str(),
                result.status(),
                result.output.stderr
            );
        }
    }
}
