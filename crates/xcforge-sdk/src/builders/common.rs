//! Common utilities shared by every pipeline stage.
//!
//! Each stage describes the external tool it needs as an [`Invocation`] and
//! hands it to a [`ToolRunner`]. The runner is the only place where processes
//! are spawned, which keeps the stages free of `std::process` details and lets
//! tests script exit codes without any Apple tooling installed.
//!
//! ## Error Messages
//!
//! Failures are converted into [`ToolFailure`] values that carry:
//! - The tool that failed
//! - Its exit status (`-1` if it never started)
//! - The captured stdout and the unmodified stderr

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::types::ToolFailure;

/// A fully described external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to run.
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub envs: Vec<(String, String)>,
    /// Working directory, inherited when unset.
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Creates an invocation of `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// File name of the program (e.g. `cmake` for `/opt/homebrew/bin/cmake`).
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Returns whether `arg` is one of the arguments.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value of an environment variable set on this invocation.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status; `-1` when the process was terminated by a signal.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Output describing a process that never ran.
    pub fn not_started(err: impl fmt::Display) -> Self {
        Self {
            status: -1,
            stdout: String::new(),
            stderr: err.to_string(),
        }
    }

    /// Converts a non-zero exit into a [`ToolFailure`] for `tool`.
    pub fn into_result(self, tool: &str) -> Result<ProcessOutput, ToolFailure> {
        if self.success() {
            Ok(self)
        } else {
            Err(ToolFailure {
                tool: tool.to_string(),
                status: self.status,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

impl From<Output> for ProcessOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs external processes on behalf of the pipeline.
///
/// Implementations must be shareable across the build worker threads.
pub trait ToolRunner: Send + Sync {
    /// Runs `invocation` to completion and captures its output.
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessOutput)` - The process ran (whatever its exit status)
    /// * `Err(io::Error)` - The process could not be started
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput>;
}

/// [`ToolRunner`] that spawns real processes and waits for them.
///
/// No timeout is applied: a hung tool hangs the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        cmd.output().map(ProcessOutput::from)
    }
}

/// Runs an external tool with consistent error handling.
///
/// Both a spawn error and a non-zero exit become a [`ToolFailure`] carrying
/// the captured streams.
///
/// # Arguments
/// * `runner` - Runner used to execute the process
/// * `invocation` - The process to run
/// * `tool` - Human-readable description of the tool
pub fn run_tool<R: ToolRunner + ?Sized>(
    runner: &R,
    invocation: &Invocation,
    tool: &str,
) -> Result<ProcessOutput, ToolFailure> {
    log::debug!("Running: {}", invocation);
    match runner.run(invocation) {
        Ok(output) => output.into_result(tool),
        Err(e) => Err(ToolFailure::spawn(tool, &e)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`ToolRunner`] used by the stage tests.

    use super::*;
    use std::sync::Mutex;

    type Rule = (Box<dyn Fn(&Invocation) -> bool + Send + Sync>, i32);

    /// Records every invocation and succeeds unless a rule says otherwise.
    pub(crate) struct ScriptedRunner {
        rules: Vec<Rule>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self {
                rules: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Makes invocations matching `predicate` exit with `status`.
        pub(crate) fn fail_when(
            mut self,
            predicate: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
            status: i32,
        ) -> Self {
            self.rules.push((Box::new(predicate), status));
            self
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Invocations whose program file name is `program`.
        pub(crate) fn calls_to(&self, program: &str) -> Vec<Invocation> {
            self.calls()
                .into_iter()
                .filter(|c| c.program_name() == program)
                .collect()
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            let status = self
                .rules
                .iter()
                .find(|(predicate, _)| predicate(invocation))
                .map(|(_, status)| *status)
                .unwrap_or(0);
            Ok(ProcessOutput {
                status,
                stdout: format!("{} stdout", invocation.program_name()),
                stderr: if status == 0 {
                    String::new()
                } else {
                    format!("{} scripted failure", invocation.program_name())
                },
            })
        }
    }

    /// Runner whose processes never start.
    pub(crate) struct MissingToolRunner;

    impl ToolRunner for MissingToolRunner {
        fn run(&self, _invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ))
        }
    }
}
