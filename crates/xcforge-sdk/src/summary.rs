//! Run summary.
//!
//! Collects every [`PipelineReport`] of a run so the outcome of each build,
//! merge, symbol extraction and metadata patch can be inspected after the
//! fact, or written to disk as JSON.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::pipeline::PipelineReport;
use crate::types::{CryptoBackend, ForgeError, RunConfig};

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// RFC 3339 timestamp of when the run started.
    pub generated_at: String,
    pub build_number: u64,
    pub crypto: CryptoBackend,
    /// One report per packaged library, in run order.
    pub libraries: Vec<PipelineReport>,
    /// Fatal error that ended the run early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RunSummary {
    /// Starts an empty summary for `run`.
    pub fn new(run: &RunConfig) -> Self {
        Self {
            generated_at: timestamp(),
            build_number: run.build_number,
            crypto: run.crypto,
            libraries: Vec::new(),
            failure: None,
        }
    }

    /// Total number of failed platform builds across all libraries.
    pub fn failed_builds(&self) -> usize {
        self.libraries.iter().map(PipelineReport::failed_builds).sum()
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), ForgeError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_default()
    })
}
