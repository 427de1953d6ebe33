//! Directory conversion: every `.ies`/`.xml` file of a folder, one task each.
//!
//! With the `parallel` feature the files are spread over the Rayon pool;
//! without it they run one after another. Either way each file produces its
//! own [`FileOutcome`] and a failing file never stops the others.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::convert::{convert_file, extension, ConvertOptions};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub input:  PathBuf,
    pub output: PathBuf,
    /// `None` on success.
    pub error:  Option<String>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes:   Vec<FileOutcome>,
    pub elapsed_ms: u128,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// The `(input, output)` pairs for every convertible file directly inside
/// `input_dir`, sorted by file name.
pub fn plan_directory(input_dir: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut jobs = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let target_ext = match extension(&path).as_deref() {
            Some("ies") => "xml",
            Some("xml") => "ies",
            _ => continue,
        };
        let Some(stem) = path.file_stem() else { continue };
        let mut output = output_dir.join(stem);
        output.set_extension(target_ext);
        jobs.push((path, output));
    }
    jobs.sort();
    Ok(jobs)
}

fn run_job(input: &Path, output: &Path, opts: &ConvertOptions) -> FileOutcome {
    let error = convert_file(input, output, opts).err().map(|e| {
        warn!("{}: {e}", input.display());
        e.to_string()
    });
    FileOutcome { input: input.to_path_buf(), output: output.to_path_buf(), error }
}

/// Convert every job, in parallel when the `parallel` feature is enabled.
/// Outcomes come back in job order.
pub fn convert_all(jobs: &[(PathBuf, PathBuf)], opts: &ConvertOptions) -> Vec<FileOutcome> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        jobs.par_iter()
            .map(|(input, output)| run_job(input, output, opts))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        jobs.iter()
            .map(|(input, output)| run_job(input, output, opts))
            .collect()
    }
}

/// Convert the files of `input_dir` into `output_dir`, creating it if needed.
pub fn convert_directory(input_dir: &Path, output_dir: &Path, opts: &ConvertOptions) -> Result<BatchReport> {
    let started = Instant::now();
    fs::create_dir_all(output_dir)?;
    let jobs = plan_directory(input_dir, output_dir)?;
    let outcomes = convert_all(&jobs, opts);
    let report = BatchReport { outcomes, elapsed_ms: started.elapsed().as_millis() };
    info!(
        "Finished {} files in {} ms: {} converted, {} failed",
        report.outcomes.len(),
        report.elapsed_ms,
        report.succeeded(),
        report.failed()
    );
    Ok(report)
}
