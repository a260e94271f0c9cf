//! Writes the processing stage's artifacts for the plotting stage.
//!
//! Files are staged as `<name>.tmp` and renamed once all of them are written.
//! `r2_score.txt` is renamed last, so its presence marks a complete run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::encoder::AnalysisRow;
use crate::error::PipelineError;
use crate::model::{ModelSummary, Prediction};

pub const PREDICTIONS_FILE: &str = "prediction_results.csv";
pub const ANALYSIS_FILE: &str = "analysis_data.csv";
pub const R2_FILE: &str = "r2_score.txt";
pub const MODEL_FILE: &str = "model.json";

/// Files the plotting stage needs before it can run.
pub const REQUIRED_ARTIFACTS: [&str; 3] = [PREDICTIONS_FILE, ANALYSIS_FILE, R2_FILE];

/// Commit order, completion marker last.
const COMMIT_ORDER: [&str; 4] = [PREDICTIONS_FILE, ANALYSIS_FILE, MODEL_FILE, R2_FILE];

pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.tmp", name))
    }

    /// Removes artifacts left by an earlier run so a failed run can't be
    /// mistaken for a finished one.
    pub fn clear(&self) -> Result<(), PipelineError> {
        for name in COMMIT_ORDER {
            for path in [self.path(name), self.staging_path(name)] {
                match fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale artifact"),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(PipelineError::artifact(path, err)),
                }
            }
        }
        Ok(())
    }

    pub fn write_all(
        &self,
        predictions: &[Prediction],
        analysis: &[AnalysisRow],
        summary: &ModelSummary,
        r2: f64,
    ) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::artifact(&self.dir, e))?;

        let staged = self.stage(predictions, analysis, summary, r2);
        if let Err(err) = staged {
            self.discard_staged();
            return Err(err);
        }

        for name in COMMIT_ORDER {
            let target = self.path(name);
            fs::rename(self.staging_path(name), &target)
                .map_err(|e| PipelineError::artifact(&target, e))?;
        }

        info!(
            dir = %self.dir.display(),
            predictions = predictions.len(),
            analysis = analysis.len(),
            r2,
            "artifacts written"
        );
        Ok(())
    }

    fn stage(
        &self,
        predictions: &[Prediction],
        analysis: &[AnalysisRow],
        summary: &ModelSummary,
        r2: f64,
    ) -> Result<(), PipelineError> {
        write_csv(&self.staging_path(PREDICTIONS_FILE), predictions)?;
        write_csv(&self.staging_path(ANALYSIS_FILE), analysis)?;

        let model_path = self.staging_path(MODEL_FILE);
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| PipelineError::artifact(&model_path, e))?;
        fs::write(&model_path, json).map_err(|e| PipelineError::artifact(&model_path, e))?;

        let r2_path = self.staging_path(R2_FILE);
        fs::write(&r2_path, r2.to_string()).map_err(|e| PipelineError::artifact(&r2_path, e))
    }

    fn discard_staged(&self) {
        for name in COMMIT_ORDER {
            let _ = fs::remove_file(self.staging_path(name));
        }
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::artifact(path, e))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| PipelineError::artifact(path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::artifact(path, e))
}
