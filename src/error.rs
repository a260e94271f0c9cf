use std::path::PathBuf;

use polars::prelude::PolarsError;

/// Errors raised by the processing stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start engine: {0}")]
    Engine(#[from] rayon::ThreadPoolBuildError),

    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),

    #[error("invalid marker pattern: {0}")]
    Marker(#[from] regex::Error),

    #[error("no trainable rows left after applying the skip policy")]
    NoTrainableRows,

    #[error("{0} split is empty ({1} trainable rows)")]
    EmptySplit(&'static str, usize),

    #[error("normal equations are not positive definite")]
    SingularSystem,

    #[error("failed to write {}: {}", .path.display(), .message)]
    ArtifactWrite { path: PathBuf, message: String },
}

impl PipelineError {
    pub(crate) fn artifact(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        PipelineError::ArtifactWrite {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Errors raised by the plotting stage.
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("missing data file {}, run the processing stage first", .0.display())]
    MissingArtifact(PathBuf),

    #[error("failed to read {}: {}", .path.display(), .message)]
    Read { path: PathBuf, message: String },

    #[error("failed to render {chart}: {message}")]
    Render { chart: &'static str, message: String },
}

impl PlotError {
    pub(crate) fn read(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        PlotError::Read {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
