//! Run configuration, loaded from an optional TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) reproduces
//! the stock run over `bj_danke_{1..8}.csv`:
//!
//! ```toml
//! data_dir = "./data"
//! output_dir = "./plot_data"
//!
//! [markers]
//! bedroom = "室"
//!
//! [model]
//! reg_param = 0.1
//!
//! [scoring]
//! split = "test"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_SOURCE_COUNT: usize = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory the input files are resolved against.
    pub data_dir: PathBuf,
    /// Input file names. Empty means `bj_danke_1.csv` .. `bj_danke_8.csv`.
    pub input_files: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub markers: MarkerTable,
    pub split: SplitConfig,
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
    pub engine: EngineConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            input_files: Vec::new(),
            output_dir: PathBuf::from("./plot_data"),
            plot_dir: PathBuf::from("./plot_output"),
            markers: MarkerTable::default(),
            split: SplitConfig::default(),
            model: ModelConfig::default(),
            scoring: ScoringConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Full paths of every input file, in load order.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        if self.input_files.is_empty() {
            (1..=DEFAULT_SOURCE_COUNT)
                .map(|i| self.data_dir.join(format!("bj_danke_{}.csv", i)))
                .collect()
        } else {
            self.input_files
                .iter()
                .map(|file| self.data_dir.join(file))
                .collect()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.split.train_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "split.train_fraction must be in (0, 1), got {}",
                fraction
            )));
        }
        if !(self.model.reg_param >= 0.0) || !self.model.reg_param.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "model.reg_param must be a non-negative number, got {}",
                self.model.reg_param
            )));
        }
        if self.model.min_category_count == 0 {
            return Err(ConfigError::Invalid(
                "model.min_category_count must be at least 1".to_string(),
            ));
        }
        if self.engine.partitions == 0 {
            return Err(ConfigError::Invalid(
                "engine.partitions must be at least 1".to_string(),
            ));
        }
        if self.engine.threads == Some(0) {
            return Err(ConfigError::Invalid(
                "engine.threads must be at least 1 when set".to_string(),
            ));
        }
        self.markers.validate()
    }
}

/// Literal markers used to pull numbers out of the listing text fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkerTable {
    /// Splits `current/total` in the floor field.
    pub floor_separator: String,
    /// Trailing literal after the total floor count.
    pub floor_suffix: String,
    pub bedroom: String,
    pub bathroom: String,
    /// Unit following the distance in the subway field.
    pub distance: String,
}

impl Default for MarkerTable {
    fn default() -> Self {
        Self {
            floor_separator: "/".to_string(),
            floor_suffix: "层".to_string(),
            bedroom: "室".to_string(),
            bathroom: "卫".to_string(),
            distance: "米".to_string(),
        }
    }
}

impl MarkerTable {
    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("floor_separator", &self.floor_separator),
            ("bedroom", &self.bedroom),
            ("bathroom", &self.bathroom),
            ("distance", &self.distance),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "markers.{} must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// L2 penalty strength.
    pub reg_param: f64,
    /// Categories seen fewer times than this are left unmapped.
    pub min_category_count: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            reg_param: 0.1,
            min_category_count: 1,
        }
    }
}

/// Which split's R² is written to `r2_score.txt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringSplit {
    #[default]
    Test,
    Train,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub split: ScoringSplit,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Target number of parallel partitions per table pass.
    pub partitions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: None,
            partitions: 8,
        }
    }
}
