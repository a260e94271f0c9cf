//! Rent-price pipeline for Beijing rental listings.
//!
//! The processing stage loads the listing CSVs, derives numeric features from
//! the Chinese text columns, fits a ridge regression and persists its
//! artifacts. The plotting stage renders charts from those artifacts alone.

pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod features;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod persist;
pub mod plots;
pub mod stage;

pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError, PlotError};
pub use plots::{check_artifacts, render_all};
pub use stage::{process_data, run_pipeline, StageOutcome};
