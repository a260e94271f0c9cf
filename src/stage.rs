use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, info};

use crate::config::{PipelineConfig, ScoringSplit};
use crate::encoder::Encoder;
use crate::engine::Engine;
use crate::error::PipelineError;
use crate::features::FeatureExtractor;
use crate::loader::{load_listings, LoadReport};
use crate::metrics::RegressionMetrics;
use crate::model::{train_test_split, RidgeRegression};
use crate::persist::ArtifactWriter;

/// What a successful processing run produced.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub load: LoadReport,
    pub analysis_rows: usize,
    pub trainable_rows: usize,
    pub train: RegressionMetrics,
    pub test: RegressionMetrics,
    /// The R² written to `r2_score.txt`.
    pub r2: f64,
}

/// Load -> extract -> encode -> train -> persist.
///
/// The engine is held for the whole run and released on every return path.
pub fn run_pipeline(config: &PipelineConfig) -> Result<StageOutcome, PipelineError> {
    config.validate()?;

    let writer = ArtifactWriter::new(&config.output_dir);
    writer.clear()?;

    let engine = Engine::acquire(&config.engine)?;

    // 1. Load, union and clean every source
    let sources = config.source_paths();
    let (listings, load) = engine.install(|| load_listings(&sources))?;

    // 2. Derive numeric features from the text columns
    let extractor = FeatureExtractor::new(&config.markers)?;
    let features = extractor.extract_all(&engine, &listings);

    // 3. Index categories over every row, then assemble vectors
    let encoder = Encoder::fit(&listings, config.model.min_category_count);
    let rows = encoder.assemble(&listings, &features);
    if rows.trainable.is_empty() {
        return Err(PipelineError::NoTrainableRows);
    }

    // 4. Split, fit on train, score both splits
    let (train, test) =
        train_test_split(&rows.trainable, config.split.train_fraction, config.split.seed);
    if train.is_empty() {
        return Err(PipelineError::EmptySplit("train", rows.trainable.len()));
    }
    if test.is_empty() {
        return Err(PipelineError::EmptySplit("test", rows.trainable.len()));
    }

    let model = RidgeRegression::new(config.model.reg_param).fit(&train)?;
    let train_predictions = model.evaluate(&train);
    let test_predictions = model.evaluate(&test);
    let train_metrics = RegressionMetrics::compute(&train_predictions);
    let test_metrics = RegressionMetrics::compute(&test_predictions);
    info!(
        rmse = test_metrics.rmse,
        mae = test_metrics.mae,
        r2 = test_metrics.r2,
        train_r2 = train_metrics.r2,
        "evaluated on held-out split"
    );

    let r2 = match config.scoring.split {
        ScoringSplit::Test => test_metrics.r2,
        ScoringSplit::Train => train_metrics.r2,
    };

    // 5. Persist for the plotting stage
    writer.write_all(
        &test_predictions,
        &rows.analysis,
        &model.summary(train_metrics, test_metrics),
        r2,
    )?;

    Ok(StageOutcome {
        load,
        analysis_rows: rows.analysis.len(),
        trainable_rows: rows.trainable.len(),
        train: train_metrics,
        test: test_metrics,
        r2,
    })
}

/// Stage boundary: runs the pipeline and reports success as a bool.
///
/// Errors and panics are logged here and never escape.
pub fn process_data(config: &PipelineConfig) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(config))) {
        Ok(Ok(outcome)) => {
            info!(
                rows = outcome.analysis_rows,
                trainable = outcome.trainable_rows,
                r2 = outcome.r2,
                "processing stage finished"
            );
            true
        }
        Ok(Err(err)) => {
            error!(error = %err, "processing stage failed");
            false
        }
        Err(payload) => {
            error!(panic = %panic_message(payload.as_ref()), "processing stage panicked");
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
