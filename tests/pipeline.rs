use std::fs;
use std::path::Path;

use rent_price_predictor::config::ScoringSplit;
use rent_price_predictor::encoder::AnalysisRow;
use rent_price_predictor::model::Prediction;
use rent_price_predictor::persist::{ANALYSIS_FILE, MODEL_FILE, PREDICTIONS_FILE, R2_FILE};
use rent_price_predictor::{
    check_artifacts, process_data, render_all, run_pipeline, PipelineConfig, PipelineError,
};
use tempfile::TempDir;

const HEADER: &str = "price,area,source-id,layout,floor,pos1,pos2,community,subway";
const DISTRICTS: [&str; 4] = ["朝阳", "海淀", "丰台", "通州"];
const COMMUNITIES: [&str; 5] = ["望京花园", "华清嘉园", "方庄小区", "果园小区", "双井公寓"];

/// Listings whose price roughly follows area and bedrooms.
fn listing_rows(file: usize, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let seed = file * 31 + i;
            let area = 25 + (seed * 7) % 90;
            let bedrooms = 1 + seed % 4;
            let bathrooms = 1 + seed % 2;
            let price = 40 * area + 300 * bedrooms + (seed * 13) % 250;
            let subway = if seed % 6 == 0 {
                "暂无地铁".to_string()
            } else {
                format!("距地铁{}米", 200 + (seed * 37) % 1200)
            };
            format!(
                "{},{},{}-{},{}室{}卫,{}/{}层,{},p{},{},{}",
                price,
                area,
                file,
                i,
                bedrooms,
                bathrooms,
                1 + seed % 18,
                18 + seed % 12,
                DISTRICTS[seed % DISTRICTS.len()],
                seed % 3,
                COMMUNITIES[seed % COMMUNITIES.len()],
                subway
            )
        })
        .collect()
}

fn write_source(dir: &Path, index: usize, rows: &[String]) {
    let mut body = String::from(HEADER);
    body.push('\n');
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    fs::write(dir.join(format!("bj_danke_{}.csv", index)), body).unwrap();
}

fn config_for(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.data_dir = dir.to_path_buf();
    config.output_dir = dir.join("plot_data");
    config.plot_dir = dir.join("plot_output");
    config.engine.threads = Some(2);
    config
}

fn read_predictions(dir: &Path) -> Vec<Prediction> {
    csv::Reader::from_path(dir.join(PREDICTIONS_FILE))
        .unwrap()
        .deserialize()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn read_analysis(dir: &Path) -> Vec<AnalysisRow> {
    csv::Reader::from_path(dir.join(ANALYSIS_FILE))
        .unwrap()
        .deserialize()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn missing_source_is_skipped() {
    let dir = TempDir::new().unwrap();
    for file in (1..=8).filter(|&f| f != 5) {
        write_source(dir.path(), file, &listing_rows(file, 20));
    }
    let config = config_for(dir.path());

    let outcome = run_pipeline(&config).unwrap();
    assert_eq!(outcome.load.files_read, 7);
    assert_eq!(outcome.load.skipped.len(), 1);
    assert!(outcome.load.skipped[0].path.ends_with("bj_danke_5.csv"));
    assert_eq!(outcome.load.rows_retained, 140);
    check_artifacts(&config.output_dir).unwrap();
}

#[test]
fn worked_example_reaches_analysis_data() {
    let dir = TempDir::new().unwrap();
    let mut rows = listing_rows(1, 30);
    rows.push("3000,60,x-1,2室1卫,12/30层,朝阳,p0,望京花园,距地铁500米".to_string());
    write_source(dir.path(), 1, &rows);
    let config = config_for(dir.path());

    assert!(process_data(&config));

    let analysis = read_analysis(&config.output_dir);
    assert_eq!(analysis.len(), 31);
    let row = analysis
        .iter()
        .find(|r| r.price == 3000.0 && r.area == 60.0)
        .unwrap();
    assert_eq!(row.current_floor, Some(12));
    assert_eq!(row.total_floors, Some(30));
    assert_eq!(row.bedrooms, Some(2));
    assert_eq!(row.bathrooms, Some(1));
    assert_eq!(row.port_distance, Some(500));
    assert_eq!(row.unit_price, Some(50.0));
}

#[test]
fn rows_without_subway_stay_in_analysis_only() {
    let dir = TempDir::new().unwrap();
    let rows = listing_rows(2, 60);
    let without_subway = rows.iter().filter(|r| r.ends_with("暂无地铁")).count();
    assert!(without_subway > 0);
    write_source(dir.path(), 1, &rows);
    let config = config_for(dir.path());

    let outcome = run_pipeline(&config).unwrap();
    assert_eq!(outcome.analysis_rows, 60);
    assert_eq!(outcome.trainable_rows, 60 - without_subway);

    let predictions = read_predictions(&config.output_dir);
    assert_eq!(predictions.len(), outcome.test.rows);
}

#[test]
fn no_trainable_rows_fails_without_artifacts() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<String> = (0..10)
        .map(|i| format!("{},50,id-{},2室1卫,3/6层,朝阳,p,望京花园,暂无地铁", 3000 + i, i))
        .collect();
    write_source(dir.path(), 1, &rows);
    let config = config_for(dir.path());

    // leftovers from an earlier run must not survive a failed one
    fs::create_dir_all(&config.output_dir).unwrap();
    fs::write(config.output_dir.join(R2_FILE), "0.9").unwrap();

    assert!(matches!(
        run_pipeline(&config),
        Err(PipelineError::NoTrainableRows)
    ));
    assert!(!process_data(&config));
    for name in [PREDICTIONS_FILE, ANALYSIS_FILE, R2_FILE, MODEL_FILE] {
        assert!(!config.output_dir.join(name).exists(), "{} exists", name);
    }
    assert!(check_artifacts(&config.output_dir).is_err());
}

#[test]
fn no_sources_at_all_fails() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path());
    assert!(!process_data(&config));
}

#[test]
fn single_trainable_row_leaves_an_empty_split() {
    let dir = TempDir::new().unwrap();
    write_source(
        dir.path(),
        1,
        &["3000,60,x,2室1卫,12/30层,朝阳,p0,望京花园,距地铁500米".to_string()],
    );
    let config = config_for(dir.path());
    // round(1 * 0.8) = 1 train row, 0 test rows
    assert!(matches!(
        run_pipeline(&config),
        Err(PipelineError::EmptySplit("test", 1))
    ));
}

#[test]
fn residuals_round_trip_exactly() {
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), 1, &listing_rows(3, 80));
    let config = config_for(dir.path());
    let outcome = run_pipeline(&config).unwrap();

    let predictions = read_predictions(&config.output_dir);
    assert_eq!(predictions.len(), outcome.test.rows);
    for p in &predictions {
        assert_eq!(p.residual, p.predicted - p.actual);
    }

    let r2: f64 = fs::read_to_string(config.output_dir.join(R2_FILE))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(r2, outcome.test.r2);
}

#[test]
fn identical_runs_produce_identical_artifacts() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    for dir in [&first, &second] {
        write_source(dir.path(), 1, &listing_rows(1, 50));
        write_source(dir.path(), 2, &listing_rows(2, 50));
    }
    let config_a = config_for(first.path());
    let config_b = config_for(second.path());
    run_pipeline(&config_a).unwrap();
    run_pipeline(&config_b).unwrap();

    for name in [PREDICTIONS_FILE, R2_FILE, MODEL_FILE] {
        assert_eq!(
            fs::read(config_a.output_dir.join(name)).unwrap(),
            fs::read(config_b.output_dir.join(name)).unwrap(),
            "{} differs",
            name
        );
    }
}

#[test]
fn duplicated_sources_collapse() {
    let dir = TempDir::new().unwrap();
    let rows = listing_rows(4, 25);
    write_source(dir.path(), 1, &rows);
    write_source(dir.path(), 2, &rows);
    let config = config_for(dir.path());

    let outcome = run_pipeline(&config).unwrap();
    assert_eq!(outcome.load.rows_read, 50);
    assert_eq!(outcome.load.rows_retained, 25);
}

#[test]
fn train_scoring_writes_training_r2() {
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), 1, &listing_rows(5, 60));
    let mut config = config_for(dir.path());
    config.scoring.split = ScoringSplit::Train;

    let outcome = run_pipeline(&config).unwrap();
    assert_eq!(outcome.r2, outcome.train.r2);
    let written: f64 = fs::read_to_string(config.output_dir.join(R2_FILE))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(written, outcome.train.r2);
}

#[test]
fn charts_render_from_pipeline_output() {
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), 1, &listing_rows(6, 60));
    let config = config_for(dir.path());
    assert!(process_data(&config));

    let charts = render_all(&config.output_dir, &config.plot_dir).unwrap();
    assert_eq!(charts.len(), 7);
    assert!(config.plot_dir.join("residuals_histogram.svg").exists());
    assert!(config.plot_dir.join("community_analysis.svg").exists());
}
