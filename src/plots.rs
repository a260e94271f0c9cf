//! Plotting stage: reads the persisted artifacts and renders SVG charts.
//!
//! Only the files under the artifact directory are consulted, so this stage
//! can run long after (and independently of) the processing stage.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::encoder::AnalysisRow;
use crate::error::PlotError;
use crate::model::Prediction;
use crate::persist::{ANALYSIS_FILE, PREDICTIONS_FILE, R2_FILE, REQUIRED_ARTIFACTS};

const RESIDUAL_BINS: usize = 50;
const TOP_DISTRICTS: usize = 8;
const TOP_COMMUNITIES: usize = 15;

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Fails with the first required artifact that is missing from `dir`.
pub fn check_artifacts(dir: &Path) -> Result<(), PlotError> {
    for name in REQUIRED_ARTIFACTS {
        let path = dir.join(name);
        if !path.is_file() {
            return Err(PlotError::MissingArtifact(path));
        }
    }
    Ok(())
}

/// Everything the charts are drawn from.
#[derive(Debug, Clone)]
pub struct PlotData {
    pub predictions: Vec<Prediction>,
    pub analysis: Vec<AnalysisRow>,
    pub r2: f64,
}

impl PlotData {
    pub fn read(dir: &Path) -> Result<Self, PlotError> {
        check_artifacts(dir)?;

        let predictions = read_csv(&dir.join(PREDICTIONS_FILE))?;
        let analysis = read_csv(&dir.join(ANALYSIS_FILE))?;

        let r2_path = dir.join(R2_FILE);
        let r2 = fs::read_to_string(&r2_path)
            .map_err(|e| PlotError::read(&r2_path, e))?
            .trim()
            .parse::<f64>()
            .map_err(|e| PlotError::read(&r2_path, e))?;

        Ok(Self {
            predictions,
            analysis,
            r2,
        })
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PlotError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| PlotError::read(path, e))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| PlotError::read(path, e))
}

/// Renders every chart into `plot_dir` and returns the written paths.
pub fn render_all(data_dir: &Path, plot_dir: &Path) -> Result<Vec<PathBuf>, PlotError> {
    let data = PlotData::read(data_dir)?;
    fs::create_dir_all(plot_dir).map_err(|e| PlotError::Render {
        chart: "output directory",
        message: e.to_string(),
    })?;

    let charts: [(&'static str, fn(&Path, &PlotData) -> anyhow::Result<()>); 7] = [
        ("prediction_comparison", prediction_comparison),
        ("residuals_scatter", residuals_scatter),
        ("residuals_histogram", residuals_histogram),
        ("area_price_relation", area_price_relation),
        ("location_metro_analysis", location_metro_analysis),
        ("room_price_analysis", room_price_analysis),
        ("community_analysis", community_analysis),
    ];

    let mut written = Vec::with_capacity(charts.len());
    for (chart, draw) in charts {
        let path = plot_dir.join(format!("{}.svg", chart));
        draw(&path, &data).map_err(|e| PlotError::Render {
            chart,
            message: format!("{:#}", e),
        })?;
        info!(chart, path = %path.display(), "chart saved");
        written.push(path);
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStat {
    pub label: String,
    pub mean: f64,
    pub count: usize,
}

fn group_means<K: Ord>(items: impl Iterator<Item = (K, f64)>) -> BTreeMap<K, (f64, usize)> {
    let mut groups: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for (key, value) in items {
        let entry = groups.entry(key).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    for (sum, count) in groups.values_mut() {
        *sum /= *count as f64;
    }
    groups
}

/// Mean price per district, most expensive first.
pub fn district_prices(rows: &[AnalysisRow]) -> Vec<GroupStat> {
    let mut stats: Vec<GroupStat> = group_means(rows.iter().map(|r| (r.pos1.as_str(), r.price)))
        .into_iter()
        .map(|(label, (mean, count))| GroupStat {
            label: label.to_string(),
            mean,
            count,
        })
        .collect();
    stats.sort_by(|a, b| b.mean.total_cmp(&a.mean).then_with(|| a.label.cmp(&b.label)));
    stats
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetroComparison {
    pub district: String,
    /// Mean price of listings with a parsed subway distance.
    pub near: Option<f64>,
    pub far: Option<f64>,
}

/// Near/far subway mean prices for the `top` most expensive districts.
pub fn metro_comparison(rows: &[AnalysisRow], top: usize) -> Vec<MetroComparison> {
    let by_access = group_means(
        rows.iter()
            .map(|r| ((r.pos1.clone(), r.port_distance.is_some()), r.price)),
    );
    district_prices(rows)
        .into_iter()
        .take(top)
        .map(|d| {
            let mean = |near: bool| by_access.get(&(d.label.clone(), near)).map(|g| g.0);
            MetroComparison {
                near: mean(true),
                far: mean(false),
                district: d.label.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BedroomStat {
    pub bedrooms: i64,
    pub mean_price: f64,
    pub mean_unit_price: Option<f64>,
    pub count: usize,
}

/// Price and unit price per bedroom count. Rows without a bedroom count are left out.
pub fn bedroom_prices(rows: &[AnalysisRow]) -> Vec<BedroomStat> {
    let prices = group_means(rows.iter().filter_map(|r| Some((r.bedrooms?, r.price))));
    let unit_prices = group_means(
        rows.iter()
            .filter_map(|r| Some((r.bedrooms?, r.unit_price?)))
            .filter(|(_, v)| v.is_finite()),
    );
    prices
        .into_iter()
        .map(|(bedrooms, (mean_price, count))| BedroomStat {
            bedrooms,
            mean_price,
            mean_unit_price: unit_prices.get(&bedrooms).map(|g| g.0),
            count,
        })
        .collect()
}

/// The `top` communities by listing count, ties by name.
pub fn top_communities(rows: &[AnalysisRow], top: usize) -> Vec<GroupStat> {
    let mut stats: Vec<GroupStat> =
        group_means(rows.iter().map(|r| (r.community.as_str(), r.price)))
            .into_iter()
            .map(|(label, (mean, count))| GroupStat {
                label: label.to_string(),
                mean,
                count,
            })
            .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    stats.truncate(top);
    stats
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    pub start: f64,
    pub width: f64,
    pub counts: Vec<usize>,
}

/// Equal-width histogram over the finite values. The maximum lands in the last bin.
pub fn histogram(values: &[f64], bins: usize) -> Bins {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let bins = bins.max(1);
    let (lo, hi) = bounds(&finite).unwrap_or((0.0, 1.0));
    let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Bins {
        start: lo,
        width,
        counts,
    }
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    let mut iter = values.iter().copied().filter(|v| v.is_finite());
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// Data range with 5% padding on either side.
fn padded(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let values: Vec<f64> = values.into_iter().collect();
    match bounds(&values) {
        None => 0.0..1.0,
        Some((lo, hi)) if lo == hi => lo - 1.0..hi + 1.0,
        Some((lo, hi)) => {
            let pad = (hi - lo) * 0.05;
            lo - pad..hi + pad
        }
    }
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

enum Guide {
    Identity,
    Zero,
}

fn scatter(
    area: &Area,
    caption: &str,
    (x_desc, y_desc): (&str, &str),
    points: &[(f64, f64)],
    guide: Option<Guide>,
) -> anyhow::Result<()> {
    let (x_range, y_range) = match guide {
        // square axes so the identity line is the diagonal
        Some(Guide::Identity) => {
            let r = padded(points.iter().flat_map(|&(x, y)| [x, y]));
            (r.clone(), r)
        }
        _ => (
            padded(points.iter().map(|p| p.0)),
            padded(points.iter().map(|p| p.1)),
        ),
    };

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.clone(), y_range)?;
    chart.configure_mesh().x_desc(x_desc).y_desc(y_desc).draw()?;

    chart.draw_series(
        points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|&(x, y)| Circle::new((x, y), 2, BLUE.mix(0.5).filled())),
    )?;

    match guide {
        Some(Guide::Identity) => {
            chart.draw_series(LineSeries::new(
                [(x_range.start, x_range.start), (x_range.end, x_range.end)],
                RED.stroke_width(2),
            ))?;
        }
        Some(Guide::Zero) => {
            chart.draw_series(LineSeries::new(
                [(x_range.start, 0.0), (x_range.end, 0.0)],
                RED.stroke_width(1),
            ))?;
        }
        None => {}
    }
    Ok(())
}

struct Bar {
    label: String,
    value: f64,
    color: RGBColor,
    note: Option<String>,
}

fn bars(area: &Area, caption: &str, y_desc: &str, bars: &[Bar]) -> anyhow::Result<()> {
    if bars.is_empty() {
        area.titled(caption, ("sans-serif", 24))?;
        return Ok(());
    }

    let top = bars
        .iter()
        .map(|b| b.value)
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let top = if top > 0.0 { top * 1.15 } else { 1.0 };
    let labels: Vec<&str> = bars.iter().map(|b| b.label.as_str()).collect();

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((0u32..bars.len() as u32).into_segmented(), 0.0..top)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(y_desc)
        .x_labels(bars.len())
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => labels
                .get(*i as usize)
                .map(|s| s.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        let i = i as u32;
        let mut rect = Rectangle::new(
            [
                (SegmentValue::Exact(i), 0.0),
                (SegmentValue::Exact(i + 1), bar.value),
            ],
            bar.color.filled(),
        );
        rect.set_margin(0, 0, 4, 4);
        rect
    }))?;

    chart.draw_series(bars.iter().enumerate().filter_map(|(i, bar)| {
        let note = bar.note.clone()?;
        Some(Text::new(
            note,
            (SegmentValue::CenterOf(i as u32), bar.value),
            ("sans-serif", 12).into_font(),
        ))
    }))?;
    Ok(())
}

fn prediction_comparison(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (900, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(f64, f64)> = data
        .predictions
        .iter()
        .map(|p| (p.actual, p.predicted))
        .collect();
    scatter(
        &root,
        "Actual vs predicted price",
        ("actual price", "predicted price"),
        &points,
        Some(Guide::Identity),
    )?;
    root.draw(&Text::new(
        format!("R² = {:.4}", data.r2),
        (100, 60),
        ("sans-serif", 18).into_font(),
    ))?;

    root.present().context("writing prediction comparison")?;
    Ok(())
}

fn residuals_scatter(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (900, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(f64, f64)> = data
        .predictions
        .iter()
        .map(|p| (p.predicted, p.residual))
        .collect();
    scatter(
        &root,
        "Residuals",
        ("predicted price", "residual"),
        &points,
        Some(Guide::Zero),
    )?;

    root.present().context("writing residual scatter")?;
    Ok(())
}

fn residuals_histogram(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (900, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let residuals: Vec<f64> = data.predictions.iter().map(|p| p.residual).collect();
    let bins = histogram(&residuals, RESIDUAL_BINS);
    let end = bins.start + bins.width * bins.counts.len() as f64;
    let top = bins.counts.iter().copied().max().unwrap_or(0).max(1) as f64 * 1.1;

    let mut chart = ChartBuilder::on(&root)
        .caption("Residual distribution", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(bins.start..end, 0.0..top)?;
    chart
        .configure_mesh()
        .x_desc("residual")
        .y_desc("listings")
        .draw()?;

    chart.draw_series(bins.counts.iter().enumerate().map(|(i, &count)| {
        let x0 = bins.start + bins.width * i as f64;
        Rectangle::new(
            [(x0, 0.0), (x0 + bins.width, count as f64)],
            BLUE.mix(0.75).filled(),
        )
    }))?;

    root.present().context("writing residual histogram")?;
    Ok(())
}

fn area_price_relation(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (900, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(f64, f64)> = data.analysis.iter().map(|r| (r.area, r.price)).collect();
    scatter(
        &root,
        "Area vs price",
        ("area (m²)", "price"),
        &points,
        None,
    )?;

    root.present().context("writing area/price chart")?;
    Ok(())
}

fn location_metro_analysis(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (1600, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 2));

    let districts: Vec<Bar> = district_prices(&data.analysis)
        .into_iter()
        .map(|d| Bar {
            label: d.label,
            value: d.mean,
            color: BLUE,
            note: None,
        })
        .collect();
    bars(&panels[0], "Mean price by district", "mean price", &districts)?;

    let mut metro = Vec::new();
    for m in metro_comparison(&data.analysis, TOP_DISTRICTS) {
        if let Some(near) = m.near {
            metro.push(Bar {
                label: format!("{} 近地铁", m.district),
                value: near,
                color: GREEN,
                note: None,
            });
        }
        if let Some(far) = m.far {
            metro.push(Bar {
                label: format!("{} 无地铁", m.district),
                value: far,
                color: RED,
                note: None,
            });
        }
    }
    bars(
        &panels[1],
        "Subway access, most expensive districts",
        "mean price",
        &metro,
    )?;

    root.present().context("writing location chart")?;
    Ok(())
}

fn room_price_analysis(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (1600, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 2));

    let stats = bedroom_prices(&data.analysis);
    let prices: Vec<Bar> = stats
        .iter()
        .map(|s| Bar {
            label: format!("{}室", s.bedrooms),
            value: s.mean_price,
            color: BLUE,
            note: Some(s.count.to_string()),
        })
        .collect();
    bars(&panels[0], "Mean price by bedrooms", "mean price", &prices)?;

    let unit_prices: Vec<Bar> = stats
        .iter()
        .filter_map(|s| {
            Some(Bar {
                label: format!("{}室", s.bedrooms),
                value: s.mean_unit_price?,
                color: MAGENTA,
                note: None,
            })
        })
        .collect();
    bars(
        &panels[1],
        "Mean unit price by bedrooms",
        "price per m²",
        &unit_prices,
    )?;

    root.present().context("writing room chart")?;
    Ok(())
}

fn community_analysis(path: &Path, data: &PlotData) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (1600, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let communities: Vec<Bar> = top_communities(&data.analysis, TOP_COMMUNITIES)
        .into_iter()
        .map(|c| Bar {
            label: c.label,
            value: c.mean,
            color: CYAN,
            note: Some(format!("n={}", c.count)),
        })
        .collect();
    bars(
        &root,
        "Mean price of the most listed communities",
        "mean price",
        &communities,
    )?;

    root.present().context("writing community chart")?;
    Ok(())
}
