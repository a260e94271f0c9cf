use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Column layout every source file must provide.
pub const LISTING_COLUMNS: [&str; 9] = [
    "price",
    "area",
    "source-id",
    "layout",
    "floor",
    "pos1",
    "pos2",
    "community",
    "subway",
];

/// One cleaned rental listing. Every field is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub price: f64,
    pub area: f64,
    pub source_id: String,
    pub layout: String,
    pub floor: String,
    pub pos1: String,
    pub pos2: String,
    pub community: String,
    pub subway: String,
}

#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub files_read: usize,
    pub skipped: Vec<SkippedSource>,
    pub rows_read: usize,
    pub rows_retained: usize,
}

/// Reads one source with every column as text, projected onto [`LISTING_COLUMNS`].
pub fn read_source(path: &Path) -> PolarsResult<DataFrame> {
    let df = CsvReader::from_path(path)?
        .has_header(true)
        .infer_schema(Some(0))
        .finish()?;

    let text_columns: Vec<Expr> = LISTING_COLUMNS
        .iter()
        .map(|&name| col(name).cast(DataType::Utf8))
        .collect();
    df.lazy().select(text_columns).collect()
}

/// Coerces the numeric columns, drops exact duplicates, then drops any row
/// with a null. Unparseable numbers become nulls and go with them.
pub fn clean(df: DataFrame) -> PolarsResult<DataFrame> {
    df.lazy()
        .with_columns([
            col("price").cast(DataType::Float64),
            col("area").cast(DataType::Float64),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .drop_nulls(None)
        .collect()
}

/// Unions every readable source, cleans the result and converts it to listings.
///
/// A source that can't be read is logged and skipped, the rest still load.
pub fn load_listings(paths: &[PathBuf]) -> Result<(Vec<Listing>, LoadReport), PipelineError> {
    let mut report = LoadReport::default();
    let mut unified: Option<DataFrame> = None;

    for path in paths {
        match read_source(path) {
            Ok(df) => {
                report.files_read += 1;
                report.rows_read += df.height();
                match unified.as_mut() {
                    Some(all) => {
                        all.vstack_mut(&df)?;
                    }
                    None => unified = Some(df),
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable source");
                report.skipped.push(SkippedSource {
                    path: path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let listings = match unified {
        Some(df) => {
            let cleaned = clean(df)?;
            to_listings(&cleaned)?
        }
        None => Vec::new(),
    };
    report.rows_retained = listings.len();

    info!(
        files = report.files_read,
        skipped = report.skipped.len(),
        rows_read = report.rows_read,
        rows_retained = report.rows_retained,
        "loaded listings"
    );
    Ok((listings, report))
}

fn to_listings(df: &DataFrame) -> PolarsResult<Vec<Listing>> {
    let price = df.column("price")?.f64()?;
    let area = df.column("area")?.f64()?;
    let source_id = df.column("source-id")?.utf8()?;
    let layout = df.column("layout")?.utf8()?;
    let floor = df.column("floor")?.utf8()?;
    let pos1 = df.column("pos1")?.utf8()?;
    let pos2 = df.column("pos2")?.utf8()?;
    let community = df.column("community")?.utf8()?;
    let subway = df.column("subway")?.utf8()?;

    let mut listings = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        // nulls were dropped by `clean`, the match only guards the types
        if let (
            Some(price),
            Some(area),
            Some(source_id),
            Some(layout),
            Some(floor),
            Some(pos1),
            Some(pos2),
            Some(community),
            Some(subway),
        ) = (
            price.get(i),
            area.get(i),
            source_id.get(i),
            layout.get(i),
            floor.get(i),
            pos1.get(i),
            pos2.get(i),
            community.get(i),
            subway.get(i),
        ) {
            listings.push(Listing {
                price,
                area,
                source_id: source_id.to_string(),
                layout: layout.to_string(),
                floor: floor.to_string(),
                pos1: pos1.to_string(),
                pos2: pos2.to_string(),
                community: community.to_string(),
                subway: subway.to_string(),
            });
        }
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "price,area,source-id,layout,floor,pos1,pos2,community,subway\n";

    fn write_source(dir: &TempDir, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut body = HEADER.to_string();
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn unions_all_sources() {
        let dir = TempDir::new().unwrap();
        let a = write_source(
            &dir,
            "a.csv",
            &["3000,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米"],
        );
        let b = write_source(
            &dir,
            "b.csv",
            &["4200,80,s2,3室2卫,5/20层,海淀,五道口,华清嘉园,距地铁300米"],
        );

        let (listings, report) = load_listings(&[a, b]).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(report.files_read, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(listings[0].price, 3000.0);
        assert_eq!(listings[0].area, 60.0);
        assert_eq!(listings[1].community, "华清嘉园");
    }

    #[test]
    fn missing_source_is_skipped() {
        let dir = TempDir::new().unwrap();
        let a = write_source(
            &dir,
            "a.csv",
            &["3000,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米"],
        );
        let missing = dir.path().join("nope.csv");

        let (listings, report) = load_listings(&[a, missing.clone()]).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(report.files_read, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, missing);
    }

    #[test]
    fn source_missing_a_column_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("narrow.csv");
        std::fs::write(&path, "price,area\n3000,60\n").unwrap();

        let (listings, report) = load_listings(&[path]).unwrap();
        assert!(listings.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn exact_duplicates_collapse() {
        let dir = TempDir::new().unwrap();
        let row = "3000,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米";
        let a = write_source(&dir, "a.csv", &[row, row]);

        let (listings, _) = load_listings(&[a]).unwrap();
        assert_eq!(listings.len(), 1);
    }

    #[test]
    fn dedup_is_idempotent_across_repeated_sources() {
        let dir = TempDir::new().unwrap();
        let a = write_source(
            &dir,
            "a.csv",
            &[
                "3000,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米",
                "3000,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米",
                "2500,45,s3,1室1卫,3/6层,丰台,宋家庄,石榴园,距地铁800米",
            ],
        );

        let (once, _) = load_listings(&[a.clone()]).unwrap();
        let (twice, _) = load_listings(&[a.clone(), a]).unwrap();
        assert_eq!(once.len(), 2);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn rows_with_any_null_are_dropped() {
        let dir = TempDir::new().unwrap();
        let a = write_source(
            &dir,
            "a.csv",
            &[
                "3000,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米",
                "3100,62,s2,2室1卫,12/30层,朝阳,望京,望京花园,",
                "3200,,s3,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米",
            ],
        );

        let (listings, report) = load_listings(&[a]).unwrap();
        assert_eq!(report.rows_read, 3);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].source_id, "s1");
    }

    #[test]
    fn non_numeric_price_is_coerced_to_null_and_dropped() {
        let dir = TempDir::new().unwrap();
        let a = write_source(
            &dir,
            "a.csv",
            &[
                "面议,60,s1,2室1卫,12/30层,朝阳,望京,望京花园,距地铁500米",
                "2800.5,55.5,s2,2室1卫,8/18层,朝阳,望京,望京花园,距地铁700米",
            ],
        );

        let (listings, _) = load_listings(&[a]).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price, 2800.5);
        assert_eq!(listings[0].area, 55.5);
    }

    #[test]
    fn no_readable_sources_yields_empty_table() {
        let dir = TempDir::new().unwrap();
        let (listings, report) =
            load_listings(&[dir.path().join("x.csv"), dir.path().join("y.csv")]).unwrap();
        assert!(listings.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.rows_retained, 0);
    }
}
