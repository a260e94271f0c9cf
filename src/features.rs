//! Numeric features derived from the free-text listing fields.
//!
//! Every parser is total: unexpected input yields `None`, never an error.

use rayon::prelude::*;
use regex::Regex;

use crate::config::MarkerTable;
use crate::engine::Engine;
use crate::error::PipelineError;
use crate::loader::Listing;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedFeatures {
    pub current_floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub port_distance: Option<i64>,
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    floor_separator: String,
    floor_suffix: String,
    bedroom: Regex,
    bathroom: Regex,
    distance: Regex,
}

/// Matches the integer right before a literal marker.
fn count_before(marker: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(\d+){}", regex::escape(marker)))
}

fn capture_int(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

impl FeatureExtractor {
    pub fn new(markers: &MarkerTable) -> Result<Self, PipelineError> {
        Ok(Self {
            floor_separator: markers.floor_separator.clone(),
            floor_suffix: markers.floor_suffix.clone(),
            bedroom: count_before(&markers.bedroom)?,
            bathroom: count_before(&markers.bathroom)?,
            distance: count_before(&markers.distance)?,
        })
    }

    /// `"5/20层"` -> `(Some(5), Some(20))`. Without a separator both are `None`.
    pub fn parse_floor(&self, floor: &str) -> (Option<i64>, Option<i64>) {
        let mut parts = floor.split(self.floor_separator.as_str());
        let current = parts.next();
        let total = parts.next();
        let Some(total) = total else {
            return (None, None);
        };

        let current = current.and_then(|s| s.trim().parse().ok());
        let total = if self.floor_suffix.is_empty() {
            total
        } else {
            total.trim_end().trim_end_matches(self.floor_suffix.as_str())
        };
        (current, total.trim().parse().ok())
    }

    pub fn parse_bedrooms(&self, layout: &str) -> Option<i64> {
        capture_int(&self.bedroom, layout)
    }

    pub fn parse_bathrooms(&self, layout: &str) -> Option<i64> {
        capture_int(&self.bathroom, layout)
    }

    /// Distance to the nearest station in meters. `None` means no subway nearby.
    pub fn parse_port_distance(&self, subway: &str) -> Option<i64> {
        capture_int(&self.distance, subway)
    }

    pub fn extract(&self, listing: &Listing) -> DerivedFeatures {
        let (current_floor, total_floors) = self.parse_floor(&listing.floor);
        DerivedFeatures {
            current_floor,
            total_floors,
            bedrooms: self.parse_bedrooms(&listing.layout),
            bathrooms: self.parse_bathrooms(&listing.layout),
            port_distance: self.parse_port_distance(&listing.subway),
            unit_price: unit_price(listing.price, listing.area),
        }
    }

    /// Extracts features for every listing on the engine's pool, preserving order.
    pub fn extract_all(&self, engine: &Engine, listings: &[Listing]) -> Vec<DerivedFeatures> {
        let min_len = engine.min_rows_per_task(listings.len());
        engine.install(|| {
            listings
                .par_iter()
                .with_min_len(min_len)
                .map(|listing| self.extract(listing))
                .collect()
        })
    }
}

/// Price per square meter, `None` for a zero area or a non-finite result.
pub fn unit_price(price: f64, area: f64) -> Option<f64> {
    if area == 0.0 {
        return None;
    }
    let value = price / area;
    value.is_finite().then_some(value)
}
