//! Categorical indexing and feature-vector assembly.
//!
//! Encoding is two passes over the cleaned table: [`Encoder::fit`] indexes
//! `pos1` and `community` over every row, then [`Encoder::assemble`] splits the
//! rows into the trainable vectors and the wider analysis projection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::DerivedFeatures;
use crate::loader::Listing;

pub const FEATURE_COUNT: usize = 8;

/// Model input order. Persisted models depend on it.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "area",
    "current_floor",
    "total_floors",
    "bedrooms",
    "bathrooms",
    "port_distance",
    "pos1_index",
    "community_index",
];

/// Dense string-to-id mapping, most frequent category first.
#[derive(Debug, Clone, Default)]
pub struct CategoricalIndex {
    ids: HashMap<String, usize>,
    labels: Vec<String>,
}

impl CategoricalIndex {
    /// Ranks categories by descending count, ties in lexical order. Categories
    /// seen fewer than `min_count` times stay unmapped.
    pub fn fit<'a, I>(values: I, min_count: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values {
            *counts.entry(value).or_insert(0) += 1;
        }

        let mut ranked: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let labels: Vec<String> = ranked.iter().map(|(label, _)| label.to_string()).collect();
        let ids = labels
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id))
            .collect();
        Self { ids, labels }
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.ids.get(value).copied()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

/// A feature vector paired with its price label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledVector {
    pub features: FeatureVector,
    pub label: f64,
}

/// One row of `analysis_data.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub price: f64,
    pub area: f64,
    pub pos1: String,
    pub community: String,
    pub subway: String,
    pub current_floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub port_distance: Option<i64>,
    pub unit_price: Option<f64>,
}

impl AnalysisRow {
    pub fn new(listing: &Listing, features: &DerivedFeatures) -> Self {
        Self {
            price: listing.price,
            area: listing.area,
            pos1: listing.pos1.clone(),
            community: listing.community.clone(),
            subway: listing.subway.clone(),
            current_floor: features.current_floor,
            total_floors: features.total_floors,
            bedrooms: features.bedrooms,
            bathrooms: features.bathrooms,
            port_distance: features.port_distance,
            unit_price: features.unit_price,
        }
    }
}

/// Output of the second encoding pass. The two projections are kept apart:
/// `analysis` holds every cleaned row, `trainable` only the complete ones.
#[derive(Debug, Clone, Default)]
pub struct AssembledRows {
    pub trainable: Vec<LabeledVector>,
    pub analysis: Vec<AnalysisRow>,
}

impl AssembledRows {
    pub fn skipped(&self) -> usize {
        self.analysis.len() - self.trainable.len()
    }
}

#[derive(Debug, Clone)]
pub struct Encoder {
    pos1: CategoricalIndex,
    community: CategoricalIndex,
}

impl Encoder {
    pub fn fit(listings: &[Listing], min_count: usize) -> Self {
        let pos1 = CategoricalIndex::fit(listings.iter().map(|l| l.pos1.as_str()), min_count);
        let community =
            CategoricalIndex::fit(listings.iter().map(|l| l.community.as_str()), min_count);
        info!(
            pos1 = pos1.len(),
            community = community.len(),
            "indexed categorical columns"
        );
        Self { pos1, community }
    }

    pub fn pos1(&self) -> &CategoricalIndex {
        &self.pos1
    }

    pub fn community(&self) -> &CategoricalIndex {
        &self.community
    }

    /// Builds the model input for one row, or `None` under the skip policy.
    pub fn vectorize(&self, listing: &Listing, features: &DerivedFeatures) -> Option<FeatureVector> {
        let values = [
            listing.area,
            features.current_floor? as f64,
            features.total_floors? as f64,
            features.bedrooms? as f64,
            features.bathrooms? as f64,
            features.port_distance? as f64,
            self.pos1.index_of(&listing.pos1)? as f64,
            self.community.index_of(&listing.community)? as f64,
        ];
        values
            .iter()
            .all(|v| v.is_finite())
            .then_some(FeatureVector(values))
    }

    /// `listings` and `features` must be index-aligned.
    pub fn assemble(&self, listings: &[Listing], features: &[DerivedFeatures]) -> AssembledRows {
        debug_assert_eq!(listings.len(), features.len());

        let mut rows = AssembledRows {
            trainable: Vec::with_capacity(listings.len()),
            analysis: Vec::with_capacity(listings.len()),
        };
        for (listing, derived) in listings.iter().zip(features) {
            rows.analysis.push(AnalysisRow::new(listing, derived));
            if !listing.price.is_finite() {
                continue;
            }
            if let Some(vector) = self.vectorize(listing, derived) {
                rows.trainable.push(LabeledVector {
                    features: vector,
                    label: listing.price,
                });
            }
        }

        info!(
            trainable = rows.trainable.len(),
            skipped = rows.skipped(),
            "assembled feature vectors"
        );
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(pos1: &str, community: &str, price: f64) -> Listing {
        Listing {
            price,
            area: 60.0,
            source_id: "s".to_string(),
            layout: "2室1卫".to_string(),
            floor: "12/30层".to_string(),
            pos1: pos1.to_string(),
            pos2: "p2".to_string(),
            community: community.to_string(),
            subway: "距地铁500米".to_string(),
        }
    }

    fn complete() -> DerivedFeatures {
        DerivedFeatures {
            current_floor: Some(12),
            total_floors: Some(30),
            bedrooms: Some(2),
            bathrooms: Some(1),
            port_distance: Some(500),
            unit_price: Some(50.0),
        }
    }

    #[test]
    fn index_orders_by_frequency_then_label() {
        let index = CategoricalIndex::fit(["b", "a", "c", "c", "b", "c"], 1);
        assert_eq!(index.labels(), &["c", "b", "a"]);
        assert_eq!(index.index_of("c"), Some(0));
        assert_eq!(index.index_of("a"), Some(2));
        assert_eq!(index.index_of("zzz"), None);
    }

    #[test]
    fn ties_break_lexically() {
        let index = CategoricalIndex::fit(["海淀", "朝阳", "东城"], 1);
        let mut sorted = index.labels().to_vec();
        sorted.sort();
        assert_eq!(index.labels(), sorted.as_slice());
    }

    #[test]
    fn rare_categories_stay_unmapped() {
        let index = CategoricalIndex::fit(["a", "a", "b"], 2);
        assert_eq!(index.len(), 1);
        assert_eq!(index.index_of("b"), None);
    }

    #[test]
    fn vector_follows_feature_order() {
        let listings = vec![listing("朝阳", "望京花园", 3000.0)];
        let encoder = Encoder::fit(&listings, 1);
        let vector = encoder.vectorize(&listings[0], &complete()).unwrap();
        assert_eq!(
            vector.values(),
            &[60.0, 12.0, 30.0, 2.0, 1.0, 500.0, 0.0, 0.0]
        );
    }

    #[test]
    fn missing_feature_is_skipped_but_kept_for_analysis() {
        let listings = vec![listing("朝阳", "望京花园", 3000.0), listing("朝阳", "望京花园", 3100.0)];
        let encoder = Encoder::fit(&listings, 1);
        let no_subway = DerivedFeatures {
            port_distance: None,
            ..complete()
        };

        let rows = encoder.assemble(&listings, &[complete(), no_subway]);
        assert_eq!(rows.trainable.len(), 1);
        assert_eq!(rows.analysis.len(), 2);
        assert_eq!(rows.skipped(), 1);
        assert_eq!(rows.trainable[0].label, 3000.0);
        assert_eq!(rows.analysis[1].port_distance, None);
    }

    #[test]
    fn unmapped_category_is_skipped() {
        let listings = vec![
            listing("朝阳", "望京花园", 3000.0),
            listing("朝阳", "望京花园", 3000.0),
            listing("海淀", "华清嘉园", 5000.0),
        ];
        let encoder = Encoder::fit(&listings, 2);
        let rows = encoder.assemble(&listings, &[complete(), complete(), complete()]);
        assert_eq!(rows.trainable.len(), 2);
        assert_eq!(rows.analysis.len(), 3);
    }

    #[test]
    fn analysis_row_carries_raw_and_derived_columns() {
        let l = listing("朝阳", "望京花园", 3000.0);
        let row = AnalysisRow::new(&l, &complete());
        assert_eq!(row.pos1, "朝阳");
        assert_eq!(row.subway, "距地铁500米");
        assert_eq!(row.unit_price, Some(50.0));
        assert_eq!(row.total_floors, Some(30));
    }
}
