/// Static in-memory corpus with precomputed relevance scores

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{RagCostError, Result};

/// Records at or below this score are never returned by a search.
pub const RELEVANCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub location: String,
    /// Weekly rent.
    pub price: u32,
    pub features: Vec<String>,
    pub description: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct CorpusIndex {
    records: Vec<Record>,
}

impl CorpusIndex {
    pub fn new(records: Vec<Record>) -> Result<Self> {
        for record in &records {
            if !record.score.is_finite() || !(0.0..=1.0).contains(&record.score) {
                return Err(RagCostError::InvalidArgument(format!(
                    "record {} has relevance score {} outside [0, 1]",
                    record.id, record.score
                )));
            }
        }
        Ok(Self { records })
    }

    /// Load records from a JSON array.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        Self::new(records)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Rental listings used by the demo assistant.
    pub fn builtin() -> Self {
        Self {
            records: vec![
                Record {
                    id: "prop1".to_string(),
                    kind: "Apartment".to_string(),
                    bedrooms: 2,
                    bathrooms: 1,
                    location: "42 Beach Rd, St Kilda".to_string(),
                    price: 450,
                    features: vec!["near beach".into(), "pool".into(), "parking".into()],
                    description: "Two-bedroom apartment a short walk from St Kilda beach, with a shared pool, secure parking and updated appliances.".to_string(),
                    score: 0.92,
                },
                Record {
                    id: "prop2".to_string(),
                    kind: "Apartment".to_string(),
                    bedrooms: 2,
                    bathrooms: 2,
                    location: "15 Acland St, St Kilda".to_string(),
                    price: 520,
                    features: vec!["renovated".into(), "near beach".into(), "balcony".into()],
                    description: "Renovated two-bedroom apartment with a large balcony and partial bay views, close to the Acland Street cafes.".to_string(),
                    score: 0.87,
                },
                Record {
                    id: "prop3".to_string(),
                    kind: "Apartment".to_string(),
                    bedrooms: 1,
                    bathrooms: 1,
                    location: "78 Carlisle St, St Kilda".to_string(),
                    price: 380,
                    features: vec!["gym".into(), "parking".into(), "public transport".into()],
                    description: "One-bedroom apartment with a building gym, near trams and trains for a quick trip into the city.".to_string(),
                    score: 0.68,
                },
                Record {
                    id: "prop4".to_string(),
                    kind: "House".to_string(),
                    bedrooms: 3,
                    bathrooms: 2,
                    location: "22 Tennyson St, Elwood".to_string(),
                    price: 750,
                    features: vec!["backyard".into(), "near beach".into(), "renovated kitchen".into()],
                    description: "Three-bedroom house with a backyard and a recently renovated kitchen, a short walk from Elwood beach.".to_string(),
                    score: 0.55,
                },
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records scoring above [`RELEVANCE_THRESHOLD`], best first. Scores are
    /// precomputed, so the query only labels the lookup.
    pub fn search(&self, query: &str) -> Vec<Record> {
        let mut results: Vec<Record> = self
            .records
            .iter()
            .filter(|r| r.score > RELEVANCE_THRESHOLD)
            .cloned()
            .collect();

        // sort_by is stable: equal scores keep registration order
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        tracing::debug!(query_chars = query.chars().count(), results = results.len(), "corpus search");
        results
    }
}

impl Default for CorpusIndex {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, score: f64) -> Record {
        Record {
            id: id.to_string(),
            kind: "Apartment".to_string(),
            bedrooms: 1,
            bathrooms: 1,
            location: "Somewhere".to_string(),
            price: 100,
            features: Vec::new(),
            description: String::new(),
            score,
        }
    }

    #[test]
    fn test_builtin_search_order() {
        let results = CorpusIndex::builtin().search("apartments near the beach");
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["prop1", "prop2", "prop3", "prop4"]);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let index = CorpusIndex::new(vec![
            record("low", 0.2),
            record("edge", 0.5),
            record("high", 0.51),
        ])
        .unwrap();
        let results = index.search("anything");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "high");
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let index = CorpusIndex::new(vec![
            record("a", 0.7),
            record("b", 0.9),
            record("c", 0.7),
            record("d", 0.7),
        ])
        .unwrap();
        let ids: Vec<String> = index.search("q").into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_rejects_out_of_range_scores() {
        assert!(CorpusIndex::new(vec![record("x", 1.2)]).is_err());
        assert!(CorpusIndex::new(vec![record("y", f64::NAN)]).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[{"id":"r1","type":"Studio","bedrooms":0,"bathrooms":1,
            "location":"Fitzroy","price":300,"features":["bike storage"],
            "description":"Compact studio","score":0.8}]"#;
        let index = CorpusIndex::from_json(json).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.records()[0].kind, "Studio");
    }
}
