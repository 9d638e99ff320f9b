//! Decoded-feature inputs.
//!
//! The export runs once per zoom level, so a source must be able to hand out
//! a fresh pass over its features on every `scan`.

mod geojson;

pub use self::geojson::{GeoJsonSource, GeoJsonlSource};

use anyhow::{Result, bail};

use crate::config::Source;
use crate::project::Feature;

pub type FeatureIter<'a> = Box<dyn Iterator<Item = Result<Feature>> + Send + 'a>;

pub trait FeatureSource: Send + Sync {
    /// Start a new pass over every feature.
    fn scan(&self) -> Result<FeatureIter<'_>>;

    /// Number of input records that could not be decoded into a feature.
    fn skipped(&self) -> u64 {
        0
    }
}

impl FeatureSource for Vec<Feature> {
    fn scan(&self) -> Result<FeatureIter<'_>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

pub fn source_kind_label(kind: &str) -> Option<&'static str> {
    match kind {
        "geojsonl" | "geojsonseq" | "ndjson" | "jsonl" => Some("geojsonl"),
        "geojson" | "json" => Some("geojson"),
        _ => None,
    }
}

/// Open a configured source for reading.
pub fn open_source(source: &Source) -> Result<Box<dyn FeatureSource>> {
    match source_kind_label(&source.kind) {
        Some("geojsonl") => {
            tracing::info!("Source '{}': geojsonl <- {:?}", source.name, source.path);
            Ok(Box::new(GeoJsonlSource::open(&source.path)?))
        }
        Some("geojson") => {
            tracing::info!("Source '{}': geojson <- {:?}", source.name, source.path);
            Ok(Box::new(GeoJsonSource::open(&source.path)?))
        }
        _ if source.kind == "pbf" => bail!(
            "Source '{}': raw PBF input is not decoded here; convert {:?} to GeoJSON Lines first and set type: geojsonl",
            source.name,
            source.path
        ),
        _ => bail!(
            "Source '{}': unsupported source type '{}' (expected geojsonl or geojson)",
            source.name,
            source.kind
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_pbf_sources() {
        let source = Source {
            name: "osm".into(),
            kind: "pbf".into(),
            path: PathBuf::from("data/region.osm.pbf"),
        };
        let err = open_source(&source).err().expect("pbf must be rejected");
        assert!(err.to_string().contains("GeoJSON Lines"), "{err}");
    }

    #[test]
    fn kind_aliases() {
        assert_eq!(source_kind_label("ndjson"), Some("geojsonl"));
        assert_eq!(source_kind_label("geojson"), Some("geojson"));
        assert_eq!(source_kind_label("shapefile"), None);
    }
}
