use anyhow::{Context, Result};
use geo_types::Geometry;
use geojson::feature::Id;
use geojson::{FeatureCollection, GeoJson};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{FeatureIter, FeatureSource};
use crate::project::Feature;
use crate::utils::tags_from_properties;

/// Convert a GeoJSON feature into a decoded feature.
///
/// Returns `None` for features without a usable geometry.
pub fn feature_from_geojson(feature: geojson::Feature) -> Option<Feature> {
    let geometry = Geometry::<f64>::try_from(feature.geometry?).ok()?;
    let tags = feature
        .properties
        .as_ref()
        .map(tags_from_properties)
        .unwrap_or_default();

    let decoded = Feature::new(geometry, tags);
    let id = match feature.id {
        Some(Id::Number(n)) => n.as_u64(),
        Some(Id::String(s)) => s.parse().ok(),
        None => None,
    };
    Some(match id {
        Some(id) => decoded.with_id(id),
        None => decoded,
    })
}

/// GeoJSON Lines file, re-read from disk on every scan.
pub struct GeoJsonlSource {
    path: PathBuf,
    scans: AtomicU64,
    skipped: AtomicU64,
}

impl GeoJsonlSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Fail at startup rather than on the first zoom level.
        File::open(&path).with_context(|| format!("Source: Failed to open {:?}", path))?;
        Ok(Self {
            path,
            scans: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }
}

impl FeatureSource for GeoJsonlSource {
    fn scan(&self) -> Result<FeatureIter<'_>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Source: Failed to open {:?}", self.path))?;
        let reader = BufReader::new(file);
        // Later passes see the same records; only the first one counts skips.
        let counting = self.scans.fetch_add(1, Ordering::Relaxed) == 0;

        let iter = reader
            .lines()
            .enumerate()
            .filter_map(move |(index, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        return Some(Err(anyhow::Error::new(err).context(format!(
                            "Source: Failed reading line {} of {:?}",
                            index + 1,
                            self.path
                        ))));
                    }
                };
                let trimmed = line.trim().trim_start_matches('\u{1e}');
                if trimmed.is_empty() {
                    return None;
                }

                let decoded = serde_json::from_str::<geojson::Feature>(trimmed)
                    .ok()
                    .and_then(feature_from_geojson);
                if decoded.is_none() && counting {
                    tracing::debug!("Skipping undecodable feature on line {}", index + 1);
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                }
                decoded.map(Ok)
            });

        Ok(Box::new(iter))
    }

    fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// GeoJSON FeatureCollection, decoded once and kept in memory.
pub struct GeoJsonSource {
    features: Vec<Feature>,
    skipped: u64,
}

impl GeoJsonSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Source: Failed to open {:?}", path))?;
        let geojson: GeoJson = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Source: Failed to parse GeoJSON from {:?}", path))?;

        let raw = match geojson {
            GeoJson::FeatureCollection(FeatureCollection { features, .. }) => features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                anyhow::bail!("Source: {:?} holds a bare geometry, expected features", path)
            }
        };

        let total = raw.len();
        let features: Vec<Feature> = raw.into_iter().filter_map(feature_from_geojson).collect();
        let skipped = (total - features.len()) as u64;
        if skipped > 0 {
            tracing::debug!("Skipped {} features without usable geometry", skipped);
        }

        Ok(Self { features, skipped })
    }
}

impl FeatureSource for GeoJsonSource {
    fn scan(&self) -> Result<FeatureIter<'_>> {
        self.features.scan()
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }
}
