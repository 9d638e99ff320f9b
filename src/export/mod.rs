//! Export coordination: drives classification and projection over every
//! zoom level of the export range.
//!
//! [`records`] is the lazy, single-threaded form. [`run`] spreads each zoom
//! level over the rayon pool and streams results to a sink through a
//! bounded channel.

mod run;

pub use run::{CancelFlag, ExportStats, OutputOrder, RunOptions, run};

use anyhow::Result;
use geo::{BoundingRect, Intersects};
use geo_types::Rect;
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::layers::{LayerDefinition, classify};
use crate::project::{Feature, Record, project};
use crate::source::{FeatureIter, FeatureSource};

/// One projected record destined for `layer` at `zoom`.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub zoom: u8,
    pub layer: Arc<LayerDefinition>,
    pub record: Record,
}

/// True when the feature's extent touches the export bounds.
pub fn within_bounds(feature: &Feature, bounds: &Rect<f64>) -> bool {
    feature
        .geometry
        .bounding_rect()
        .is_some_and(|rect| rect.intersects(bounds))
}

/// Classify and project one feature at one zoom, appending to `out`.
///
/// Every matching layer gets its own record.
pub fn emit_matches(
    feature: &Feature,
    layers: &[Arc<LayerDefinition>],
    zoom: u8,
    bounds: &Rect<f64>,
    out: &mut Vec<Emitted>,
) {
    if !within_bounds(feature, bounds) {
        return;
    }
    for layer in classify(feature, layers, zoom) {
        out.push(Emitted {
            zoom,
            layer: Arc::clone(layer),
            record: project(feature, layer),
        });
    }
}

fn zoom_has_layers(layers: &[Arc<LayerDefinition>], zoom: u8) -> bool {
    layers.iter().any(|layer| layer.covers_zoom(zoom))
}

/// Lazy export over `source`, zoom by zoom.
///
/// The source is scanned again for every zoom level that at least one layer
/// covers. The first error ends the sequence. Output order is the order
/// `run` reproduces under `OutputOrder::Strict`.
// The CLI drives `run`; this iterator is the library-facing entry point.
#[cfg_attr(not(test), allow(dead_code))]
pub fn records<'a>(
    source: &'a dyn FeatureSource,
    export: &ExportConfig,
    layers: &'a [Arc<LayerDefinition>],
) -> ExportIter<'a> {
    ExportIter {
        source,
        layers,
        bounds: export.bounds.to_rect(),
        zooms: export.zooms(),
        zoom: export.minzoom,
        features: None,
        pending: VecDeque::new(),
        failed: false,
    }
}

pub struct ExportIter<'a> {
    source: &'a dyn FeatureSource,
    layers: &'a [Arc<LayerDefinition>],
    bounds: Rect<f64>,
    zooms: RangeInclusive<u8>,
    zoom: u8,
    features: Option<FeatureIter<'a>>,
    pending: VecDeque<Emitted>,
    failed: bool,
}

impl Iterator for ExportIter<'_> {
    type Item = Result<Emitted>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(emitted) = self.pending.pop_front() {
                return Some(Ok(emitted));
            }
            if self.failed {
                return None;
            }

            if let Some(features) = self.features.as_mut() {
                match features.next() {
                    Some(Ok(feature)) => {
                        let mut out = Vec::new();
                        emit_matches(&feature, self.layers, self.zoom, &self.bounds, &mut out);
                        self.pending.extend(out);
                        continue;
                    }
                    Some(Err(err)) => {
                        self.failed = true;
                        self.features = None;
                        return Some(Err(err));
                    }
                    None => self.features = None,
                }
            }

            let zoom = self.zooms.next()?;
            if !zoom_has_layers(self.layers, zoom) {
                continue;
            }
            self.zoom = zoom;
            match self.source.scan() {
                Ok(features) => self.features = Some(features),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
