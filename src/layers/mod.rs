//! Layer definitions and feature classification.

use geo_types::Geometry;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::filter::{FilterExpr, evaluate_filter};
use crate::project::Feature;

/// Geometry category a layer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    /// Category of a decoded geometry. Collections have no single kind.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryKind::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryKind::Line)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryKind::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Polygon => "polygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GeometryKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "point" => Ok(GeometryKind::Point),
            "line" | "linestring" => Ok(GeometryKind::Line),
            "polygon" => Ok(GeometryKind::Polygon),
            _ => Err(format!("invalid geometry type: {value}")),
        }
    }
}

/// A validated layer. Built once by `CompiledConfig` and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDefinition {
    pub name: String,
    pub source: String,
    /// `None` accepts every geometry kind.
    pub geometry: Option<GeometryKind>,
    pub filter: FilterExpr,
    pub minzoom: u8,
    pub maxzoom: u8,
    pub attributes: Vec<String>,
}

impl LayerDefinition {
    pub fn covers_zoom(&self, zoom: u8) -> bool {
        (self.minzoom..=self.maxzoom).contains(&zoom)
    }

    pub fn accepts(&self, kind: Option<GeometryKind>) -> bool {
        match self.geometry {
            None => true,
            Some(expected) => kind == Some(expected),
        }
    }

    /// Zoom, geometry and filter checks, cheapest first.
    pub fn matches(&self, feature: &Feature, zoom: u8) -> bool {
        self.matches_kind(feature, feature.kind(), zoom)
    }

    fn matches_kind(&self, feature: &Feature, kind: Option<GeometryKind>, zoom: u8) -> bool {
        self.covers_zoom(zoom)
            && self.accepts(kind)
            && evaluate_filter(&self.filter, &feature.tags)
    }
}

/// Layers a feature belongs to at `zoom`, in configured order.
///
/// Layers are independent: a feature may land in several, or in none, in
/// which case it is simply left out of the output.
pub fn classify<'a>(
    feature: &Feature,
    layers: &'a [Arc<LayerDefinition>],
    zoom: u8,
) -> Vec<&'a Arc<LayerDefinition>> {
    let kind = feature.kind();
    layers
        .iter()
        .filter(|layer| layer.matches_kind(feature, kind, zoom))
        .collect()
}
