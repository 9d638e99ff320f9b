use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::filter::compile_filter;
use crate::layers::{GeometryKind, LayerDefinition};

/// Deepest zoom level accepted anywhere in a config.
pub const MAX_ZOOM: u8 = 24;

const DEFAULT_MINZOOM: i64 = 0;
const DEFAULT_MAXZOOM: i64 = 14;

/// Fatal configuration problems, reported once before any feature is read.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid bounding box {bbox:?}: {reason}")]
    InvalidBoundingBox {
        bbox: [f64; 4],
        reason: &'static str,
    },

    #[error(
        "Invalid zoom range for {scope}: [{min}, {max}] (expected 0 <= minzoom <= maxzoom <= {limit})",
        limit = MAX_ZOOM
    )]
    InvalidZoomRange { scope: String, min: i64, max: i64 },

    #[error("Malformed filter in layer '{layer}': {reason}")]
    MalformedFilter { layer: String, reason: String },

    #[error("Unknown geometry type '{value}' in layer '{layer}' (expected point, line or polygon)")]
    UnknownGeometryType { layer: String, value: String },

    #[error("Layer '{layer}' references unknown source '{source_name}'")]
    UnknownSource { layer: String, source_name: String },

    #[error("Configuration defines no layers")]
    NoLayers,
}

/// Config file contents, before validation.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TilesetConfig {
    pub bbox: BoundingBox,
    #[serde(default)]
    pub sources: IndexMap<String, SourceConfig>,
    #[serde(default)]
    pub layers: IndexMap<String, LayerConfig>,
    #[serde(default)]
    pub export: ExportSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LayerConfig {
    pub source: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub filter: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportSettings {
    #[serde(default = "default_minzoom")]
    pub minzoom: i64,
    #[serde(default = "default_maxzoom")]
    pub maxzoom: i64,
    /// Defaults to the bbox midpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    /// Defaults to the bbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            minzoom: DEFAULT_MINZOOM,
            maxzoom: DEFAULT_MAXZOOM,
            center: None,
            bounds: None,
        }
    }
}

fn default_minzoom() -> i64 {
    DEFAULT_MINZOOM
}

fn default_maxzoom() -> i64 {
    DEFAULT_MAXZOOM
}

/// Geographic rectangle in lon/lat degrees.
///
/// Accepts either `{min_x, min_y, max_x, max_y}` or
/// `[min_x, min_y, max_x, max_y]` in config files.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(from = "BoundsRepr")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundsRepr {
    Array([f64; 4]),
    Object {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
}

impl From<BoundsRepr> for BoundingBox {
    fn from(repr: BoundsRepr) -> Self {
        match repr {
            BoundsRepr::Array([min_x, min_y, max_x, max_y])
            | BoundsRepr::Object {
                min_x,
                min_y,
                max_x,
                max_y,
            } => BoundingBox {
                min_x,
                min_y,
                max_x,
                max_y,
            },
        }
    }
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn to_rect(&self) -> geo_types::Rect<f64> {
        geo_types::Rect::new(
            geo_types::coord! { x: self.min_x, y: self.min_y },
            geo_types::coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let invalid = |reason| ConfigValidationError::InvalidBoundingBox {
            bbox: self.as_array(),
            reason,
        };

        if self.as_array().iter().any(|v| !v.is_finite()) {
            return Err(invalid("coordinates must be finite"));
        }
        if self.min_x >= self.max_x {
            return Err(invalid("min_x must be less than max_x"));
        }
        if self.min_y >= self.max_y {
            return Err(invalid("min_y must be less than max_y"));
        }
        if self.min_x < -180.0 || self.max_x > 180.0 {
            return Err(invalid("longitude outside [-180, 180]"));
        }
        if self.min_y < -90.0 || self.max_y > 90.0 {
            return Err(invalid("latitude outside [-90, 90]"));
        }
        Ok(())
    }
}

/// A named input of decoded features.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub kind: String,
    pub path: PathBuf,
}

/// Export-wide settings after validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    pub minzoom: u8,
    pub maxzoom: u8,
    /// (lon, lat)
    pub center: (f64, f64),
    pub bounds: BoundingBox,
}

impl ExportConfig {
    pub fn zooms(&self) -> RangeInclusive<u8> {
        self.minzoom..=self.maxzoom
    }

    pub fn reaches(&self, layer: &LayerDefinition) -> bool {
        layer.minzoom <= self.maxzoom && layer.maxzoom >= self.minzoom
    }
}

/// Validated, immutable configuration shared by the whole run.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub bbox: BoundingBox,
    pub sources: Vec<Source>,
    pub layers: Vec<Arc<LayerDefinition>>,
    pub export: ExportConfig,
}

impl TilesetConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigValidationError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigValidationError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(
                contents,
                ::config::FileFormat::Yaml,
            ))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Fill derived export fields (center, bounds) and per-layer zoom defaults.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        let (cx, cy) = self.bbox.center();
        out.export.center.get_or_insert([cx, cy]);
        out.export.bounds.get_or_insert(self.bbox);
        for layer in out.layers.values_mut() {
            layer.minzoom.get_or_insert(self.export.minzoom);
            layer.maxzoom.get_or_insert(self.export.maxzoom);
        }
        out
    }

    /// Validate everything and build the immutable run configuration.
    ///
    /// Relative source paths are resolved against `base_dir`.
    pub fn compile(&self, base_dir: &Path) -> Result<CompiledConfig, ConfigValidationError> {
        self.bbox.validate()?;

        let (minzoom, maxzoom) =
            zoom_range("export".to_string(), self.export.minzoom, self.export.maxzoom)?;
        let bounds = self.export.bounds.unwrap_or(self.bbox);
        bounds.validate()?;
        let center = match self.export.center {
            Some([x, y]) => (x, y),
            None => self.bbox.center(),
        };
        let export = ExportConfig {
            minzoom,
            maxzoom,
            center,
            bounds,
        };

        let sources: Vec<Source> = self
            .sources
            .iter()
            .map(|(name, source)| Source {
                name: name.clone(),
                kind: source.kind.to_ascii_lowercase(),
                path: base_dir.join(&source.url),
            })
            .collect();

        if self.layers.is_empty() {
            return Err(ConfigValidationError::NoLayers);
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        for (name, layer) in &self.layers {
            let compiled = compile_layer(name, layer, &self.export, &sources)?;
            if !export.reaches(&compiled) {
                tracing::warn!(
                    "Layer '{}' zoom range [{}, {}] is outside export range [{}, {}]; it will be empty",
                    compiled.name,
                    compiled.minzoom,
                    compiled.maxzoom,
                    export.minzoom,
                    export.maxzoom
                );
            }
            layers.push(Arc::new(compiled));
        }

        Ok(CompiledConfig {
            bbox: self.bbox,
            sources,
            layers,
            export,
        })
    }
}

fn compile_layer(
    name: &str,
    layer: &LayerConfig,
    export: &ExportSettings,
    sources: &[Source],
) -> Result<LayerDefinition, ConfigValidationError> {
    if !sources.iter().any(|s| s.name == layer.source) {
        return Err(ConfigValidationError::UnknownSource {
            layer: name.to_string(),
            source_name: layer.source.clone(),
        });
    }

    let geometry = layer
        .geometry
        .as_deref()
        .map(|value| {
            value
                .parse::<GeometryKind>()
                .map_err(|_| ConfigValidationError::UnknownGeometryType {
                    layer: name.to_string(),
                    value: value.to_string(),
                })
        })
        .transpose()?;

    let (minzoom, maxzoom) = zoom_range(
        format!("layer '{}'", name),
        layer.minzoom.unwrap_or(export.minzoom),
        layer.maxzoom.unwrap_or(export.maxzoom),
    )?;

    let filter =
        compile_filter(&layer.filter).map_err(|reason| ConfigValidationError::MalformedFilter {
            layer: name.to_string(),
            reason,
        })?;

    tracing::debug!(
        "Layer '{}': filter `{}` reads {:?}",
        name,
        filter,
        filter.keys()
    );

    let mut attributes: Vec<String> = Vec::with_capacity(layer.attributes.len());
    for attribute in &layer.attributes {
        if !attributes.contains(attribute) {
            attributes.push(attribute.clone());
        }
    }

    Ok(LayerDefinition {
        name: name.to_string(),
        source: layer.source.clone(),
        geometry,
        filter,
        minzoom,
        maxzoom,
        attributes,
    })
}

fn zoom_range(scope: String, min: i64, max: i64) -> Result<(u8, u8), ConfigValidationError> {
    let in_range = |z: i64| (0..=i64::from(MAX_ZOOM)).contains(&z);
    if !in_range(min) || !in_range(max) || min > max {
        return Err(ConfigValidationError::InvalidZoomRange { scope, min, max });
    }
    Ok((min as u8, max as u8))
}

impl CompiledConfig {
    /// Load, validate and compile a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = TilesetConfig::load(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(raw.compile(base_dir)?)
    }

    /// Layers fed by `source`, in configured order.
    pub fn layers_for_source(&self, source: &str) -> Vec<Arc<LayerDefinition>> {
        self.layers
            .iter()
            .filter(|layer| layer.source == source)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterExpr;

    const EKB: &str = r#"
bbox: { min_x: 60.2768, min_y: 56.6769, max_x: 60.8812, max_y: 56.9579 }
sources:
  osm: { type: geojsonl, url: data/ekb.geojsonl }
layers:
  water:
    source: osm
    type: polygon
    filter: ["==", "natural", "water"]
    minzoom: 5
    maxzoom: 14
  landuse:
    source: osm
    type: polygon
    filter: ["has", "landuse"]
    minzoom: 5
    maxzoom: 14
    attributes: [landuse]
  roads:
    source: osm
    type: line
    filter: ["has", "highway"]
    minzoom: 5
    maxzoom: 14
    attributes: [highway, name]
  buildings:
    source: osm
    type: polygon
    filter: ["has", "building"]
    minzoom: 13
    maxzoom: 14
  places:
    source: osm
    type: point
    filter: ["has", "place"]
    minzoom: 5
    maxzoom: 14
    attributes: [place, name]
export:
  minzoom: 0
  maxzoom: 14
"#;

    fn compile(yaml: &str) -> Result<CompiledConfig, ConfigValidationError> {
        TilesetConfig::from_yaml_str(yaml)?.compile(Path::new("/srv/tiles"))
    }

    #[test]
    fn compiles_reference_config() {
        let config = compile(EKB).unwrap();

        let names: Vec<&str> = config.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["water", "landuse", "roads", "buildings", "places"]);

        let water = &config.layers[0];
        assert_eq!(water.geometry, Some(GeometryKind::Polygon));
        assert_eq!(
            water.filter,
            FilterExpr::Equals {
                key: "natural".into(),
                value: "water".into()
            }
        );
        assert!(water.attributes.is_empty());

        assert_eq!(config.layers[3].minzoom, 13);
        assert_eq!(config.layers[4].attributes, vec!["place", "name"]);

        assert_eq!(config.export.zooms(), 0..=14);
        assert_eq!(config.export.bounds, config.bbox);
        let (cx, cy) = config.export.center;
        assert!((cx - 60.579).abs() < 1e-9);
        assert!((cy - 56.8174).abs() < 1e-9);

        assert_eq!(
            config.sources[0].path,
            PathBuf::from("/srv/tiles/data/ekb.geojsonl")
        );
        assert_eq!(config.layers_for_source("osm").len(), 5);
    }

    #[test]
    fn bbox_accepts_array_form() {
        let yaml = EKB.replace(
            "bbox: { min_x: 60.2768, min_y: 56.6769, max_x: 60.8812, max_y: 56.9579 }",
            "bbox: [60.2768, 56.6769, 60.8812, 56.9579]",
        );
        let config = compile(&yaml).unwrap();
        assert_eq!(
            config.bbox,
            BoundingBox::new(60.2768, 56.6769, 60.8812, 56.9579)
        );
    }

    #[test]
    fn rejects_inverted_bbox() {
        let yaml = EKB.replace("max_x: 60.8812", "max_x: 60.0");
        assert!(matches!(
            compile(&yaml),
            Err(ConfigValidationError::InvalidBoundingBox { .. })
        ));
    }

    #[test]
    fn rejects_unknown_filter_operator() {
        let yaml = EKB.replace(r#"["has", "landuse"]"#, r#"["like", "landuse", "farm%"]"#);
        match compile(&yaml) {
            Err(ConfigValidationError::MalformedFilter { layer, reason }) => {
                assert_eq!(layer, "landuse");
                assert!(reason.contains("like"));
            }
            other => panic!("expected MalformedFilter, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_layer_zoom() {
        let yaml = EKB.replace("minzoom: 13", "minzoom: 15");
        assert!(matches!(
            compile(&yaml),
            Err(ConfigValidationError::InvalidZoomRange { ref scope, min: 15, max: 14 })
                if scope.contains("buildings")
        ));
    }

    #[test]
    fn rejects_export_zoom_beyond_max() {
        let yaml = EKB.replace(
            "export:\n  minzoom: 0\n  maxzoom: 14",
            "export:\n  minzoom: 0\n  maxzoom: 30",
        );
        assert!(matches!(
            compile(&yaml),
            Err(ConfigValidationError::InvalidZoomRange { min: 0, max: 30, .. })
        ));
    }

    #[test]
    fn rejects_unknown_geometry_type() {
        let yaml = EKB.replace("type: line", "type: curve");
        assert!(matches!(
            compile(&yaml),
            Err(ConfigValidationError::UnknownGeometryType { ref value, .. }) if value == "curve"
        ));
    }

    #[test]
    fn rejects_unknown_source() {
        let yaml = EKB.replacen("source: osm", "source: overture", 1);
        assert!(matches!(
            compile(&yaml),
            Err(ConfigValidationError::UnknownSource { ref source_name, .. })
                if source_name == "overture"
        ));
    }

    #[test]
    fn layer_zooms_default_to_export_range() {
        let yaml = r#"
bbox: [0, 0, 1, 1]
sources:
  osm: { type: geojsonl, url: a.geojsonl }
layers:
  everything: { source: osm }
export: { minzoom: 2, maxzoom: 6 }
"#;
        let config = compile(yaml).unwrap();
        let layer = &config.layers[0];
        assert_eq!((layer.minzoom, layer.maxzoom), (2, 6));
        assert_eq!(layer.geometry, None);
        assert_eq!(layer.filter, FilterExpr::True);
    }

    #[test]
    fn unreachable_layer_is_not_an_error() {
        let yaml = EKB.replace("minzoom: 13\n    maxzoom: 14", "minzoom: 15\n    maxzoom: 16");
        let config = compile(&yaml).unwrap();
        assert!(!config.export.reaches(&config.layers[3]));
    }

    #[test]
    fn duplicate_attributes_collapse() {
        let yaml = EKB.replace("attributes: [landuse]", "attributes: [landuse, name, landuse]");
        let config = compile(&yaml).unwrap();
        assert_eq!(config.layers[1].attributes, vec!["landuse", "name"]);
    }

    #[test]
    fn normalized_fills_derived_fields() {
        let raw = TilesetConfig::from_yaml_str(EKB).unwrap().normalized();
        assert_eq!(raw.export.bounds, Some(raw.bbox));
        assert!(raw.export.center.is_some());
        assert!(raw.layers.values().all(|l| l.minzoom.is_some() && l.maxzoom.is_some()));
    }

    #[test]
    fn empty_layers_rejected() {
        let yaml = "bbox: [0, 0, 1, 1]\n";
        assert!(matches!(compile(yaml), Err(ConfigValidationError::NoLayers)));
    }
}
