//! TileJSON document describing an export.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::layers::LayerDefinition;

pub const TILEJSON_VERSION: &str = "3.0.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileJson {
    pub tilejson: &'static str,
    pub bounds: [f64; 4],
    /// `[lon, lat, zoom]`
    pub center: [f64; 3],
    pub minzoom: u8,
    pub maxzoom: u8,
    pub vector_layers: Vec<VectorLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorLayer {
    pub id: String,
    pub fields: IndexMap<String, String>,
    pub minzoom: u8,
    pub maxzoom: u8,
}

impl TileJson {
    /// Layers that no export zoom reaches are left out; the rest have their
    /// zoom range clamped to the export range.
    pub fn build(export: &ExportConfig, layers: &[Arc<LayerDefinition>]) -> Self {
        let vector_layers = layers
            .iter()
            .filter(|layer| export.reaches(layer))
            .map(|layer| VectorLayer {
                id: layer.name.clone(),
                fields: layer
                    .attributes
                    .iter()
                    .map(|attribute| (attribute.clone(), "String".to_string()))
                    .collect(),
                minzoom: layer.minzoom.max(export.minzoom),
                maxzoom: layer.maxzoom.min(export.maxzoom),
            })
            .collect();

        let (lon, lat) = export.center;
        Self {
            tilejson: TILEJSON_VERSION,
            bounds: export.bounds.as_array(),
            center: [lon, lat, f64::from(export.minzoom)],
            minzoom: export.minzoom,
            maxzoom: export.maxzoom,
            vector_layers,
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("TileJSON: Failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundingBox;
    use crate::filter::FilterExpr;
    use crate::layers::GeometryKind;

    fn layer(name: &str, minzoom: u8, maxzoom: u8, attributes: &[&str]) -> Arc<LayerDefinition> {
        Arc::new(LayerDefinition {
            name: name.into(),
            source: "osm".into(),
            geometry: Some(GeometryKind::Polygon),
            filter: FilterExpr::True,
            minzoom,
            maxzoom,
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        })
    }

    fn export() -> ExportConfig {
        ExportConfig {
            minzoom: 4,
            maxzoom: 12,
            center: (60.5790, 56.8174),
            bounds: BoundingBox::new(60.2768, 56.6769, 60.8812, 56.9579),
        }
    }

    #[test]
    fn clamps_layer_zooms() {
        let layers = vec![
            layer("water", 0, 14, &[]),
            layer("buildings", 13, 14, &["building"]),
            layer("places", 8, 9, &["place", "name"]),
        ];
        let doc = TileJson::build(&export(), &layers);

        assert_eq!(doc.tilejson, "3.0.0");
        assert_eq!(doc.center, [60.5790, 56.8174, 4.0]);
        let ids: Vec<&str> = doc.vector_layers.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["water", "places"]);
        assert_eq!((doc.vector_layers[0].minzoom, doc.vector_layers[0].maxzoom), (4, 12));
        assert_eq!((doc.vector_layers[1].minzoom, doc.vector_layers[1].maxzoom), (8, 9));
    }

    #[test]
    fn serializes_fields_in_attribute_order() {
        let layers = vec![layer("places", 8, 9, &["place", "name"])];
        let json = serde_json::to_value(TileJson::build(&export(), &layers)).unwrap();

        let fields = json["vector_layers"][0]["fields"].as_object().unwrap();
        let keys: Vec<&String> = fields.keys().collect();
        assert_eq!(keys, vec!["place", "name"]);
        assert_eq!(json["bounds"][0], 60.2768);
        assert_eq!(json["maxzoom"], 12);
    }

    #[test]
    fn writes_to_disk() {
        let temp_file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        TileJson::build(&export(), &[]).write(temp_file.path()).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(temp_file.path()).unwrap()).unwrap();
        assert_eq!(parsed["vector_layers"].as_array().unwrap().len(), 0);
    }
}
