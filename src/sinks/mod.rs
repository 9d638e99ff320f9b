use ::geojson::feature::Id;
use ::geojson::{Feature as GeoJsonFeature, Geometry as GeoJsonGeometry};
use anyhow::Result;
use serde_json::{Map, Value};

use crate::export::Emitted;

pub mod geojson;
pub mod geojsonl;

pub use self::geojson::GeoJsonSink;
pub use self::geojsonl::GeoJsonlSink;

/// Receiver of projected records, fed by a single writer thread.
pub trait RecordSink: Send {
    fn add_record(&mut self, emitted: Emitted) -> Result<()>;

    /// Called once every record of `zoom` has been added.
    fn finish_zoom(&mut self, _zoom: u8) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()>;
}

impl RecordSink for Vec<Emitted> {
    fn add_record(&mut self, emitted: Emitted) -> Result<()> {
        self.push(emitted);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// GeoJSON feature for one record, tagged with its layer and zoom.
pub(crate) fn to_geojson_feature(emitted: &Emitted) -> GeoJsonFeature {
    let properties: Map<String, Value> = emitted
        .record
        .tags
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    let mut foreign_members = Map::new();
    foreign_members.insert("layer".to_string(), Value::from(emitted.layer.name.as_str()));
    foreign_members.insert("zoom".to_string(), Value::from(emitted.zoom));

    GeoJsonFeature {
        bbox: None,
        geometry: Some(GeoJsonGeometry::from(emitted.record.geometry.as_ref())),
        id: emitted.record.id.map(|id| Id::Number(id.into())),
        properties: Some(properties),
        foreign_members: Some(foreign_members),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::filter::FilterExpr;
    use crate::layers::{GeometryKind, LayerDefinition};
    use crate::project::Record;
    use geo_types::{Geometry, LineString, Point};
    use indexmap::IndexMap;
    use std::sync::Arc;

    pub fn layer(name: &str, geometry: GeometryKind) -> Arc<LayerDefinition> {
        Arc::new(LayerDefinition {
            name: name.into(),
            source: "osm".into(),
            geometry: Some(geometry),
            filter: FilterExpr::True,
            minzoom: 0,
            maxzoom: 14,
            attributes: vec!["name".into()],
        })
    }

    pub fn emitted_point(name: &str, lon: f64, lat: f64, zoom: u8) -> Emitted {
        let mut tags = IndexMap::new();
        tags.insert("place".to_string(), "city".to_string());
        tags.insert("name".to_string(), name.to_string());
        Emitted {
            zoom,
            layer: layer("places", GeometryKind::Point),
            record: Record {
                id: Some(42),
                geometry: Arc::new(Geometry::Point(Point::new(lon, lat))),
                tags,
            },
        }
    }

    pub fn emitted_line(zoom: u8) -> Emitted {
        let mut tags = IndexMap::new();
        tags.insert("highway".to_string(), "primary".to_string());
        Emitted {
            zoom,
            layer: layer("roads", GeometryKind::Line),
            record: Record {
                id: None,
                geometry: Arc::new(Geometry::LineString(LineString::from(vec![
                    (0.0, 0.0),
                    (1.0, 1.0),
                    (2.0, 0.0),
                ]))),
                tags,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn feature_carries_layer_and_zoom() {
        let feature = to_geojson_feature(&emitted_point("Yekaterinburg", 60.6, 56.84, 9));
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["layer"], "places");
        assert_eq!(json["zoom"], 9);
        assert_eq!(json["id"], 42);
        assert_eq!(json["properties"]["name"], "Yekaterinburg");
        assert_eq!(json["geometry"]["type"], "Point");
    }

    #[test]
    fn properties_keep_attribute_order() {
        let feature = to_geojson_feature(&emitted_point("A", 0.0, 0.0, 1));
        let keys: Vec<&String> = feature.properties.as_ref().unwrap().keys().collect();
        assert_eq!(keys, vec!["place", "name"]);
    }

    #[test]
    fn output_reads_back_as_geojson_feature() {
        let text = serde_json::to_string(&to_geojson_feature(&emitted_line(7))).unwrap();
        let parsed: GeoJsonFeature = text
            .parse::<::geojson::GeoJson>()
            .unwrap()
            .try_into()
            .unwrap();
        assert!(parsed.geometry.is_some());
        assert_eq!(parsed.property("highway"), Some(&Value::from("primary")));
        assert_eq!(
            parsed.foreign_members.as_ref().and_then(|m| m.get("layer")),
            Some(&Value::from("roads"))
        );
    }

    #[test]
    fn missing_id_is_omitted() {
        let json = serde_json::to_value(to_geojson_feature(&emitted_line(3))).unwrap();
        assert!(json.get("id").is_none());
    }
}
