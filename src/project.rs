//! Features and the attribute projection applied to layer matches.

use geo_types::Geometry;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::layers::{GeometryKind, LayerDefinition};

/// A decoded feature. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry: Arc<Geometry<f64>>,
    pub tags: HashMap<String, String>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, tags: HashMap<String, String>) -> Self {
        Self {
            id: None,
            geometry: Arc::new(geometry),
            tags,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn kind(&self) -> Option<GeometryKind> {
        GeometryKind::of(&self.geometry)
    }
}

/// A feature reduced to one layer's attributes.
///
/// Geometry is shared with the source feature; tags are owned per record
/// and ordered as the layer lists its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<u64>,
    pub geometry: Arc<Geometry<f64>>,
    pub tags: IndexMap<String, String>,
}

impl From<Record> for Feature {
    fn from(record: Record) -> Self {
        Feature {
            id: record.id,
            geometry: record.geometry,
            tags: record.tags.into_iter().collect(),
        }
    }
}

/// Copy the layer's attribute keys present on the feature into a new record.
///
/// Keys the feature lacks are left out rather than defaulted.
pub fn project(feature: &Feature, layer: &LayerDefinition) -> Record {
    let tags = layer
        .attributes
        .iter()
        .filter_map(|key| {
            feature
                .tags
                .get(key)
                .map(|value| (key.clone(), value.clone()))
        })
        .collect();

    Record {
        id: feature.id,
        geometry: Arc::clone(&feature.geometry),
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterExpr;
    use crate::layers::LayerDefinition;
    use geo_types::{LineString, Point};

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn roads() -> LayerDefinition {
        LayerDefinition {
            name: "roads".into(),
            source: "osm".into(),
            geometry: Some(GeometryKind::Line),
            filter: FilterExpr::Has("highway".into()),
            minzoom: 5,
            maxzoom: 14,
            attributes: vec!["highway".into(), "name".into()],
        }
    }

    fn street() -> Feature {
        Feature::new(
            Geometry::LineString(LineString::from(vec![(60.5, 56.8), (60.6, 56.85)])),
            tags(&[
                ("highway", "primary"),
                ("name", "Main St"),
                ("surface", "asphalt"),
            ]),
        )
    }

    #[test]
    fn drops_unlisted_tags() {
        let record = project(&street(), &roads());
        let expected: IndexMap<String, String> = [
            ("highway".to_string(), "primary".to_string()),
            ("name".to_string(), "Main St".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(record.tags, expected);
        assert!(!record.tags.contains_key("surface"));
    }

    #[test]
    fn omits_missing_attributes() {
        let feature = Feature::new(
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
            tags(&[("highway", "track")]),
        );
        let record = project(&feature, &roads());
        assert_eq!(record.tags.len(), 1);
        assert!(!record.tags.contains_key("name"));
    }

    #[test]
    fn keeps_attribute_order() {
        let record = project(&street(), &roads());
        let keys: Vec<&str> = record.tags.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["highway", "name"]);
    }

    #[test]
    fn projection_is_idempotent() {
        let layer = roads();
        let once = project(&street(), &layer);
        let twice = project(&Feature::from(once.clone()), &layer);
        assert_eq!(once, twice);
    }

    #[test]
    fn shares_geometry_and_keeps_id() {
        let feature = street().with_id(42);
        let record = project(&feature, &roads());
        assert!(Arc::ptr_eq(&feature.geometry, &record.geometry));
        assert_eq!(record.id, Some(42));
    }

    #[test]
    fn empty_attribute_list_keeps_geometry_only() {
        let mut layer = roads();
        layer.attributes.clear();
        let feature = Feature::new(Geometry::Point(Point::new(1.0, 2.0)), tags(&[("a", "b")]));
        let record = project(&feature, &layer);
        assert!(record.tags.is_empty());
        assert_eq!(*record.geometry, Geometry::Point(Point::new(1.0, 2.0)));
    }
}
