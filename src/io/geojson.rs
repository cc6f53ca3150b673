// src/io/geojson.rs
use std::path::Path;

use anyhow::Result;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

use crate::model::LossPolygon;

fn polygon_value(polygon: &geo_types::Polygon<f64>) -> Value {
    let ring_positions = |ring: &geo_types::LineString<f64>| {
        ring.0.iter().map(|c| vec![c.x, c.y]).collect::<Vec<_>>()
    };
    let mut rings = vec![ring_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_positions));
    Value::Polygon(rings)
}

/// Serializes the loss polygons as a GeoJSON FeatureCollection with `id`,
/// `area_ha`, and `confidence` properties per feature.
pub fn write_loss_polygons(polygons: &[LossPolygon], path: &Path) -> Result<()> {
    let features = polygons
        .iter()
        .map(|p| {
            let mut properties = JsonObject::new();
            properties.insert("id".into(), p.id.to_string().into());
            properties.insert("area_ha".into(), p.area_ha.into());
            properties.insert("confidence".into(), p.confidence.to_string().into());
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(polygon_value(&p.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    std::fs::write(path, collection.to_string())?;
    Ok(())
}
