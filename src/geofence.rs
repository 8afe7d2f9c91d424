use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use geo::{Contains, Geometry, GeometryCollection, MultiPolygon, Point};
use geojson::GeoJson;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{BoundingBox, Detection};
use crate::error::FirmsError;

pub trait BorderProvider: Send + Sync {
    /// `Ok(None)` when no geometry is known for `country`.
    fn geometry(&self, country: &str) -> Result<Option<MultiPolygon<f64>>, FirmsError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBorders;

impl BorderProvider for NoBorders {
    fn geometry(&self, _country: &str) -> Result<Option<MultiPolygon<f64>>, FirmsError> {
        Ok(None)
    }
}

/// Reads `<dir>/<country_name_in_snake_case>.geojson`.
#[derive(Debug, Clone)]
pub struct GeoJsonBorderProvider {
    dir: Utf8PathBuf,
}

impl GeoJsonBorderProvider {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn path_for(&self, country: &str) -> Utf8PathBuf {
        let name = country.trim().to_lowercase().replace(' ', "_");
        self.dir.join(format!("{name}.geojson"))
    }
}

impl BorderProvider for GeoJsonBorderProvider {
    fn geometry(&self, country: &str) -> Result<Option<MultiPolygon<f64>>, FirmsError> {
        let path = self.path_for(country);
        if !path.as_std_path().exists() {
            debug!(%path, "no border file");
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FirmsError::Filesystem(format!("read {path}: {err}")))?;
        let geometry = parse_border_geojson(&content)?;
        Ok((!geometry.0.is_empty()).then_some(geometry))
    }
}

pub fn parse_border_geojson(content: &str) -> Result<MultiPolygon<f64>, FirmsError> {
    let geojson = content
        .parse::<GeoJson>()
        .map_err(|err| FirmsError::BorderGeometry(err.to_string()))?;
    let collection = GeometryCollection::<f64>::try_from(&geojson)
        .map_err(|err| FirmsError::BorderGeometry(err.to_string()))?;

    let mut polygons = Vec::new();
    for geometry in collection.0 {
        match geometry {
            Geometry::Polygon(polygon) => polygons.push(polygon),
            Geometry::MultiPolygon(multi) => polygons.extend(multi.0),
            _ => {}
        }
    }
    Ok(MultiPolygon::new(polygons))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceFallback {
    /// no border geometry for the country
    GeometryUnavailable,
    /// the polygon test would have removed every row
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceOutcome {
    #[serde(skip)]
    pub detections: Vec<Detection>,
    pub outside_bbox: usize,
    pub outside_border: usize,
    pub strict_applied: bool,
    pub fallback: Option<GeofenceFallback>,
}

impl GeofenceOutcome {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

pub struct Geofence<B: BorderProvider> {
    borders: B,
}

impl<B: BorderProvider> Geofence<B> {
    pub fn new(borders: B) -> Self {
        Self { borders }
    }

    /// Bounding-box filter followed, when `strict` and a country are given, by exact
    /// polygon containment. The polygon stage never empties a non-empty result.
    pub fn apply(
        &self,
        mut detections: Vec<Detection>,
        bbox: &BoundingBox,
        country: Option<&str>,
        strict: bool,
    ) -> GeofenceOutcome {
        let fetched = detections.len();
        detections.retain(|d| bbox.contains(d.longitude, d.latitude));
        let mut outcome = GeofenceOutcome {
            outside_bbox: fetched - detections.len(),
            outside_border: 0,
            strict_applied: false,
            fallback: None,
            detections,
        };
        if outcome.detections.is_empty() {
            warn!(%bbox, "no points within the bounding box");
            return outcome;
        }

        let Some(country) = country.filter(|_| strict) else {
            return outcome;
        };

        let geometry = match self.borders.geometry(country) {
            Ok(Some(geometry)) => geometry,
            Ok(None) => {
                warn!(country, "no border geometry, keeping bounding-box result");
                outcome.fallback = Some(GeofenceFallback::GeometryUnavailable);
                return outcome;
            }
            Err(err) => {
                warn!(country, error = %err, "could not load border geometry, keeping bounding-box result");
                outcome.fallback = Some(GeofenceFallback::GeometryUnavailable);
                return outcome;
            }
        };

        let inside = outcome
            .detections
            .iter()
            .filter(|d| geometry.contains(&Point::new(d.longitude, d.latitude)))
            .cloned()
            .collect::<Vec<_>>();
        if inside.is_empty() {
            warn!(country, "strict filtering would remove every point, keeping bounding-box result");
            outcome.fallback = Some(GeofenceFallback::Exhausted);
            return outcome;
        }

        outcome.outside_border = outcome.detections.len() - inside.len();
        outcome.strict_applied = true;
        outcome.detections = inside;
        info!(
            country,
            kept = outcome.detections.len(),
            removed = outcome.outside_border,
            "strict border filtering applied"
        );
        outcome
    }
}
