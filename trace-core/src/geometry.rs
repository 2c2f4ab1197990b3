//! Geometry primitives: points, polygons, bounds, and H3 cell boundaries.
//!
//! Planar distance and polygon containment are deliberately thin wrappers
//! over the `geo` crate rather than a hand-rolled scanline — the same
//! dependency the street-graph loader and map-matcher already use for
//! every other spatial query in this crate.

use geo::{Contains, Coord, Distance, Haversine, LineString, Point, Polygon, Rect};
use geojson::{GeoJson, Geometry as GeoJsonGeometry, Value};
use h3o::{CellIndex, LatLng};

/// Squared planar (Euclidean, lon/lat-as-cartesian) distance between two points.
/// Used where only relative ordering matters (nearest-neighbour comparisons,
/// epsilon thresholds on small local neighbourhoods) and the cost of a
/// square root would be wasted.
#[must_use]
pub fn planar_distance_sq(a: Point<f64>, b: Point<f64>) -> f64 {
    let dx = a.x() - b.x();
    let dy = a.y() - b.y();
    dx * dx + dy * dy
}

/// Great-circle distance between two lon/lat points, in metres.
#[must_use]
pub fn geo_distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine::distance(a, b)
}

/// A polygon boundary paired with its precomputed axis-aligned bounding box,
/// used as a fast reject before the full containment test.
///
/// Invariant: `polygon.contains(p)` implies `bbox.contains(p)` — the bbox is
/// derived directly from the polygon's own bounding rectangle, so this holds
/// by construction.
#[derive(Debug, Clone)]
pub struct PolyBounds {
    polygon: Polygon<f64>,
    bbox: Rect<f64>,
}

impl PolyBounds {
    /// Builds a `PolyBounds` from a polygon, deriving its bounding box.
    ///
    /// Returns `None` for a degenerate polygon with no bounding rectangle
    /// (an empty exterior ring).
    #[must_use]
    pub fn new(polygon: Polygon<f64>) -> Option<Self> {
        let bbox = geo::BoundingRect::bounding_rect(&polygon)?;
        Some(Self { polygon, bbox })
    }

    #[must_use]
    pub const fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    #[must_use]
    pub const fn bbox(&self) -> &Rect<f64> {
        &self.bbox
    }

    /// Bbox pre-check followed by full ray-casting containment, per §4.A.
    #[must_use]
    pub fn contains(&self, point: Point<f64>) -> bool {
        self.bbox.contains(&point) && self.polygon.contains(&point)
    }
}

/// Converts an H3 cell (any resolution) to its boundary polygon: the cell's
/// boundary vertices in order, with the ring closed by duplicating the first
/// vertex.
#[must_use]
pub fn cell_polygon(cell: CellIndex) -> Polygon<f64> {
    let boundary = cell.boundary();
    let mut coords: Vec<Coord<f64>> = boundary
        .iter()
        .map(|ll: &LatLng| Coord {
            x: ll.lng(),
            y: ll.lat(),
        })
        .collect();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    Polygon::new(LineString(coords), vec![])
}

/// Looks up the resolution-8 H3 cell containing a lon/lat point.
///
/// # Errors
/// Returns an error if the coordinates are not finite (`h3o` rejects NaN
/// and out-of-range latitude/longitude).
pub fn cell_for_point(point: Point<f64>) -> Result<CellIndex, crate::Error> {
    let ll = LatLng::new(point.y(), point.x())
        .map_err(|e| crate::Error::Geometry(format!("invalid lon/lat for H3 lookup: {e}")))?;
    Ok(ll.to_cell(h3o::Resolution::Eight))
}

/// Parses a GeoJSON document (a bare geometry, a feature, or a feature
/// collection) into a boundary, taking the first `Polygon` or
/// `MultiPolygon` geometry found (§6 "Inputs"). The conversion is done by
/// hand from GeoJSON `Value` coordinates rather than via an optional
/// geo-types conversion feature, matching the teacher crate's own manual
/// coordinate-array handling in `itinerary/segment.rs`.
///
/// # Errors
/// Returns an error if the document is malformed, contains no polygonal
/// geometry, or the resulting polygon is degenerate.
pub fn parse_boundary_geojson(json: &str) -> Result<PolyBounds, crate::Error> {
    let parsed: GeoJson = json.parse()?;
    let geometry = first_geometry(&parsed)
        .ok_or_else(|| crate::Error::GeoJson("no geometry found in document".into()))?;
    let polygon = polygon_from_value(&geometry.value)?;
    PolyBounds::new(polygon).ok_or_else(|| crate::Error::GeoJson("degenerate boundary polygon".into()))
}

fn first_geometry(doc: &GeoJson) -> Option<&GeoJsonGeometry> {
    match doc {
        GeoJson::Geometry(g) => Some(g),
        GeoJson::Feature(f) => f.geometry.as_ref(),
        GeoJson::FeatureCollection(fc) => fc.features.iter().find_map(|f| f.geometry.as_ref()),
    }
}

fn polygon_from_value(value: &Value) -> Result<Polygon<f64>, crate::Error> {
    match value {
        Value::Polygon(rings) => polygon_from_rings(rings),
        Value::MultiPolygon(polygons) => polygons
            .first()
            .ok_or_else(|| crate::Error::GeoJson("empty MultiPolygon".into()))
            .and_then(|rings| polygon_from_rings(rings)),
        other => Err(crate::Error::GeoJson(format!(
            "expected Polygon or MultiPolygon geometry, got {other:?}"
        ))),
    }
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, crate::Error> {
    let mut rings = rings.iter();
    let exterior = rings
        .next()
        .ok_or_else(|| crate::Error::GeoJson("polygon with no rings".into()))?;
    let interiors: Vec<LineString<f64>> = rings.map(|r| ring_to_linestring(r)).collect();
    Ok(Polygon::new(ring_to_linestring(exterior), interiors))
}

fn ring_to_linestring(ring: &[Vec<f64>]) -> LineString<f64> {
    LineString(
        ring.iter()
            .map(|pos| Coord {
                x: pos.first().copied().unwrap_or(0.0),
                y: pos.get(1).copied().unwrap_or(0.0),
            })
            .collect(),
    )
}
