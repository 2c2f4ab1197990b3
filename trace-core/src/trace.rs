//! Per-commuter spatial/temporal trace model: extraction from a selected
//! route option, boundary filtering, downsampling, and mode-splitting
//! (§3, §4.B).

use geo::Point;

use crate::geometry::PolyBounds;
use crate::route::{Leg, RouteOption, TransportMode};

/// One point along a commuter's journey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceElement {
    pub point: Point<f64>,
    pub timestamp: u64,
    pub mode: TransportMode,
    pub leg_start: bool,
}

/// An ordered sequence of trace elements. A trace with fewer than two
/// elements contributes zero to any statistic (§3).
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub elements: Vec<TraceElement>,
}

impl Trace {
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Degenerate traces (fewer than two elements) contribute nothing to
    /// any downstream statistic.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.elements.len() < 2
    }
}

/// Decodes a Google encoded-polyline string (precision 1e-5) into a
/// sequence of lon/lat points. Returns `None` on malformed input — callers
/// treat that the same as "no polyline present" (§4.B, §7).
#[must_use]
pub fn decode_polyline(encoded: &str) -> Option<Vec<Point<f64>>> {
    let bytes = encoded.as_bytes();
    let mut index = 0usize;
    let mut lat = 0i64;
    let mut lng = 0i64;
    let mut points = Vec::new();

    while index < bytes.len() {
        let lat_delta = decode_varint(bytes, &mut index)?;
        lat += lat_delta;
        let lng_delta = decode_varint(bytes, &mut index)?;
        lng += lng_delta;

        points.push(Point::new(lng as f64 / 1e5, lat as f64 / 1e5));
    }

    if points.is_empty() {
        None
    } else {
        Some(points)
    }
}

fn decode_varint(bytes: &[u8], index: &mut usize) -> Option<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(*index)?;
        *index += 1;
        let chunk = i64::from(byte.wrapping_sub(63) & 0x1f);
        result |= chunk << shift;
        shift += 5;
        if byte.wrapping_sub(63) & 0x20 == 0 {
            break;
        }
    }

    Some(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}

fn extract_leg(leg: &Leg) -> Vec<TraceElement> {
    if let Some(points) = leg.polyline.as_deref().and_then(decode_polyline) {
        let n = points.len();
        let span = leg.arrival.saturating_sub(leg.departure);
        return points
            .into_iter()
            .enumerate()
            .map(|(i, point)| {
                let frac = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
                TraceElement {
                    point,
                    timestamp: leg.departure + (frac * span as f64) as u64,
                    mode: leg.mode,
                    leg_start: i == 0,
                }
            })
            .collect();
    }

    if !leg.stopovers.is_empty() {
        let n = leg.stopovers.len();
        return leg
            .stopovers
            .iter()
            .enumerate()
            .map(|(i, stop)| {
                let frac = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
                let timestamp = stop.timestamp().unwrap_or_else(|| {
                    leg.departure + (frac * (leg.arrival.saturating_sub(leg.departure)) as f64) as u64
                });
                TraceElement {
                    point: stop.location,
                    timestamp,
                    mode: leg.mode,
                    leg_start: i == 0,
                }
            })
            .collect();
    }

    vec![
        TraceElement {
            point: leg.origin,
            timestamp: leg.departure,
            mode: leg.mode,
            leg_start: true,
        },
        TraceElement {
            point: leg.destination,
            timestamp: leg.arrival,
            mode: leg.mode,
            leg_start: false,
        },
    ]
}

/// Builds a trace from a selected route option, per §4.B.
#[must_use]
pub fn extract(option: &RouteOption) -> Trace {
    let elements = option.legs.iter().flat_map(extract_leg).collect();
    Trace { elements }
}

/// Keeps an element if it is inside the boundary, or either immediate
/// neighbour is — preserving entries/exits through the boundary. A dropped
/// element's leg-start flag carries forward to the next kept element
/// (§4.B).
#[must_use]
pub fn filter_by_boundary(trace: &Trace, bounds: &PolyBounds) -> Trace {
    let n = trace.elements.len();
    let contained: Vec<bool> = trace
        .elements
        .iter()
        .map(|e| bounds.contains(e.point))
        .collect();

    let keep = |i: usize| -> bool {
        contained[i]
            || (i > 0 && contained[i - 1])
            || (i + 1 < n && contained[i + 1])
    };

    let mut elements = Vec::new();
    let mut carried_leg_start = false;

    for (i, element) in trace.elements.iter().enumerate() {
        if keep(i) {
            let mut kept = *element;
            if carried_leg_start {
                kept.leg_start = true;
                carried_leg_start = false;
            }
            elements.push(kept);
        } else if element.leg_start {
            carried_leg_start = true;
        }
    }

    Trace { elements }
}

/// Keeps all leg-start elements; thins non-leg-start elements to
/// approximately `n` using a running-budget walk (§4.B). If the trace
/// already has `n` or fewer non-leg-start elements, it is returned
/// unchanged.
#[must_use]
pub fn downsample(trace: &Trace, n: usize) -> Trace {
    let k = trace.elements.iter().filter(|e| !e.leg_start).count();
    if k <= n {
        return trace.clone();
    }

    let ratio = n as f64 / k as f64;
    let mut budget = 0.0f64;
    let mut elements = Vec::new();

    for element in &trace.elements {
        if element.leg_start {
            elements.push(*element);
            continue;
        }
        budget += ratio;
        if budget >= 1.0 {
            elements.push(*element);
            budget -= 1.0;
        }
    }

    Trace { elements }
}

/// Splits a trace into maximal runs of consecutive elements whose mode
/// equals `mode`. Empty splits are dropped.
#[must_use]
pub fn split_by_mode(trace: &Trace, mode: TransportMode) -> Vec<Trace> {
    let mut runs = Vec::new();
    let mut current: Vec<TraceElement> = Vec::new();

    for element in &trace.elements {
        if element.mode == mode {
            current.push(*element);
        } else if !current.is_empty() {
            runs.push(Trace {
                elements: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        runs.push(Trace { elements: current });
    }

    runs
}
