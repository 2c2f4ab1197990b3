//! Convenience re-exports for downstream crates (mirrors `cascade_core`'s
//! own `prelude` module).

pub use crate::cluster::{dbscan, DbscanParams, Membership};
pub use crate::config::Config;
pub use crate::decimate::decimate;
pub use crate::geometry::{
    cell_for_point, cell_polygon, geo_distance_m, parse_boundary_geojson, planar_distance_sq, PolyBounds,
};
pub use crate::kdtree::SpatialIndex;
pub use crate::matching::match_trace;
pub use crate::modal::{trace_stats, JourneyStats, ModalShares};
pub use crate::pipeline::{Pipeline, RunMetrics};
pub use crate::route::{
    Leg, ModalCategory, RouteOption, RouteResult, Stopover, TransportMode, TravellerDescriptor,
};
pub use crate::store::{FsCache, MongoStore, Place, Simulation, Store};
pub use crate::streets::StreetGraph;
pub use crate::trace::{self, Trace, TraceElement};
pub use crate::traffic_graph::{self, ArcVisitor, LabelledTrace, MatchedPath, TrafficGraph};
pub use crate::workers::WorkerPool;
pub use crate::Error;
