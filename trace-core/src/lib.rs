/*!
# trace_core

Batch trace-analytics and street-graph engine for a routed-commuter
simulation. Given the routed journeys produced for one simulation run,
this crate reconstructs per-commuter spatial traces, map-matches car
traces onto a street network, and derives:

- modal-share summaries over a boundary,
- a traffic graph (trace-reduced or street-graph-based) with
  per-edge visitor attribution,
- tile-indexed heatmaps keyed by H3 cell.

Commuter generation, the routing engine, OSM/GTFS ingestion, and
plotting are treated as external collaborators and are out of scope.

# Example
```ignore
use trace_core::prelude::*;

let config = Config::from_env()?;
let store = MongoStore::connect(&config.store_uri(), &config.store_database).await?;
let pipeline = Pipeline::new(store, config)?;
let stats = pipeline.run_total_stats("sim-42", &boundary)?;
println!("car share: {}", stats.shares().car);
```
*/

use thiserror::Error;

pub mod cluster;
pub mod config;
pub mod decimate;
pub mod geometry;
pub mod kdtree;
pub mod matching;
pub mod modal;
pub mod pipeline;
pub mod prelude;
pub mod route;
pub mod store;
pub mod streets;
pub mod trace;
pub mod traffic_graph;
pub mod workers;

/// Error type shared by every stage of the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("malformed GraphML: {0}")]
    GraphMl(String),
    #[error("malformed geometry: {0}")]
    Geometry(String),
    #[error("invalid LINESTRING: {0}")]
    InvalidLineString(String),
    #[error("node not found for id: {0}")]
    NodeNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(String),
    #[error("document store error: {0}")]
    Store(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    Bson(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
    #[error("worker pool build error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("thread panicked: {0}")]
    ThreadPanic(String),
}

impl From<geojson::Error> for Error {
    fn from(err: geojson::Error) -> Self {
        Self::GeoJson(err.to_string())
    }
}
