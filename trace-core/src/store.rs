//! Document-store boundary (§1, §6): a narrow async trait the pipeline
//! depends on, plus one MongoDB-backed implementation and a filesystem
//! cache. Storage-format structs (the `*Doc` types below) are kept
//! distinct from the in-memory domain types in `route.rs`/`traffic_graph.rs`
//! so that a collection-schema change never leaks past this module, the
//! same way the teacher's `loaders.rs` keeps GTFS `DataFrame` shapes out
//! of `graph.rs`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bson::doc;
use futures_util::TryStreamExt;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use crate::modal::ModalShares;
use crate::route::RouteResult;
use crate::traffic_graph::{ArcVisitor, TrafficGraph};
use crate::Error;

/// A named place a simulation runs against: boundary, country, and the H3
/// tiles it covers (§6 `places`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub country: String,
    pub bbox: String,
    pub shape: String,
    pub tiles: Vec<u64>,
}

/// One simulation run: a sim-id keyed to the place it was generated for
/// (§6 `simulations`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub sim_id: String,
    pub place_id: String,
}

/// The narrow persistence boundary the pipeline is built against. Every
/// write that replaces a (sim-id, mode) artifact is preceded by a delete
/// to keep runs idempotent (§6, §7 "no partial-success mode").
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_route_results(&self, sim_id: &str) -> Result<Vec<RouteResult>, Error>;
    async fn save_route_results(&self, sim_id: &str, results: &[RouteResult]) -> Result<(), Error>;
    async fn load_place(&self, place_id: &str) -> Result<Option<Place>, Error>;
    async fn save_place(&self, place: &Place) -> Result<(), Error>;
    async fn save_simulation(&self, simulation: &Simulation) -> Result<(), Error>;
    /// Deletes any existing (sim-id, mode) trace-graph and replaces it.
    async fn replace_trace_graph(&self, sim_id: &str, mode: &str, graph: &TrafficGraph) -> Result<(), Error>;
    /// Deletes any existing (sim-id, mode) trace-arcs and replaces them.
    async fn replace_trace_arcs(&self, sim_id: &str, mode: &str, graph: &TrafficGraph) -> Result<(), Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RouteResultDoc {
    sim_id: String,
    #[serde(flatten)]
    result: RouteResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlaceDoc {
    #[serde(flatten)]
    place: Place,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulationDoc {
    #[serde(flatten)]
    simulation: Simulation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TraceGraphDoc {
    sim_id: String,
    mode: String,
    nodes: Vec<[f64; 2]>,
    edges: Vec<[u32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArcVisitorDoc {
    commuter_id: String,
    option_id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TraceArcDoc {
    sim_id: String,
    mode: String,
    from: u32,
    to: u32,
    visitors: Vec<ArcVisitorDoc>,
}

impl From<&ArcVisitor> for ArcVisitorDoc {
    fn from(v: &ArcVisitor) -> Self {
        Self {
            commuter_id: v.commuter_id.clone(),
            option_id: v.option_id,
        }
    }
}

fn trace_graph_doc(sim_id: &str, mode: &str, graph: &TrafficGraph) -> TraceGraphDoc {
    TraceGraphDoc {
        sim_id: sim_id.to_string(),
        mode: mode.to_string(),
        nodes: graph.nodes.iter().map(|p| [p.x(), p.y()]).collect(),
        edges: graph.edges.keys().map(|&(a, b)| [a, b]).collect(),
    }
}

fn trace_arc_docs(sim_id: &str, mode: &str, graph: &TrafficGraph) -> Vec<TraceArcDoc> {
    graph
        .edges
        .iter()
        .map(|(&(from, to), visitors)| TraceArcDoc {
            sim_id: sim_id.to_string(),
            mode: mode.to_string(),
            from,
            to,
            visitors: visitors.iter().map(ArcVisitorDoc::from).collect(),
        })
        .collect()
}

/// MongoDB-backed `Store`: maps each logical collection onto a Mongo
/// collection of the same name (§6).
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connects to the configured document store and selects its database.
    ///
    /// # Errors
    /// Returns an error if the client cannot be constructed from the URI.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, Error> {
        let client = mongodb::Client::with_uri_str(uri).await?;
        Ok(Self {
            database: client.database(database),
        })
    }

    fn route_results(&self) -> Collection<RouteResultDoc> {
        self.database.collection("route-results")
    }

    fn places(&self) -> Collection<PlaceDoc> {
        self.database.collection("places")
    }

    fn simulations(&self) -> Collection<SimulationDoc> {
        self.database.collection("simulations")
    }

    fn trace_graphs(&self) -> Collection<TraceGraphDoc> {
        self.database.collection("trace-graphs")
    }

    fn trace_arcs(&self) -> Collection<TraceArcDoc> {
        self.database.collection("trace-arcs")
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn load_route_results(&self, sim_id: &str) -> Result<Vec<RouteResult>, Error> {
        let cursor = self.route_results().find(doc! { "sim_id": sim_id }).await?;
        let docs: Vec<RouteResultDoc> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(|d| d.result).collect())
    }

    async fn save_route_results(&self, sim_id: &str, results: &[RouteResult]) -> Result<(), Error> {
        if results.is_empty() {
            return Ok(());
        }
        let docs: Vec<RouteResultDoc> = results
            .iter()
            .map(|result| RouteResultDoc {
                sim_id: sim_id.to_string(),
                result: result.clone(),
            })
            .collect();
        self.route_results().insert_many(docs).await?;
        Ok(())
    }

    async fn load_place(&self, place_id: &str) -> Result<Option<Place>, Error> {
        let found = self.places().find_one(doc! { "place_id": place_id }).await?;
        Ok(found.map(|d| d.place))
    }

    async fn save_place(&self, place: &Place) -> Result<(), Error> {
        self.places()
            .delete_many(doc! { "place_id": &place.place_id })
            .await?;
        self.places().insert_one(PlaceDoc { place: place.clone() }).await?;
        Ok(())
    }

    async fn save_simulation(&self, simulation: &Simulation) -> Result<(), Error> {
        self.simulations()
            .delete_many(doc! { "sim_id": &simulation.sim_id })
            .await?;
        self.simulations()
            .insert_one(SimulationDoc {
                simulation: simulation.clone(),
            })
            .await?;
        Ok(())
    }

    async fn replace_trace_graph(&self, sim_id: &str, mode: &str, graph: &TrafficGraph) -> Result<(), Error> {
        self.trace_graphs()
            .delete_many(doc! { "sim_id": sim_id, "mode": mode })
            .await?;
        self.trace_graphs()
            .insert_one(trace_graph_doc(sim_id, mode, graph))
            .await?;
        Ok(())
    }

    async fn replace_trace_arcs(&self, sim_id: &str, mode: &str, graph: &TrafficGraph) -> Result<(), Error> {
        self.trace_arcs()
            .delete_many(doc! { "sim_id": sim_id, "mode": mode })
            .await?;
        let docs = trace_arc_docs(sim_id, mode, graph);
        if !docs.is_empty() {
            self.trace_arcs().insert_many(docs).await?;
        }
        Ok(())
    }
}

/// Filesystem cache consulted before the document store (§6 "Filesystem
/// cache"). Directories are created on demand.
pub struct FsCache {
    cache_dir: PathBuf,
}

impl FsCache {
    #[must_use]
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn journeys_path(&self, sim_id: &str) -> PathBuf {
        self.cache_dir.join("hiveline-journeys").join(format!("{sim_id}.json"))
    }

    fn heatmap_path(&self, sim_id: &str, tag: &str) -> PathBuf {
        self.cache_dir
            .join("modal-heatmaps")
            .join(format!("{sim_id}-{tag}.json"))
    }

    /// Reads cached route-results for `sim_id`, if present.
    ///
    /// # Errors
    /// Returns an error if the cached file exists but cannot be parsed.
    pub fn load_route_results(&self, sim_id: &str) -> Result<Option<Vec<RouteResult>>, Error> {
        read_json_if_present(&self.journeys_path(sim_id))
    }

    /// Writes route-results for `sim_id` through to the cache.
    ///
    /// # Errors
    /// Returns an error if the cache directory cannot be created or the
    /// file cannot be written.
    pub fn save_route_results(&self, sim_id: &str, results: &[RouteResult]) -> Result<(), Error> {
        write_json(&self.journeys_path(sim_id), results)
    }

    /// Writes a per-tile (or total) modal-share heatmap entry to the cache.
    ///
    /// # Errors
    /// Returns an error if the cache directory cannot be created or the
    /// file cannot be written.
    pub fn save_shares(&self, sim_id: &str, tag: &str, shares: &ModalShares) -> Result<(), Error> {
        write_json(&self.heatmap_path(sim_id, tag), shares)
    }
}

fn read_json_if_present<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, Error> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
