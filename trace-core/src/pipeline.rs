//! Pipeline orchestration (§2b, §4.J): load → select → extract →
//! filter/tile/match → emit artifacts.
//!
//! The library stays synchronous at its public boundary — store calls are
//! driven from a small current-thread `tokio` runtime owned by the
//! pipeline, so embedding callers are never forced into async themselves
//! (§2a "Async store I/O").

use std::sync::Arc;

use ahash::AHashMap;
use geo::Point;
use h3o::CellIndex;
use tracing::{info, warn};

use crate::config::Config;
use crate::geometry::{cell_for_point, cell_polygon, PolyBounds};
use crate::matching::match_trace;
use crate::modal::{trace_stats, JourneyStats};
use crate::route::{RouteResult, TransportMode};
use crate::store::{Place, Store};
use crate::streets::StreetGraph;
use crate::trace::{self, Trace};
use crate::traffic_graph::{self, LabelledTrace, MatchedPath, TrafficGraph};
use crate::workers::WorkerPool;
use crate::Error;

/// Downsample target for the street-graph traffic variant (§4.H).
const STREET_GRAPH_DOWNSAMPLE: usize = 100;

/// Counters recorded over the course of one run (§2b "Graceful per-run
/// metrics"), logged at `info` level when the run completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMetrics {
    pub traces_extracted: usize,
    pub traces_skipped: usize,
    pub bridges_used: usize,
}

impl RunMetrics {
    fn log(&self, sim_id: &str) {
        info!(
            sim_id,
            traces_extracted = self.traces_extracted,
            traces_skipped = self.traces_skipped,
            bridges_used = self.bridges_used,
            "run complete"
        );
    }
}

/// One selected commuter trace, labelled for downstream attribution.
struct SelectedTrace {
    commuter_id: String,
    option_id: usize,
    trace: Trace,
}

/// Orchestrates one pipeline run against a configured store and worker
/// pool.
pub struct Pipeline<S: Store> {
    store: Arc<S>,
    config: Config,
    workers: WorkerPool,
    runtime: tokio::runtime::Runtime,
}

impl<S: Store> Pipeline<S> {
    /// Builds a pipeline, opening a dedicated current-thread runtime for
    /// store I/O (§5 "Shared resources": the store client is opened at
    /// pipeline construction and lives for the pipeline's lifetime).
    ///
    /// # Errors
    /// Returns an error if the worker pool or runtime fails to start.
    pub fn new(store: S, config: Config) -> Result<Self, Error> {
        let workers = WorkerPool::new(config.worker_count)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::ThreadPanic(e.to_string()))?;
        Ok(Self {
            store: Arc::new(store),
            config,
            workers,
            runtime,
        })
    }

    /// Loads route-results for `sim_id`: filesystem cache first, the
    /// document store otherwise, writing through to the cache on a miss
    /// (§4.J step 1, §6 "Filesystem cache").
    fn load_route_results(&self, sim_id: &str) -> Result<Vec<RouteResult>, Error> {
        let cache = crate::store::FsCache::new(self.config.cache_dir());
        if let Some(cached) = cache.load_route_results(sim_id)? {
            return Ok(cached);
        }
        let results = self.runtime.block_on(self.store.load_route_results(sim_id))?;
        cache.save_route_results(sim_id, &results)?;
        Ok(results)
    }

    /// Selects one option per result and extracts a trace, logging and
    /// counting every per-trace degeneracy rather than failing the run
    /// (§4.J steps 2-3, §7).
    fn selected_traces(&self, results: &[RouteResult], metrics: &mut RunMetrics) -> Vec<SelectedTrace> {
        results
            .iter()
            .filter_map(|result| {
                let Some(option) = result.selected_option() else {
                    metrics.traces_skipped += 1;
                    return None;
                };
                let option_id = result
                    .options
                    .iter()
                    .position(|o| std::ptr::eq(o, option))
                    .unwrap_or(0);

                for leg in &option.legs {
                    if matches!(leg.mode, TransportMode::Other) {
                        warn!(commuter_id = %result.commuter_id, "unknown transport mode");
                    }
                }

                let extracted = trace::extract(option);
                if extracted.is_degenerate() {
                    metrics.traces_skipped += 1;
                    return None;
                }
                metrics.traces_extracted += 1;
                Some(SelectedTrace {
                    commuter_id: result.commuter_id.clone(),
                    option_id,
                    trace: extracted,
                })
            })
            .collect()
    }

    /// Computes total modal-share statistics for `sim_id` over a loaded
    /// boundary (§4.J "total stats over a loaded boundary").
    ///
    /// # Errors
    /// Returns an error if loading route-results fails.
    pub fn run_total_stats(&self, sim_id: &str, bounds: &PolyBounds) -> Result<JourneyStats, Error> {
        let mut metrics = RunMetrics::default();
        let results = self.load_route_results(sim_id)?;
        let selected = self.selected_traces(&results, &mut metrics);

        let traces: Vec<&Trace> = selected.iter().map(|s| &s.trace).collect();
        let filtered = self.workers.map_indexed(&traces, |trace, _| trace::filter_by_boundary(trace, bounds));

        let stats: JourneyStats = filtered.iter().map(trace_stats).sum();
        metrics.log(sim_id);
        Ok(stats)
    }

    /// Writes each tile's journey stats through to the filesystem cache as
    /// modal shares, tagged by tile id (§6 "auxiliary tile-indexed
    /// heatmaps", `<cache>/modal-heatmaps/<sim-id>-<tag>.json`).
    ///
    /// # Errors
    /// Returns an error if the cache directory cannot be created or a
    /// file cannot be written.
    fn cache_tile_shares(&self, sim_id: &str, totals: &AHashMap<u64, JourneyStats>) -> Result<(), Error> {
        let cache = crate::store::FsCache::new(self.config.cache_dir());
        for (tile_id, stats) in totals {
            cache.save_shares(sim_id, &tile_id.to_string(), &stats.shares())?;
        }
        Ok(())
    }

    /// Computes per-tile modal-share statistics keyed by resolution-8 H3
    /// cell of each trace's origin element (§4.J "per-tile stats... by
    /// origin H3 cell at resolution 8").
    ///
    /// # Errors
    /// Returns an error if loading route-results or writing the heatmap
    /// cache fails.
    pub fn run_tile_stats(&self, sim_id: &str) -> Result<AHashMap<u64, JourneyStats>, Error> {
        let mut metrics = RunMetrics::default();
        let results = self.load_route_results(sim_id)?;
        let selected = self.selected_traces(&results, &mut metrics);

        let mut totals: AHashMap<u64, JourneyStats> = AHashMap::new();
        for entry in &selected {
            let Some(first) = entry.trace.elements.first() else {
                continue;
            };
            let Ok(cell) = cell_for_point(first.point) else {
                continue;
            };
            let stats = trace_stats(&entry.trace);
            let slot = totals.entry(u64::from(cell)).or_default();
            *slot = *slot + stats;
        }

        self.cache_tile_shares(sim_id, &totals)?;
        metrics.log(sim_id);
        Ok(totals)
    }

    /// Computes per-tile modal-share statistics by bucketing each trace's
    /// origin against a place's pre-registered H3 tile set, rather than
    /// recomputing the cell algorithmically (§4.J "per-tile stats... by
    /// trace-derived tiles"). A trace whose origin falls outside every
    /// registered tile contributes nothing.
    ///
    /// # Errors
    /// Returns an error if loading route-results or writing the heatmap
    /// cache fails.
    pub fn run_tile_stats_by_place_tiles(
        &self,
        sim_id: &str,
        place: &Place,
    ) -> Result<AHashMap<u64, JourneyStats>, Error> {
        let mut metrics = RunMetrics::default();
        let results = self.load_route_results(sim_id)?;
        let selected = self.selected_traces(&results, &mut metrics);

        let tiles: Vec<(u64, PolyBounds)> = place
            .tiles
            .iter()
            .filter_map(|&cell_id| {
                let cell = CellIndex::try_from(cell_id).ok()?;
                let bounds = PolyBounds::new(cell_polygon(cell))?;
                Some((cell_id, bounds))
            })
            .collect();

        let mut totals: AHashMap<u64, JourneyStats> = AHashMap::new();
        for entry in &selected {
            let Some(first) = entry.trace.elements.first() else {
                continue;
            };
            let Some(&(tile_id, _)) = tiles.iter().find(|(_, bounds)| bounds.contains(first.point)) else {
                continue;
            };
            let stats = trace_stats(&entry.trace);
            let slot = totals.entry(tile_id).or_default();
            *slot = *slot + stats;
        }

        self.cache_tile_shares(sim_id, &totals)?;
        metrics.log(sim_id);
        Ok(totals)
    }

    /// Builds the reduced-trace traffic graph over car traces, decimates
    /// it to its flow-equivalent form, and replaces the stored artifact
    /// for (sim_id, mode) (§4.H reduced-trace variant, §4.I, §6 delete-
    /// then-write).
    ///
    /// # Errors
    /// Returns an error if loading route-results or writing the artifact
    /// fails.
    pub fn run_reduced_traffic_graph(&self, sim_id: &str, mode: &str) -> Result<TrafficGraph, Error> {
        let mut metrics = RunMetrics::default();
        let results = self.load_route_results(sim_id)?;
        let selected = self.selected_traces(&results, &mut metrics);

        let mut labelled: Vec<(String, usize, Trace)> = Vec::new();
        for entry in &selected {
            for car_trace in trace::split_by_mode(&entry.trace, TransportMode::Car) {
                labelled.push((entry.commuter_id.clone(), entry.option_id, car_trace));
            }
        }

        let views: Vec<LabelledTrace<'_>> = labelled
            .iter()
            .map(|(commuter_id, option_id, trace)| LabelledTrace {
                commuter_id,
                option_id: *option_id,
                trace,
            })
            .collect();

        let raw = traffic_graph::build_reduced(&views);
        let graph = crate::decimate::decimate(&raw);

        self.runtime.block_on(self.store.replace_trace_graph(sim_id, mode, &graph))?;
        self.runtime.block_on(self.store.replace_trace_arcs(sim_id, mode, &graph))?;
        metrics.log(sim_id);
        Ok(graph)
    }

    /// Builds the street-graph traffic graph by map-matching car traces
    /// against `street_graph`, decimates it, and replaces the stored
    /// artifact for (sim_id, mode) (§4.H street-graph variant, §4.I,
    /// §6 delete-then-write).
    ///
    /// # Errors
    /// Returns an error if loading route-results or writing the artifact
    /// fails.
    pub fn run_street_traffic_graph(
        &self,
        sim_id: &str,
        mode: &str,
        street_graph: &StreetGraph,
    ) -> Result<TrafficGraph, Error> {
        let mut metrics = RunMetrics::default();
        let results = self.load_route_results(sim_id)?;
        let selected = self.selected_traces(&results, &mut metrics);

        let mut labelled: Vec<(String, usize, Trace)> = Vec::new();
        for entry in &selected {
            for car_trace in trace::split_by_mode(&entry.trace, TransportMode::Car) {
                let downsampled = trace::downsample(&car_trace, STREET_GRAPH_DOWNSAMPLE);
                labelled.push((entry.commuter_id.clone(), entry.option_id, downsampled));
            }
        }

        let matched: Vec<(String, usize, Vec<u32>)> = self.workers.map_indexed(&labelled, |(commuter_id, option_id, trace), worker_index| {
            let path = match_trace(trace, street_graph, worker_index);
            (commuter_id.clone(), *option_id, path)
        });

        let views: Vec<MatchedPath<'_>> = matched
            .iter()
            .map(|(commuter_id, option_id, path)| MatchedPath {
                commuter_id,
                option_id: *option_id,
                path: path.clone(),
            })
            .collect();

        let raw = traffic_graph::build_street_graph(&views, street_graph);
        let graph = crate::decimate::decimate(&raw);

        self.runtime.block_on(self.store.replace_trace_graph(sim_id, mode, &graph))?;
        self.runtime.block_on(self.store.replace_trace_arcs(sim_id, mode, &graph))?;
        metrics.log(sim_id);
        Ok(graph)
    }

    /// Loads a named place's boundary from the store, if present.
    ///
    /// # Errors
    /// Returns an error if the store call fails.
    pub fn load_place(&self, place_id: &str) -> Result<Option<Place>, Error> {
        self.runtime.block_on(self.store.load_place(place_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{Leg, RouteOption, TravellerDescriptor};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        results: Mutex<AHashMap<String, Vec<RouteResult>>>,
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn load_route_results(&self, sim_id: &str) -> Result<Vec<RouteResult>, Error> {
            Ok(self.results.lock().unwrap().get(sim_id).cloned().unwrap_or_default())
        }
        async fn save_route_results(&self, sim_id: &str, results: &[RouteResult]) -> Result<(), Error> {
            self.results.lock().unwrap().insert(sim_id.to_string(), results.to_vec());
            Ok(())
        }
        async fn load_place(&self, _place_id: &str) -> Result<Option<Place>, Error> {
            Ok(None)
        }
        async fn save_place(&self, _place: &Place) -> Result<(), Error> {
            Ok(())
        }
        async fn save_simulation(&self, _simulation: &crate::store::Simulation) -> Result<(), Error> {
            Ok(())
        }
        async fn replace_trace_graph(&self, _sim_id: &str, _mode: &str, _graph: &TrafficGraph) -> Result<(), Error> {
            Ok(())
        }
        async fn replace_trace_arcs(&self, _sim_id: &str, _mode: &str, _graph: &TrafficGraph) -> Result<(), Error> {
            Ok(())
        }
    }

    fn walking_result(commuter_id: &str) -> RouteResult {
        RouteResult {
            commuter_id: commuter_id.to_string(),
            traveller: TravellerDescriptor {
                age_bucket: "18-30".into(),
                employment: "employed".into(),
                vehicle_usage: None,
            },
            options: vec![RouteOption {
                origin: Point::new(0.0, 0.0),
                destination: Point::new(0.0, 0.002),
                departure: 0,
                legs: vec![Leg {
                    mode: TransportMode::Walking,
                    origin: Point::new(0.0, 0.0),
                    destination: Point::new(0.0, 0.002),
                    departure: 0,
                    arrival: 100,
                    departure_delay_s: None,
                    arrival_delay_s: None,
                    stopovers: vec![],
                    polyline: None,
                }],
            }],
        }
    }

    fn test_config(project_root: std::path::PathBuf) -> Config {
        Config {
            store_user: String::new(),
            store_password: String::new(),
            store_host: String::new(),
            store_database: String::new(),
            project_root,
            worker_count: 2,
        }
    }

    #[test]
    fn total_stats_accounts_walking_journey() {
        let dir = std::env::temp_dir().join(format!("trace-core-pipeline-{}", std::process::id()));
        let store = MemoryStore::default();
        store
            .results
            .lock()
            .unwrap()
            .insert("sim-1".to_string(), vec![walking_result("c1")]);

        let pipeline = Pipeline::new(store, test_config(dir.clone())).unwrap();
        let bounds = PolyBounds::new(geo::Polygon::new(
            geo::LineString(vec![
                geo::Coord { x: -1.0, y: -1.0 },
                geo::Coord { x: 1.0, y: -1.0 },
                geo::Coord { x: 1.0, y: 1.0 },
                geo::Coord { x: -1.0, y: 1.0 },
                geo::Coord { x: -1.0, y: -1.0 },
            ]),
            vec![],
        ))
        .unwrap();

        let stats = pipeline.run_total_stats("sim-1", &bounds).unwrap();
        assert!(stats.walk_passengers > 0.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    fn walking_result_at(commuter_id: &str, origin: Point<f64>, destination: Point<f64>) -> RouteResult {
        let mut result = walking_result(commuter_id);
        let option = &mut result.options[0];
        option.origin = origin;
        option.destination = destination;
        let leg = &mut option.legs[0];
        leg.origin = origin;
        leg.destination = destination;
        result
    }

    #[test]
    fn tile_stats_bucket_by_origin_cell() {
        let dir = std::env::temp_dir().join(format!("trace-core-pipeline-tiles-{}", std::process::id()));
        let store = MemoryStore::default();
        store.results.lock().unwrap().insert(
            "sim-1".to_string(),
            vec![
                walking_result_at("c1", Point::new(0.0, 0.0), Point::new(0.0, 0.002)),
                walking_result_at("c2", Point::new(40.0, 40.0), Point::new(40.0, 40.002)),
            ],
        );

        let pipeline = Pipeline::new(store, test_config(dir.clone())).unwrap();
        let totals = pipeline.run_tile_stats("sim-1").unwrap();

        assert_eq!(totals.len(), 2);
        assert!(totals.values().all(|stats| stats.walk_passengers > 0.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn tile_stats_by_place_tiles_skips_origins_outside_every_tile() {
        let dir = std::env::temp_dir().join(format!("trace-core-pipeline-place-tiles-{}", std::process::id()));
        let store = MemoryStore::default();
        let origin = Point::new(0.0005, 0.0005);
        store.results.lock().unwrap().insert(
            "sim-1".to_string(),
            vec![
                walking_result_at("c1", origin, Point::new(0.0, 0.002)),
                walking_result_at("c2", Point::new(40.0, 40.0), Point::new(40.0, 40.002)),
            ],
        );

        let registered_tile = cell_for_point(origin).unwrap();
        let place = Place {
            place_id: "p1".to_string(),
            name: "test place".to_string(),
            country: "XX".to_string(),
            bbox: String::new(),
            shape: String::new(),
            tiles: vec![u64::from(registered_tile)],
        };

        let pipeline = Pipeline::new(store, test_config(dir.clone())).unwrap();
        let totals = pipeline.run_tile_stats_by_place_tiles("sim-1", &place).unwrap();

        assert_eq!(totals.len(), 1);
        assert_eq!(totals.get(&u64::from(registered_tile)).unwrap().walk_passengers, 1.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn result_with_no_qualifying_option_is_skipped() {
        let dir = std::env::temp_dir().join(format!("trace-core-pipeline-skip-{}", std::process::id()));
        let mut result = walking_result("c1");
        result.options.clear();
        let store = MemoryStore::default();
        store.results.lock().unwrap().insert("sim-1".to_string(), vec![result]);

        let pipeline = Pipeline::new(store, test_config(dir.clone())).unwrap();
        let mut metrics = RunMetrics::default();
        let results = pipeline.load_route_results("sim-1").unwrap();
        let selected = pipeline.selected_traces(&results, &mut metrics);
        assert!(selected.is_empty());
        assert_eq!(metrics.traces_skipped, 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
