use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use geo::{Coord, LineString, Point, Polygon};
use trace_core::prelude::*;

const STREET_NETWORK_SINGLE: &str = r#"<?xml version="1.0"?>
<graphml>
  <graph edgedefault="undirected">
    <node id="n0"><data key="d4">52.5200</data><data key="d5">13.4050</data></node>
    <node id="n1"><data key="d4">52.5205</data><data key="d5">13.4060</data></node>
    <node id="n2"><data key="d4">52.5210</data><data key="d5">13.4070</data></node>
    <edge source="n0" target="n1"><data key="d16">85.0</data></edge>
    <edge source="n1" target="n2"><data key="d16">90.0</data></edge>
  </graph>
</graphml>"#;

#[derive(Default)]
struct MemoryStore {
    results: Mutex<HashMap<String, Vec<RouteResult>>>,
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

    async fn save_simulation(&self, _simulation: &Simulation) -> Result<(), Error> {
        Ok(())
    }

    async fn replace_trace_graph(&self, _sim_id: &str, _mode: &str, _graph: &TrafficGraph) -> Result<(), Error> {
        Ok(())
    }

    async fn replace_trace_arcs(&self, _sim_id: &str, _mode: &str, _graph: &TrafficGraph) -> Result<(), Error> {
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        store_user: String::new(),
        store_password: String::new(),
        store_host: String::new(),
        store_database: String::new(),
        project_root: std::env::temp_dir().join(format!("trace-core-integration-{}", std::process::id())),
        worker_count: 4,
    }
}

fn car_commuter(id: &str) -> RouteResult {
    RouteResult {
        commuter_id: id.to_string(),
        traveller: TravellerDescriptor {
            age_bucket: "30-45".into(),
            employment: "employed".into(),
            vehicle_usage: Some("owns".into()),
        },
        options: vec![RouteOption {
            origin: Point::new(13.4050, 52.5200),
            destination: Point::new(13.4070, 52.5210),
            departure: 0,
            legs: vec![Leg {
                mode: TransportMode::Car,
                origin: Point::new(13.4050, 52.5200),
                destination: Point::new(13.4070, 52.5210),
                departure: 0,
                arrival: 300,
                departure_delay_s: None,
                arrival_delay_s: None,
                stopovers: vec![],
                polyline: None,
            }],
        }],
    }
}

fn bus_commuter(id: &str) -> RouteResult {
    RouteResult {
        commuter_id: id.to_string(),
        traveller: TravellerDescriptor {
            age_bucket: "18-30".into(),
            employment: "student".into(),
            vehicle_usage: None,
        },
        options: vec![RouteOption {
            origin: Point::new(13.4050, 52.5200),
            destination: Point::new(13.4070, 52.5210),
            departure: 0,
            legs: vec![Leg {
                mode: TransportMode::Bus,
                origin: Point::new(13.4050, 52.5200),
                destination: Point::new(13.4070, 52.5210),
                departure: 0,
                arrival: 600,
                departure_delay_s: None,
                arrival_delay_s: Some(30),
                stopovers: vec![Stopover {
                    location: Point::new(13.4060, 52.5205),
                    departure: Some(300),
                    arrival: Some(290),
                }],
                polyline: None,
            }],
        }],
    }
}

fn world_boundary() -> PolyBounds {
    PolyBounds::new(Polygon::new(
        LineString(vec![
            Coord { x: 13.0, y: 52.0 },
            Coord { x: 14.0, y: 52.0 },
            Coord { x: 14.0, y: 53.0 },
            Coord { x: 13.0, y: 53.0 },
            Coord { x: 13.0, y: 52.0 },
        ]),
        vec![],
    ))
    .unwrap()
}

#[test]
fn total_stats_mix_car_and_transit_commuters() {
    let store = MemoryStore::default();
    store.results.lock().unwrap().insert(
        "sim-mixed".to_string(),
        vec![car_commuter("c1"), bus_commuter("c2")],
    );

    let pipeline = Pipeline::new(store, test_config()).unwrap();
    let stats = pipeline.run_total_stats("sim-mixed", &world_boundary()).unwrap();

    assert!(stats.car_meters > 0.0);
    assert!(stats.bus_meters > 0.0);

    let shares = stats.shares();
    let total = shares.car + shares.rail + shares.bus + shares.walk;
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn street_graph_traffic_variant_produces_edges_for_car_trips() {
    let store = MemoryStore::default();
    store
        .results
        .lock()
        .unwrap()
        .insert("sim-car".to_string(), vec![car_commuter("c1"), bus_commuter("c2")]);

    let pipeline = Pipeline::new(store, test_config()).unwrap();
    let street_graph = StreetGraph::load(STREET_NETWORK_SINGLE, 4).unwrap();

    let traffic = pipeline
        .run_street_traffic_graph("sim-car", "car", &street_graph)
        .unwrap();

    assert!(!traffic.edges.is_empty());
    for (u, v) in traffic.edges.keys() {
        assert!(u < v);
    }
}

#[test]
fn reduced_graph_variant_handles_zero_car_commuters() {
    let store = MemoryStore::default();
    store
        .results
        .lock()
        .unwrap()
        .insert("sim-no-cars".to_string(), vec![bus_commuter("c2")]);

    let pipeline = Pipeline::new(store, test_config()).unwrap();
    let traffic = pipeline.run_reduced_traffic_graph("sim-no-cars", "car").unwrap();

    assert!(traffic.edges.is_empty());
    assert!(traffic.nodes.is_empty());
}
