//! Fixed-path demonstration executable (§2b): wires an in-memory `Store`,
//! a synthetic street network, and a handful of synthetic `RouteResult`s
//! through the pipeline end to end. Not a CLI — no flag parsing, no
//! user-facing surface, the same kind of fixed demo `cascade-bin` ships.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use geo::Point;
use trace_core::prelude::*;
use tracing::info;

const STREET_NETWORK: &str = r#"<?xml version="1.0"?>
<graphml>
  <graph edgedefault="undirected">
    <node id="n0"><data key="d4">52.5200</data><data key="d5">13.4050</data></node>
    <node id="n1"><data key="d4">52.5205</data><data key="d5">13.4060</data></node>
    <node id="n2"><data key="d4">52.5210</data><data key="d5">13.4070</data></node>
    <node id="n3"><data key="d4">52.5215</data><data key="d5">13.4080</data></node>
    <edge source="n0" target="n1"><data key="d16">85.0</data></edge>
    <edge source="n1" target="n2"><data key="d16">90.0</data></edge>
    <edge source="n2" target="n3"><data key="d16">95.0</data></edge>
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

fn synthetic_commuters() -> Vec<RouteResult> {
    let car_leg = Leg {
        mode: TransportMode::Car,
        origin: Point::new(13.4050, 52.5200),
        destination: Point::new(13.4080, 52.5215),
        departure: 0,
        arrival: 420,
        departure_delay_s: None,
        arrival_delay_s: None,
        stopovers: vec![],
        polyline: None,
    };
    let bus_leg = Leg {
        mode: TransportMode::Bus,
        origin: Point::new(13.4050, 52.5200),
        destination: Point::new(13.4080, 52.5215),
        departure: 0,
        arrival: 900,
        departure_delay_s: None,
        arrival_delay_s: Some(60),
        stopovers: vec![
            Stopover {
                location: Point::new(13.4060, 52.5205),
                departure: Some(200),
                arrival: Some(190),
            },
            Stopover {
                location: Point::new(13.4070, 52.5210),
                departure: Some(500),
                arrival: Some(490),
            },
        ],
        polyline: None,
    };

    vec![
        RouteResult {
            commuter_id: "commuter-1".into(),
            traveller: TravellerDescriptor {
                age_bucket: "30-45".into(),
                employment: "employed".into(),
                vehicle_usage: Some("owns".into()),
            },
            options: vec![RouteOption {
                origin: car_leg.origin,
                destination: car_leg.destination,
                departure: car_leg.departure,
                legs: vec![car_leg],
            }],
        },
        RouteResult {
            commuter_id: "commuter-2".into(),
            traveller: TravellerDescriptor {
                age_bucket: "18-30".into(),
                employment: "student".into(),
                vehicle_usage: None,
            },
            options: vec![RouteOption {
                origin: bus_leg.origin,
                destination: bus_leg.destination,
                departure: bus_leg.departure,
                legs: vec![bus_leg],
            }],
        },
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = MemoryStore::default();
    store
        .results
        .lock()
        .unwrap()
        .insert("demo-sim".to_string(), synthetic_commuters());

    let config = Config {
        store_user: String::new(),
        store_password: String::new(),
        store_host: String::new(),
        store_database: String::new(),
        project_root: std::env::temp_dir().join("trace-core-demo"),
        worker_count: 4,
    };

    info!(worker_count = 4, "starting demo pipeline");
    let pipeline = Pipeline::new(store, config)?;

    let boundary = PolyBounds::new(geo::Polygon::new(
        geo::LineString(vec![
            geo::Coord { x: 13.0, y: 52.0 },
            geo::Coord { x: 14.0, y: 52.0 },
            geo::Coord { x: 14.0, y: 53.0 },
            geo::Coord { x: 13.0, y: 53.0 },
            geo::Coord { x: 13.0, y: 52.0 },
        ]),
        vec![],
    ))
    .expect("demo boundary has a bounding rectangle");

    let stats = pipeline.run_total_stats("demo-sim", &boundary)?;
    let shares = stats.shares();
    info!(car = shares.car, rail = shares.rail, bus = shares.bus, walk = shares.walk, "total stats computed");
    println!(
        "modal shares: car={:.3} rail={:.3} bus={:.3} walk={:.3}",
        shares.car, shares.rail, shares.bus, shares.walk
    );

    let street_graph = StreetGraph::load(STREET_NETWORK, 4)?;
    let traffic = pipeline.run_street_traffic_graph("demo-sim", "car", &street_graph)?;
    info!(edges = traffic.edges.len(), "street traffic graph built");
    println!("traffic graph edges: {}", traffic.edges.len());

    Ok(())
}
