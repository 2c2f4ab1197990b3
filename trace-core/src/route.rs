//! Routed-journey data model: the shape the routing engine hands back for
//! one commuter, and the rule for picking a single preferred option out of
//! the alternatives it offers.

use geo::Point;
use serde::{Deserialize, Serialize};

/// Closed set of transport modes a leg can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Train,
    Gondola,
    Watercraft,
    Bus,
    Car,
    Walking,
    /// Any mode outside the closed set above. Counted, but logged as a
    /// warning wherever it is encountered (§3, §7).
    Other,
}

impl TransportMode {
    /// The accounting category a mode rolls up into. Train, gondola, and
    /// watercraft are all accounted as rail.
    #[must_use]
    pub const fn category(self) -> Option<ModalCategory> {
        match self {
            Self::Train | Self::Gondola | Self::Watercraft => Some(ModalCategory::Rail),
            Self::Bus => Some(ModalCategory::Bus),
            Self::Car => Some(ModalCategory::Car),
            Self::Walking => Some(ModalCategory::Walk),
            Self::Other => None,
        }
    }

    #[must_use]
    pub const fn is_car(self) -> bool {
        matches!(self, Self::Car)
    }
}

/// The four accounting categories used for modal-share statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalCategory {
    Car,
    Rail,
    Bus,
    Walk,
}

/// A station stopover within a leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stopover {
    pub location: Point<f64>,
    pub departure: Option<u64>,
    pub arrival: Option<u64>,
}

impl Stopover {
    /// Timestamp to use when extracting a trace element for this stopover:
    /// departure, falling back to arrival (§4.B).
    #[must_use]
    pub fn timestamp(&self) -> Option<u64> {
        self.departure.or(self.arrival)
    }
}

/// One contiguous single-mode sub-trip of a journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub mode: TransportMode,
    pub origin: Point<f64>,
    pub destination: Point<f64>,
    pub departure: u64,
    pub arrival: u64,
    pub departure_delay_s: Option<i64>,
    pub arrival_delay_s: Option<i64>,
    pub stopovers: Vec<Stopover>,
    /// Google encoded-polyline geometry for this leg, if the router supplied
    /// one (§4.B).
    pub polyline: Option<String>,
}

impl Leg {
    #[must_use]
    pub const fn is_car(&self) -> bool {
        self.mode.is_car()
    }

    /// Arrival time adjusted by the arrival delay, used by the option
    /// selection rule.
    #[must_use]
    pub fn delayed_arrival(&self) -> i64 {
        self.arrival as i64 + self.arrival_delay_s.unwrap_or(0)
    }

    /// Departure time adjusted by the departure delay.
    #[must_use]
    pub fn delayed_departure(&self) -> i64 {
        self.departure as i64 - self.departure_delay_s.unwrap_or(0)
    }
}

/// One candidate itinerary for a commuter's journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOption {
    pub origin: Point<f64>,
    pub destination: Point<f64>,
    pub departure: u64,
    pub legs: Vec<Leg>,
}

impl RouteOption {
    /// True if every leg in this option is a car leg.
    #[must_use]
    pub fn is_car_only(&self) -> bool {
        !self.legs.is_empty() && self.legs.iter().all(Leg::is_car)
    }

    /// Delay-adjusted duration: the selection criterion is the minimum of
    /// this value across qualifying options (§3).
    #[must_use]
    pub fn adjusted_duration(&self) -> i64 {
        let Some(first) = self.legs.first() else {
            return i64::MAX;
        };
        let Some(last) = self.legs.last() else {
            return i64::MAX;
        };
        last.delayed_arrival() - first.delayed_departure()
    }
}

/// Coarse demographic/behavioural attributes of a synthetic commuter,
/// relevant to option selection and external keying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravellerDescriptor {
    pub age_bucket: String,
    pub employment: String,
    /// Non-null iff the traveller would use a car. The specific string
    /// value (vehicle type, ownership tier, ...) is never consulted — only
    /// presence/absence matters (§9).
    pub vehicle_usage: Option<String>,
}

impl TravellerDescriptor {
    #[must_use]
    pub const fn would_use_car(&self) -> bool {
        self.vehicle_usage.is_some()
    }
}

/// One commuter's routed journey for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub commuter_id: String,
    pub traveller: TravellerDescriptor,
    pub options: Vec<RouteOption>,
}

impl RouteResult {
    /// Picks the option with minimum delay-adjusted duration among options
    /// that are not car-only when the traveller would not use a car.
    /// Returns `None` if no option qualifies.
    #[must_use]
    pub fn selected_option(&self) -> Option<&RouteOption> {
        let would_use_car = self.traveller.would_use_car();

        self.options
            .iter()
            .filter(|opt| would_use_car || !opt.is_car_only())
            .min_by_key(|opt| opt.adjusted_duration())
    }
}
