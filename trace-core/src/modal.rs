//! Passenger-meter accounting and modal-share derivation (§3, §4.C).

use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::geometry::geo_distance_m;
use crate::route::ModalCategory;
use crate::trace::Trace;

/// Additive (meters, passengers) accumulator per modal category. The zero
/// value is the additive identity; addition is component-wise.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JourneyStats {
    pub car_meters: f64,
    pub car_passengers: f64,
    pub rail_meters: f64,
    pub rail_passengers: f64,
    pub bus_meters: f64,
    pub bus_passengers: f64,
    pub walk_meters: f64,
    pub walk_passengers: f64,
}

impl Add for JourneyStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            car_meters: self.car_meters + rhs.car_meters,
            car_passengers: self.car_passengers + rhs.car_passengers,
            rail_meters: self.rail_meters + rhs.rail_meters,
            rail_passengers: self.rail_passengers + rhs.rail_passengers,
            bus_meters: self.bus_meters + rhs.bus_meters,
            bus_passengers: self.bus_passengers + rhs.bus_passengers,
            walk_meters: self.walk_meters + rhs.walk_meters,
            walk_passengers: self.walk_passengers + rhs.walk_passengers,
        }
    }
}

impl std::iter::Sum for JourneyStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Per-category share of (meters × passengers), normalized to a total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalShares {
    pub car: f64,
    pub rail: f64,
    pub bus: f64,
    pub walk: f64,
}

impl JourneyStats {
    fn contribution(&self, category: ModalCategory) -> f64 {
        match category {
            ModalCategory::Car => self.car_meters * self.car_passengers,
            ModalCategory::Rail => self.rail_meters * self.rail_passengers,
            ModalCategory::Bus => self.bus_meters * self.bus_passengers,
            ModalCategory::Walk => self.walk_meters * self.walk_passengers,
        }
    }

    fn add_contribution(&mut self, category: ModalCategory, meters: f64, passengers: f64) {
        match category {
            ModalCategory::Car => {
                self.car_meters += meters;
                self.car_passengers += passengers;
            }
            ModalCategory::Rail => {
                self.rail_meters += meters;
                self.rail_passengers += passengers;
            }
            ModalCategory::Bus => {
                self.bus_meters += meters;
                self.bus_passengers += passengers;
            }
            ModalCategory::Walk => {
                self.walk_meters += meters;
                self.walk_passengers += passengers;
            }
        }
    }

    /// Shares normalized by this record's own total. Returns all zeros when
    /// the total is zero (§4.C, §8 "empty shares").
    #[must_use]
    pub fn shares(&self) -> ModalShares {
        self.shares_of(self.total())
    }

    /// Shares normalized by an externally supplied total ("contribution
    /// shares", §3). Returns all zeros when `total` is zero.
    #[must_use]
    pub fn shares_of(&self, total: f64) -> ModalShares {
        if total == 0.0 {
            return ModalShares::default();
        }
        ModalShares {
            car: self.contribution(ModalCategory::Car) / total,
            rail: self.contribution(ModalCategory::Rail) / total,
            bus: self.contribution(ModalCategory::Bus) / total,
            walk: self.contribution(ModalCategory::Walk) / total,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.contribution(ModalCategory::Car)
            + self.contribution(ModalCategory::Rail)
            + self.contribution(ModalCategory::Bus)
            + self.contribution(ModalCategory::Walk)
    }
}

/// Accumulates passenger-meters along a trace: walks consecutive pairs,
/// skipping pairs whose modes differ, and attributes one passenger at each
/// leg entry (§4.C). Pairs whose mode has no accounting category (§3
/// "other") contribute nothing.
#[must_use]
pub fn trace_stats(trace: &Trace) -> JourneyStats {
    let mut stats = JourneyStats::default();

    for pair in trace.elements.windows(2) {
        let [from, to] = pair else { continue };
        if from.mode != to.mode {
            continue;
        }
        let Some(category) = from.mode.category() else {
            continue;
        };

        let meters = geo_distance_m(from.point, to.point);
        let passengers = if from.leg_start { 1.0 } else { 0.0 };
        stats.add_contribution(category, meters, passengers);
    }

    stats
}
