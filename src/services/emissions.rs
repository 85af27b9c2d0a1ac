use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::AppError;

/// Modes offered by the footprint calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Car,
    Bus,
    Train,
    Plane,
}

impl TransportMode {
    pub const ALL: [TransportMode; 4] = [Self::Car, Self::Bus, Self::Train, Self::Plane];

    /// kg CO₂ per mile travelled.
    pub fn kg_per_mile(&self) -> f64 {
        match self {
            TransportMode::Car => 0.404,
            TransportMode::Bus | TransportMode::Train => 0.14,
            TransportMode::Plane => 0.257,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Car => "car",
            TransportMode::Bus => "bus",
            TransportMode::Train => "train",
            TransportMode::Plane => "plane",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == raw.trim().to_ascii_lowercase())
            .ok_or_else(|| AppError::BadRequest(format!("unknown transport mode {raw:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Moderate,
    High,
}

impl Impact {
    pub fn for_kg(kg: f64) -> Self {
        if kg < 5.0 {
            Impact::Low
        } else if kg < 20.0 {
            Impact::Moderate
        } else {
            Impact::High
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Impact::Low => "Low impact – Great job!",
            Impact::Moderate => "Moderate impact – Consider alternatives for longer trips",
            Impact::High => "High impact – Look for ways to reduce your carbon footprint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub mode: TransportMode,
    pub miles: f64,
    pub kg_co2: f64,
    pub impact: Impact,
}

pub fn estimate(mode: TransportMode, miles: f64) -> Result<Estimate, AppError> {
    if !miles.is_finite() || miles < 0.0 {
        return Err(AppError::BadRequest(
            "Distance must be a non-negative number of miles.".into(),
        ));
    }
    let kg_co2 = miles * mode.kg_per_mile();
    Ok(Estimate {
        mode,
        miles,
        kg_co2,
        impact: Impact::for_kg(kg_co2),
    })
}

// kg CO₂ per km, used on trip pages.
const CAR_KG_PER_KM: f64 = 0.170;
const CARPOOL_KG_PER_KM: f64 = 0.085;
const BUS_KG_PER_KM: f64 = 0.105;

/// Footprint of one trip's distance under each way of making it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteComparison {
    pub distance_km: f64,
    pub car: f64,
    pub carpool: f64,
    pub bus: f64,
    pub walk: f64,
    pub bike: f64,
    pub carpool_saving: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compare_route(distance_km: f64) -> RouteComparison {
    let distance_km = distance_km.max(0.0);
    let car = round2(distance_km * CAR_KG_PER_KM);
    let carpool = round2(distance_km * CARPOOL_KG_PER_KM);
    RouteComparison {
        distance_km,
        car,
        carpool,
        bus: round2(distance_km * BUS_KG_PER_KM),
        walk: 0.0,
        bike: 0.0,
        carpool_saving: round2(car - carpool),
    }
}
