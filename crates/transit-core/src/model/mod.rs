// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transit data model shared by every layer.
//!
//! Field names follow the backend's JSON payloads (`lng`, `type`,
//! `route_number`, ...) so the adapter can deserialize responses directly.

use std::fmt;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Occupancy ratio above which a vehicle counts as crowded.
pub const CROWDED_OCCUPANCY_RATIO: f64 = 0.7;

/// Stable vehicle identifier (e.g. `vehicle_12`).
pub type EntityId = String;

/// Route identifier (e.g. `route_3`).
pub type RouteId = String;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    #[serde(rename = "lng")]
    pub lon: f64,
}

impl Position {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in meters (Haversine).
    #[must_use]
    pub fn distance_meters(&self, other: &Position) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }

    /// Per-axis linear interpolation; `t` is not clamped here.
    #[must_use]
    pub fn lerp(&self, to: &Position, t: f64) -> Position {
        Position {
            lat: self.lat + (to.lat - self.lat) * t,
            lon: self.lon + (to.lon - self.lon) * t,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8.4}° {:>9.4}°", self.lat, self.lon)
    }
}

/// Vehicle category. Each kind gets a distinct visual treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VehicleKind {
    #[default]
    Bus,
    Metro,
    Tram,
    #[serde(rename = "Light Rail")]
    LightRail,
    #[serde(other)]
    Other,
}

impl VehicleKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            VehicleKind::Bus => "Bus",
            VehicleKind::Metro => "Metro",
            VehicleKind::Tram => "Tram",
            VehicleKind::LightRail => "Light Rail",
            VehicleKind::Other => "Vehicle",
        }
    }

    /// Marker color as `#rrggbb`.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            VehicleKind::Bus | VehicleKind::Other => "#667eea",
            VehicleKind::Metro => "#f5576c",
            VehicleKind::Tram => "#4ade80",
            VehicleKind::LightRail => "#fbbf24",
        }
    }
}

/// Predicted arrival at an upcoming stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPrediction {
    pub name: String,
    /// Estimated minutes until arrival.
    #[serde(rename = "eta", default)]
    pub eta_minutes: f64,
}

/// A tracked vehicle as reported by one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type", default)]
    pub kind: VehicleKind,
    pub position: Position,
    /// Ground speed in km/h.
    #[serde(default)]
    pub speed: f64,
    /// Heading in degrees (0-360, north = 0).
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub occupancy: u32,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub capacity: u32,
    /// Operational status text such as "On Time" or "Delayed 4 min".
    #[serde(default)]
    pub status: Option<String>,
    pub route_id: RouteId,
    #[serde(default)]
    pub route_name: String,
    #[serde(default)]
    pub route_number: Option<String>,
    #[serde(default)]
    pub next_stops: Vec<StopPrediction>,
    /// Older payloads only carry the name of the next stop.
    #[serde(default)]
    pub next_stop: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl Entity {
    /// Minimal vehicle record, mostly useful for tests and fixtures.
    #[must_use]
    pub fn new(id: impl Into<String>, route_id: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            kind: VehicleKind::default(),
            position,
            speed: 0.0,
            heading: None,
            occupancy: 0,
            capacity: 0,
            status: None,
            route_id: route_id.into(),
            route_name: String::new(),
            route_number: None,
            next_stops: Vec::new(),
            next_stop: None,
            last_updated: None,
        }
    }

    /// Occupancy as a fraction of capacity, `None` when capacity is unknown.
    #[must_use]
    pub fn occupancy_ratio(&self) -> Option<f64> {
        (self.capacity > 0).then(|| f64::from(self.occupancy) / f64::from(self.capacity))
    }

    /// Rounded occupancy percentage (0 when capacity is unknown).
    #[must_use]
    pub fn occupancy_percent(&self) -> u32 {
        self.occupancy_ratio()
            .map_or(0, |ratio| (ratio * 100.0).round().clamp(0.0, f64::from(u32::MAX)) as u32)
    }

    #[must_use]
    pub fn is_crowded(&self) -> bool {
        self.occupancy_ratio()
            .is_some_and(|ratio| ratio > CROWDED_OCCUPANCY_RATIO)
    }

    #[must_use]
    pub fn is_delayed(&self) -> bool {
        self.status.as_deref().is_some_and(|s| s.contains("Delayed"))
    }

    #[must_use]
    pub fn status_label(&self) -> &str {
        self.status.as_deref().unwrap_or("On Time")
    }

    /// Route number, falling back to the route name.
    #[must_use]
    pub fn route_label(&self) -> &str {
        self.route_number.as_deref().unwrap_or(&self.route_name)
    }

    /// One-line summary of the next two stops.
    #[must_use]
    pub fn next_stops_summary(&self) -> String {
        match self.next_stops.as_slice() {
            [first, second, ..] => format!(
                "{} ({:.0} min) → {} ({:.0} min)",
                first.name,
                first.eta_minutes.max(0.0),
                second.name,
                second.eta_minutes.max(0.0)
            ),
            _ => self
                .next_stop
                .clone()
                .unwrap_or_else(|| "Terminal".to_string()),
        }
    }
}

/// Accepts any JSON number. Fractions round and negatives clamp to zero.
fn deserialize_count<'de, D>(d: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(d)?;
    if value.is_nan() {
        return Ok(0);
    }
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped to the u32 range first"
    )]
    let count = value.round().clamp(0.0, f64::from(u32::MAX)) as u32;
    Ok(count)
}

/// A stop along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    /// 1-based position along the route.
    pub order: u32,
    pub lat: f64,
    #[serde(rename = "lng")]
    pub lon: f64,
}

impl Stop {
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon)
    }
}

/// Axis-aligned lat/lon box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Position,
    pub north_east: Position,
}

impl Bounds {
    #[must_use]
    pub fn center(&self) -> Position {
        self.south_west.lerp(&self.north_east, 0.5)
    }
}

/// Full route record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    #[serde(default)]
    pub route_number: String,
    #[serde(rename = "type", default)]
    pub kind: VehicleKind,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    /// Service frequency text, e.g. "12 mins".
    #[serde(default)]
    pub frequency: String,
}

impl Route {
    /// Bounding box of all stops, `None` for a route without stops.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.stops.first()?.position();
        let (mut south_west, mut north_east) = (first, first);
        for stop in &self.stops[1..] {
            south_west.lat = south_west.lat.min(stop.lat);
            south_west.lon = south_west.lon.min(stop.lon);
            north_east.lat = north_east.lat.max(stop.lat);
            north_east.lon = north_east.lon.max(stop.lon);
        }
        Some(Bounds {
            south_west,
            north_east,
        })
    }

    /// Stop geometry in route order.
    #[must_use]
    pub fn path(&self) -> Vec<Position> {
        let mut stops: Vec<&Stop> = self.stops.iter().collect();
        stops.sort_by_key(|s| s.order);
        stops.into_iter().map(Stop::position).collect()
    }
}

/// Search-result projection of a [`Route`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub id: RouteId,
    pub name: String,
    pub route_number: String,
    pub kind: VehicleKind,
    pub city: String,
    pub country: String,
    pub stop_count: usize,
}

impl From<Route> for RouteSummary {
    fn from(route: Route) -> Self {
        Self {
            stop_count: route.stops.len(),
            id: route.id,
            name: route.name,
            route_number: route.route_number,
            kind: route.kind,
            city: route.city,
            country: route.country,
        }
    }
}

/// A country with the cities it has service in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub continent: String,
    #[serde(default)]
    pub cities: Vec<String>,
}

/// Region scope for the global view. Both fields empty means everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionFilter {
    pub country: Option<String>,
    pub city: Option<String>,
}

impl RegionFilter {
    #[must_use]
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country: Some(code.into()),
            city: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.city.is_none()
    }

    /// Query-string pairs for the set fields.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(country) = self.country.as_deref() {
            pairs.push(("country", country));
        }
        if let Some(city) = self.city.as_deref() {
            pairs.push(("city", city));
        }
        pairs
    }
}

impl fmt::Display for RegionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.country, &self.city) {
            (None, None) => write!(f, "all regions"),
            (Some(country), None) => write!(f, "{country}"),
            (None, Some(city)) => write!(f, "{city}"),
            (Some(country), Some(city)) => write!(f, "{city}, {country}"),
        }
    }
}

/// Display scope: every vehicle in a region, or the vehicles of one route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewMode {
    Global(RegionFilter),
    Focused(RouteId),
}

impl ViewMode {
    #[must_use]
    pub fn is_focused(&self) -> bool {
        matches!(self, ViewMode::Focused(_))
    }

    #[must_use]
    pub fn focused_route(&self) -> Option<&str> {
        match self {
            ViewMode::Focused(route_id) => Some(route_id),
            ViewMode::Global(_) => None,
        }
    }
}

impl Default for ViewMode {
    fn default() -> Self {
        ViewMode::Global(RegionFilter::default())
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Global(filter) => write!(f, "GLOBAL({filter})"),
            ViewMode::Focused(route_id) => write!(f, "FOCUSED({route_id})"),
        }
    }
}
