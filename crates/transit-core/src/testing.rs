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

//! Scriptable in-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::model::{Entity, Position, Region, RegionFilter, Route, RouteSummary, Stop};
use crate::source::{DataSource, FetchError, FetchResult};

#[derive(Debug, Default)]
struct MockState {
    regions: Vec<Region>,
    routes: Vec<Route>,
    global: Vec<Entity>,
    route_vehicles: HashMap<String, Vec<Entity>>,
    failures: HashMap<&'static str, usize>,
    delays: HashMap<&'static str, Duration>,
    calls: Vec<String>,
}

/// Backend whose answers are set by the test.
///
/// Endpoint names used by `fail_next`, `delay` and `count`: `regions`,
/// `routes`, `search`, `route_details`, `positions`, `updates`,
/// `all_vehicles`.
#[derive(Debug, Default)]
pub(crate) struct MockSource {
    state: Mutex<MockState>,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_regions(&self, regions: Vec<Region>) {
        self.state().regions = regions;
    }

    pub(crate) fn add_route(&self, route: Route) {
        self.state().routes.push(route);
    }

    pub(crate) fn set_global(&self, entities: Vec<Entity>) {
        self.state().global = entities;
    }

    pub(crate) fn set_route_vehicles(&self, route_id: &str, entities: Vec<Entity>) {
        self.state()
            .route_vehicles
            .insert(route_id.to_string(), entities);
    }

    /// Fail the next `times` calls to `endpoint`.
    pub(crate) fn fail_next(&self, endpoint: &'static str, times: usize) {
        self.state().failures.insert(endpoint, times);
    }

    /// Hold every response from `endpoint` for `delay`.
    pub(crate) fn delay(&self, endpoint: &'static str, delay: Duration) {
        self.state().delays.insert(endpoint, delay);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub(crate) fn count(&self, endpoint: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.split(':').next() == Some(endpoint))
            .count()
    }

    async fn respond<T>(
        &self,
        endpoint: &'static str,
        detail: &str,
        answer: impl FnOnce(&MockState) -> FetchResult<T>,
    ) -> FetchResult<T> {
        let (delay, result) = {
            let mut state = self.state();
            state.calls.push(if detail.is_empty() {
                endpoint.to_string()
            } else {
                format!("{endpoint}:{detail}")
            });
            let delay = state.delays.get(endpoint).copied();
            let failing = match state.failures.get_mut(endpoint) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            let result = if failing {
                Err(FetchError::Transport("simulated outage".to_string()))
            } else {
                answer(&*state)
            };
            (delay, result)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

impl DataSource for MockSource {
    async fn get_regions(&self) -> FetchResult<Vec<Region>> {
        self.respond("regions", "", |s| Ok(s.regions.clone())).await
    }

    async fn get_routes(&self, filter: &RegionFilter) -> FetchResult<Vec<Route>> {
        let country = filter.country.clone();
        let city = filter.city.clone();
        self.respond("routes", &filter.to_string(), move |s| {
            Ok(s.routes
                .iter()
                .filter(|r| {
                    country
                        .as_deref()
                        .map_or(true, |c| r.country_code.as_deref() == Some(c))
                })
                .filter(|r| city.as_deref().map_or(true, |c| r.city == c))
                .cloned()
                .collect())
        })
        .await
    }

    async fn search_routes(
        &self,
        query: &str,
        _country: Option<&str>,
    ) -> FetchResult<Vec<RouteSummary>> {
        let needle = query.to_lowercase();
        self.respond("search", query, move |s| {
            Ok(s.routes
                .iter()
                .filter(|r| r.name.to_lowercase().contains(&needle))
                .cloned()
                .map(RouteSummary::from)
                .collect())
        })
        .await
    }

    async fn get_route_details(&self, route_id: &str) -> FetchResult<Route> {
        self.respond("route_details", route_id, |s| {
            s.routes
                .iter()
                .find(|r| r.id == route_id)
                .cloned()
                .ok_or_else(|| FetchError::Api("Route not found".to_string()))
        })
        .await
    }

    async fn get_vehicle_positions(&self, route_id: &str) -> FetchResult<Vec<Entity>> {
        self.respond("positions", route_id, |s| {
            Ok(s.route_vehicles.get(route_id).cloned().unwrap_or_default())
        })
        .await
    }

    async fn get_vehicle_updates(&self, route_id: &str) -> FetchResult<Vec<Entity>> {
        self.respond("updates", route_id, |s| {
            Ok(s.route_vehicles.get(route_id).cloned().unwrap_or_default())
        })
        .await
    }

    async fn get_all_vehicles(&self, _filter: &RegionFilter) -> FetchResult<Vec<Entity>> {
        self.respond("all_vehicles", "", |s| Ok(s.global.clone()))
            .await
    }
}

pub(crate) fn entity(id: &str, route_id: &str, lat: f64, lon: f64) -> Entity {
    Entity::new(id, route_id, Position::new(lat, lon))
}

pub(crate) fn route(id: &str, name: &str, country_code: &str, stops: &[(f64, f64)]) -> Route {
    Route {
        id: id.to_string(),
        name: name.to_string(),
        route_number: id.trim_start_matches("route_").to_string(),
        kind: crate::model::VehicleKind::Bus,
        city: "Pune".to_string(),
        country: "India".to_string(),
        country_code: Some(country_code.to_string()),
        stops: stops
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| Stop {
                name: format!("Stop {}", i + 1),
                order: u32::try_from(i + 1).unwrap(),
                lat: *lat,
                lon: *lon,
            })
            .collect(),
        frequency: "10 mins".to_string(),
    }
}
