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

//! Data source adapter.
//!
//! Every backend response is a JSON envelope `{"success": bool, "data": ...,
//! "error": "..."}`. Transport failures, API-level failures and malformed
//! payloads all collapse into a single [`FetchError`] at this boundary so the
//! polling loop only ever sees "fetch failed".

pub mod http;

use std::future::Future;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{Entity, Region, RegionFilter, Route, RouteSummary};

pub use http::{HttpDataSource, HttpSourceConfig};

/// Failure to obtain a usable payload from the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-success HTTP status.
    #[error("HTTP error: status {0}")]
    Status(u16),
    /// The envelope reported `success: false`.
    #[error("API request failed: {0}")]
    Api(String),
    /// The payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(err.to_string()),
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Request contract of the transit backend.
///
/// [`HttpDataSource`] talks to the real service; tests substitute an
/// in-memory implementation.
pub trait DataSource: Send + Sync {
    /// All countries with service, grouped with their cities.
    fn get_regions(&self) -> impl Future<Output = FetchResult<Vec<Region>>> + Send;

    /// Route catalogue, optionally narrowed to a region.
    fn get_routes(
        &self,
        filter: &RegionFilter,
    ) -> impl Future<Output = FetchResult<Vec<Route>>> + Send;

    /// Routes whose name, number or city contain `query`.
    fn search_routes(
        &self,
        query: &str,
        country: Option<&str>,
    ) -> impl Future<Output = FetchResult<Vec<RouteSummary>>> + Send;

    fn get_route_details(&self, route_id: &str)
        -> impl Future<Output = FetchResult<Route>> + Send;

    /// Initial vehicle snapshot for a focused route.
    fn get_vehicle_positions(
        &self,
        route_id: &str,
    ) -> impl Future<Output = FetchResult<Vec<Entity>>> + Send;

    /// Poll snapshot for a focused route.
    fn get_vehicle_updates(
        &self,
        route_id: &str,
    ) -> impl Future<Output = FetchResult<Vec<Entity>>> + Send;

    /// Poll snapshot for the global view.
    fn get_all_vehicles(
        &self,
        filter: &RegionFilter,
    ) -> impl Future<Output = FetchResult<Vec<Entity>>> + Send;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

fn open_envelope(body: &[u8]) -> FetchResult<serde_json::Value> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| FetchError::Malformed(format!("invalid envelope: {e}")))?;

    if !envelope.success {
        return Err(FetchError::Api(
            envelope
                .error
                .unwrap_or_else(|| "API request failed".to_string()),
        ));
    }

    envelope
        .data
        .ok_or_else(|| FetchError::Malformed("missing data field".to_string()))
}

/// Decode the `data` field of an envelope into `T`.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> FetchResult<T> {
    let data = open_envelope(body)?;
    serde_json::from_value(data).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Decode a vehicle snapshot.
///
/// The payload itself must be an array; individual records that do not
/// decode (typically a missing position) are dropped so one bad vehicle
/// cannot blank the whole map.
pub fn decode_entities(body: &[u8]) -> FetchResult<Vec<Entity>> {
    let data = open_envelope(body)?;
    let serde_json::Value::Array(items) = data else {
        return Err(FetchError::Malformed("vehicle data is not an array".to_string()));
    };

    let mut entities = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        match serde_json::from_value::<Entity>(item) {
            Ok(entity) => entities.push(entity),
            Err(e) => warn!("Dropping malformed vehicle {}: {}", id, e),
        }
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_failure_is_surfaced() {
        let body = br#"{"success": false, "error": "Route not found"}"#;
        let err = decode_envelope::<Route>(body).unwrap_err();
        assert_eq!(err, FetchError::Api("Route not found".to_string()));
    }

    #[test]
    fn test_api_failure_without_message() {
        let body = br#"{"success": false}"#;
        let err = decode_envelope::<Vec<Region>>(body).unwrap_err();
        assert_eq!(err, FetchError::Api("API request failed".to_string()));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = decode_envelope::<Vec<Region>>(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn test_decode_regions() {
        let body = br#"{"success": true, "count": 1, "data": [
            {"code": "india", "name": "India", "continent": "asia", "cities": ["Mumbai", "Pune"]}
        ]}"#;
        let regions: Vec<Region> = decode_envelope(body).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].cities, vec!["Mumbai", "Pune"]);
    }

    #[test]
    fn test_decode_entities_drops_records_without_position() {
        let body = br#"{"success": true, "data": [
            {"id": "vehicle_1", "route_id": "route_1", "position": {"lat": 1.0, "lng": 2.0}},
            {"id": "vehicle_2", "route_id": "route_1"},
            {"id": "vehicle_3", "route_id": "route_1", "position": {"lat": 3.0, "lng": 4.0}}
        ]}"#;
        let entities = decode_entities(body).unwrap();
        let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["vehicle_1", "vehicle_3"]);
    }

    #[test]
    fn test_decode_entities_requires_array() {
        let body = br#"{"success": true, "data": {"id": "vehicle_1"}}"#;
        assert!(matches!(decode_entities(body), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_empty_snapshot_is_not_an_error() {
        let body = br#"{"success": true, "data": [], "count": 0}"#;
        assert!(decode_entities(body).unwrap().is_empty());
    }
}
