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

//! HTTP implementation of [`DataSource`] backed by `reqwest`.

use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};

use super::{decode_entities, decode_envelope, DataSource, FetchError, FetchResult};
use crate::model::{Entity, Region, RegionFilter, Route, RouteSummary};

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Configuration for the HTTP data source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Backend base URL without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Transit backend client.
///
/// The region list never changes during a session, so it is cached after the
/// first successful fetch.
pub struct HttpDataSource {
    client: reqwest::Client,
    base_url: String,
    regions_cache: Mutex<Option<Vec<Region>>>,
}

impl std::fmt::Debug for HttpDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDataSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpDataSource {
    pub fn new(config: HttpSourceConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            regions_cache: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forget cached responses.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.regions_cache.lock() {
            *cache = None;
        }
    }

    async fn get_bytes(&self, endpoint: &str, query: &[(&str, &str)]) -> FetchResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Request to {} failed with HTTP {}", endpoint, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl DataSource for HttpDataSource {
    async fn get_regions(&self) -> FetchResult<Vec<Region>> {
        let cached = self
            .regions_cache
            .lock()
            .ok()
            .and_then(|cache| cache.clone());
        if let Some(regions) = cached {
            return Ok(regions);
        }

        let body = self.get_bytes("/api/regions", &[]).await?;
        let regions: Vec<Region> = decode_envelope(&body)?;

        if let Ok(mut cache) = self.regions_cache.lock() {
            *cache = Some(regions.clone());
        }
        Ok(regions)
    }

    async fn get_routes(&self, filter: &RegionFilter) -> FetchResult<Vec<Route>> {
        let body = self.get_bytes("/api/routes", &filter.query_pairs()).await?;
        decode_envelope(&body)
    }

    async fn search_routes(
        &self,
        query: &str,
        country: Option<&str>,
    ) -> FetchResult<Vec<RouteSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut params = vec![("q", query)];
        if let Some(country) = country {
            params.push(("country", country));
        }

        let body = self.get_bytes("/api/routes/search", &params).await?;
        let routes: Vec<Route> = decode_envelope(&body)?;
        Ok(routes.into_iter().map(RouteSummary::from).collect())
    }

    async fn get_route_details(&self, route_id: &str) -> FetchResult<Route> {
        let body = self
            .get_bytes(&format!("/api/routes/{route_id}"), &[])
            .await?;
        decode_envelope(&body)
    }

    async fn get_vehicle_positions(&self, route_id: &str) -> FetchResult<Vec<Entity>> {
        let body = self
            .get_bytes(&format!("/api/tracking/{route_id}"), &[])
            .await?;
        decode_entities(&body)
    }

    async fn get_vehicle_updates(&self, route_id: &str) -> FetchResult<Vec<Entity>> {
        let body = self
            .get_bytes(&format!("/api/tracking/{route_id}/updates"), &[])
            .await?;
        decode_entities(&body)
    }

    async fn get_all_vehicles(&self, filter: &RegionFilter) -> FetchResult<Vec<Entity>> {
        let body = self
            .get_bytes("/api/tracking/all", &filter.query_pairs())
            .await?;
        decode_entities(&body)
    }
}
