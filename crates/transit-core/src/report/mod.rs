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

//! Traffic report over the currently displayed vehicles.

use crate::model::{Entity, EntityId, RouteId};

/// Maximum entries per report section.
pub const REPORT_LIMIT: usize = 5;

/// One vehicle listed in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub entity_id: EntityId,
    /// Drill-down target.
    pub route_id: RouteId,
    pub route_label: String,
    pub occupancy_percent: u32,
    pub status: String,
    pub next_stops: String,
}

impl ReportEntry {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            entity_id: entity.id.clone(),
            route_id: entity.route_id.clone(),
            route_label: entity.route_label().to_string(),
            occupancy_percent: entity.occupancy_percent(),
            status: entity.status_label().to_string(),
            next_stops: entity.next_stops_summary(),
        }
    }
}

/// Most crowded and delayed vehicles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficReport {
    /// Vehicles above the crowding threshold, fullest first.
    pub crowded: Vec<ReportEntry>,
    /// Vehicles whose status reports a delay.
    pub delayed: Vec<ReportEntry>,
}

impl TrafficReport {
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Self {
        let mut crowded: Vec<&Entity> = Vec::new();
        let mut delayed: Vec<&Entity> = Vec::new();
        for entity in entities {
            if entity.is_crowded() {
                crowded.push(entity);
            }
            if entity.is_delayed() {
                delayed.push(entity);
            }
        }

        crowded.sort_by(|a, b| {
            let ratio = |e: &Entity| e.occupancy_ratio().unwrap_or(0.0);
            ratio(b).total_cmp(&ratio(a)).then_with(|| a.id.cmp(&b.id))
        });
        delayed.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            crowded: crowded
                .into_iter()
                .take(REPORT_LIMIT)
                .map(ReportEntry::from_entity)
                .collect(),
            delayed: delayed
                .into_iter()
                .take(REPORT_LIMIT)
                .map(ReportEntry::from_entity)
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.crowded.is_empty() && self.delayed.is_empty()
    }
}
