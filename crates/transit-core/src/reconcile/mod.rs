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

//! Snapshot reconciliation.
//!
//! Diffs a fresh vehicle snapshot against what is currently drawn and
//! produces an add/update/remove plan. Applying the plan to a
//! [`DisplayedEntitySet`] leaves exactly the snapshot's identifiers in it,
//! each with exactly one visual handle.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::model::{Entity, EntityId, Position};

/// Opaque reference to one drawn vehicle marker. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualHandle(u64);

impl VisualHandle {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VisualHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One vehicle currently on the map.
#[derive(Debug, Clone)]
pub struct DisplayedEntity {
    pub handle: VisualHandle,
    /// Last reported position (the target of any running animation).
    pub position: Position,
    /// Latest record, used for popups and panels.
    pub entity: Entity,
}

/// Add/update/remove classification of a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    /// Vehicles not yet displayed, in snapshot order.
    pub added: Vec<Entity>,
    /// Vehicles already displayed, in snapshot order. Always includes
    /// unchanged vehicles so their metadata is refreshed.
    pub updated: Vec<Entity>,
    /// Displayed vehicles missing from the snapshot, sorted.
    pub removed: Vec<EntityId>,
}

impl ReconciliationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// A vehicle that received a new handle.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedEntity {
    pub id: EntityId,
    pub handle: VisualHandle,
    pub position: Position,
}

/// A vehicle that kept its handle through a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MovedEntity {
    pub id: EntityId,
    pub handle: VisualHandle,
    pub from: Position,
    pub to: Position,
}

impl MovedEntity {
    #[must_use]
    pub fn distance_meters(&self) -> f64 {
        self.from.distance_meters(&self.to)
    }
}

/// Handle-level outcome of applying a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedPlan {
    pub added: Vec<PlacedEntity>,
    pub updated: Vec<MovedEntity>,
    pub removed: Vec<(EntityId, VisualHandle)>,
}

/// Authoritative record of what is drawn.
#[derive(Debug, Default)]
pub struct DisplayedEntitySet {
    entries: HashMap<EntityId, DisplayedEntity>,
    next_handle: u64,
}

impl DisplayedEntitySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DisplayedEntity> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn handle_of(&self, id: &str) -> Option<VisualHandle> {
        self.entries.get(id).map(|e| e.handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayedEntity> {
        self.entries.values()
    }

    /// Identifiers currently displayed.
    #[must_use]
    pub fn ids(&self) -> HashSet<EntityId> {
        self.entries.keys().cloned().collect()
    }

    fn allocate_handle(&mut self) -> VisualHandle {
        self.next_handle += 1;
        VisualHandle(self.next_handle)
    }

    /// Apply a plan computed against this set.
    ///
    /// Tolerates a plan computed against a slightly different set: an
    /// "added" id that is already present keeps its handle, and an
    /// "updated" id that is missing gets a fresh one.
    pub fn apply(&mut self, plan: ReconciliationPlan) -> AppliedPlan {
        let mut applied = AppliedPlan::default();

        for id in plan.removed {
            if let Some(entry) = self.entries.remove(&id) {
                applied.removed.push((id, entry.handle));
            }
        }

        for entity in plan.updated.into_iter().chain(plan.added) {
            let to = entity.position;
            if let Some(entry) = self.entries.get_mut(&entity.id) {
                let from = entry.position;
                entry.position = to;
                entry.entity = entity;
                applied.updated.push(MovedEntity {
                    id: entry.entity.id.clone(),
                    handle: entry.handle,
                    from,
                    to,
                });
            } else {
                let handle = self.allocate_handle();
                applied.added.push(PlacedEntity {
                    id: entity.id.clone(),
                    handle,
                    position: to,
                });
                self.entries.insert(
                    entity.id.clone(),
                    DisplayedEntity {
                        handle,
                        position: to,
                        entity,
                    },
                );
            }
        }

        applied
    }

    /// Drop every entry, returning the handles that must be destroyed.
    pub fn clear(&mut self) -> Vec<(EntityId, VisualHandle)> {
        let mut removed: Vec<_> = self
            .entries
            .drain()
            .map(|(id, entry)| (id, entry.handle))
            .collect();
        removed.sort();
        removed
    }
}

/// Classify `incoming` against `previous`.
///
/// Duplicate identifiers in `incoming` resolve to the last occurrence.
#[must_use]
pub fn reconcile(previous: &DisplayedEntitySet, incoming: &[Entity]) -> ReconciliationPlan {
    let lookup: HashMap<&str, usize> = incoming
        .iter()
        .enumerate()
        .map(|(index, entity)| (entity.id.as_str(), index))
        .collect();

    let mut plan = ReconciliationPlan::default();

    let mut removed: Vec<EntityId> = previous
        .entries
        .keys()
        .filter(|id| !lookup.contains_key(id.as_str()))
        .cloned()
        .collect();
    removed.sort();
    plan.removed = removed;

    let mut seen = HashSet::new();
    for entity in incoming {
        let Some(&index) = lookup.get(entity.id.as_str()) else {
            continue;
        };
        if !seen.insert(entity.id.as_str()) {
            continue;
        }
        let latest = &incoming[index];
        if previous.contains(&latest.id) {
            plan.updated.push(latest.clone());
        } else {
            plan.added.push(latest.clone());
        }
    }

    plan
}
