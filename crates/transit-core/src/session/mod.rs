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

//! View-mode controller.
//!
//! A [`Session`] owns everything that changes when the user moves between the
//! global map and a single route: the displayed vehicle set, marker motion,
//! the poll loop and the loaded route. All of it lives behind one mutex so a
//! mode transition tears down and rebuilds state in a single critical
//! section, and a poll result is checked against its generation ticket under
//! that same lock before it touches anything. Route details and the route
//! catalogue are checked against a separate transition epoch, so hiding or
//! showing vehicles only invalidates vehicle loads.
//!
//! Renderers learn about changes through [`DisplayEvent`]s on a broadcast
//! channel and sample marker positions once per frame with
//! [`Session::frame`].

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::{
    Entity, EntityId, Position, Region, RegionFilter, Route, RouteId, RouteSummary, ViewMode,
};
use crate::motion::{MotionInterpolator, DEFAULT_ANIMATION_DURATION};
use crate::reconcile::{reconcile, DisplayedEntitySet, VisualHandle};
use crate::report::{ReportEntry, TrafficReport};
use crate::scheduler::{PollScheduler, PollTicket, DEFAULT_POLL_INTERVAL};
use crate::search::{SearchIndex, DEFAULT_SEARCH_DEBOUNCE};
use crate::source::{DataSource, FetchError, FetchResult};

/// Moves shorter than this snap into place instead of animating.
pub const DEFAULT_JUMP_THRESHOLD_METERS: f64 = 10.0;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub animation_duration: Duration,
    pub jump_threshold_meters: f64,
    pub search_debounce: Duration,
    /// Region shown by [`Session::start`].
    pub initial_filter: RegionFilter,
    pub vehicles_visible: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            animation_duration: DEFAULT_ANIMATION_DURATION,
            jump_threshold_meters: DEFAULT_JUMP_THRESHOLD_METERS,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            initial_filter: RegionFilter::default(),
            vehicles_visible: true,
        }
    }
}

/// Changes a renderer has to mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// Create a marker.
    EntityAdded {
        id: EntityId,
        handle: VisualHandle,
        position: Position,
    },
    /// A marker got a new reported position. When `animated` is false it
    /// jumped straight to `to`.
    EntityMoved {
        id: EntityId,
        handle: VisualHandle,
        from: Position,
        to: Position,
        animated: bool,
    },
    /// Destroy a marker.
    EntityRemoved { id: EntityId, handle: VisualHandle },
    ModeChanged(ViewMode),
    /// Route geometry is available through [`Session::focused_route`].
    RouteLoaded(RouteId),
    RouteCleared,
    /// A snapshot fetch failed; the displayed set was left as it was.
    SnapshotFailed { mode: ViewMode, error: FetchError },
}

/// Errors surfaced to the user. Failed background polls are not errors; they
/// are logged and reported as [`DisplayEvent::SnapshotFailed`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to load routes for {filter}: {source}")]
    Catalogue {
        filter: RegionFilter,
        #[source]
        source: FetchError,
    },
    #[error("Failed to load route {route_id}: {source}")]
    Route {
        route_id: RouteId,
        #[source]
        source: FetchError,
    },
    #[error("Failed to load regions: {0}")]
    Regions(#[source] FetchError),
    #[error("Route search failed: {0}")]
    Search(#[source] FetchError),
}

/// Point-in-time counters for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub mode: ViewMode,
    pub route_count: usize,
    pub vehicle_count: usize,
    pub snapshots_applied: u64,
    pub failed_fetches: u64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub poll_generation: u64,
}

/// Where the map camera should go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapTarget {
    pub center: Position,
    pub zoom: u8,
}

/// World overview used when nothing more specific is known.
pub const WORLD_VIEW: MapTarget = MapTarget {
    center: Position::new(20.0, 0.0),
    zoom: 2,
};

/// Camera target for the current selection: the focused route's first stop,
/// else the first stop of the region's first route, else the whole world.
#[must_use]
pub fn locate(route: Option<&Route>, filter: &RegionFilter, catalogue: &[Route]) -> MapTarget {
    if let Some(center) = route.and_then(|r| r.path().first().copied()) {
        return MapTarget { center, zoom: 13 };
    }
    if filter.country.is_some() {
        if let Some(center) = catalogue.first().and_then(|r| r.path().first().copied()) {
            return MapTarget { center, zoom: 10 };
        }
    }
    WORLD_VIEW
}

/// A displayed vehicle with its on-screen position.
#[derive(Debug, Clone)]
pub struct RenderedEntity {
    pub handle: VisualHandle,
    /// Where the marker is drawn right now, mid-animation included.
    pub position: Position,
    pub entity: Entity,
}

/// Stamp of one mode transition. `epoch` guards the route detail and
/// catalogue; `ticket` guards vehicle loads, which showing or hiding vehicles
/// also invalidates.
#[derive(Debug, Clone)]
struct Transition {
    epoch: u64,
    ticket: PollTicket,
}

#[derive(Debug)]
struct SessionState {
    mode: ViewMode,
    /// Bumped by every mode transition.
    epoch: u64,
    region_filter: RegionFilter,
    displayed: DisplayedEntitySet,
    motion: MotionInterpolator,
    scheduler: PollScheduler,
    route: Option<Route>,
    catalogue: Vec<Route>,
    vehicles_visible: bool,
    snapshots_applied: u64,
    failed_fetches: u64,
    last_snapshot_at: Option<DateTime<Utc>>,
}

struct Shared<S> {
    source: Arc<S>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    events: broadcast::Sender<DisplayEvent>,
    search: SearchIndex<S>,
}

/// Live map session. Cheap to clone; clones share state.
pub struct Session<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: DataSource + 'static> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode())
            .field("vehicles", &self.displayed_len())
            .finish_non_exhaustive()
    }
}

impl<S: DataSource + 'static> Session<S> {
    pub fn new(source: Arc<S>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = SessionState {
            mode: ViewMode::Global(config.initial_filter.clone()),
            epoch: 0,
            region_filter: config.initial_filter.clone(),
            displayed: DisplayedEntitySet::new(),
            motion: MotionInterpolator::new(),
            scheduler: PollScheduler::new(),
            route: None,
            catalogue: Vec::new(),
            vehicles_visible: config.vehicles_visible,
            snapshots_applied: 0,
            failed_fetches: 0,
            last_snapshot_at: None,
        };

        Self {
            shared: Arc::new(Shared {
                search: SearchIndex::new(Arc::clone(&source), config.search_debounce),
                source,
                config,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.shared.events.subscribe()
    }

    /// Initial load: route catalogue and vehicles for the configured region,
    /// then global polling.
    ///
    /// A catalogue failure is returned, but vehicles are still loaded and
    /// polled so the map recovers once the backend does.
    pub async fn start(&self) -> Result<(), SessionError> {
        let filter = self.shared.config.initial_filter.clone();
        info!("Starting session for {}", filter);
        self.set_region_filter(filter).await
    }

    /// Switch to the global view of `filter`, reloading the route catalogue.
    pub async fn set_region_filter(&self, filter: RegionFilter) -> Result<(), SessionError> {
        let transition = self
            .shared
            .begin_transition(ViewMode::Global(filter.clone()));
        let catalogue = self.shared.load_catalogue(&filter, transition.epoch).await;
        self.shared.load_global(&filter, &transition.ticket).await;
        catalogue
    }

    /// Show only the vehicles of `route_id`.
    ///
    /// If the route cannot be loaded the session falls back to the global
    /// view and the error is returned.
    pub async fn focus_route(&self, route_id: &str) -> Result<(), SessionError> {
        let transition = self
            .shared
            .begin_transition(ViewMode::Focused(route_id.to_string()));

        let Err(error) = self.shared.load_focused(route_id, &transition).await else {
            return Ok(());
        };

        let filter = self.shared.lock().region_filter.clone();
        if let Some(fallback) = self
            .shared
            .begin_transition_from(ViewMode::Global(filter.clone()), transition.epoch)
        {
            self.shared.load_global(&filter, &fallback.ticket).await;
        }
        Err(error)
    }

    /// Leave the focused view and return to the global one. No-op when
    /// already global.
    pub async fn close_focus(&self) {
        let filter = {
            let state = self.shared.lock();
            if !state.mode.is_focused() {
                return;
            }
            state.region_filter.clone()
        };

        let transition = self
            .shared
            .begin_transition(ViewMode::Global(filter.clone()));
        self.shared.load_global(&filter, &transition.ticket).await;
    }

    /// Re-enter the current mode with fresh data.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        match self.mode() {
            ViewMode::Global(filter) => self.set_region_filter(filter).await,
            ViewMode::Focused(route_id) => self.focus_route(&route_id).await,
        }
    }

    /// Hide or show vehicle markers. Hidden vehicles are not polled.
    ///
    /// Only vehicle loads are affected; a route or catalogue still in flight
    /// lands normally.
    pub async fn set_vehicles_visible(&self, visible: bool) {
        let (mode, ticket) = {
            let mut state = self.shared.lock();
            if state.vehicles_visible == visible {
                return;
            }
            state.vehicles_visible = visible;
            if !visible {
                info!("Hiding vehicles");
                state.scheduler.stop();
                self.shared.clear_displayed(&mut state);
                return;
            }
            (state.mode.clone(), state.scheduler.ticket())
        };

        info!("Showing vehicles");
        match mode {
            ViewMode::Global(filter) => self.shared.load_global(&filter, &ticket).await,
            ViewMode::Focused(route_id) => {
                self.shared.load_focused_vehicles(&route_id, &ticket).await;
            }
        }
    }

    /// Debounced route search scoped to the selected country.
    ///
    /// `Ok(None)` means a newer query superseded this one.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<RouteSummary>>, SessionError> {
        let country = self.shared.lock().region_filter.country.clone();
        self.shared
            .search
            .search(query, country.as_deref())
            .await
            .map_err(SessionError::Search)
    }

    pub async fn select_search_result(&self, result: &RouteSummary) -> Result<(), SessionError> {
        self.shared.search.cancel();
        self.focus_route(&result.id).await
    }

    pub async fn regions(&self) -> Result<Vec<Region>, SessionError> {
        self.shared
            .source
            .get_regions()
            .await
            .map_err(SessionError::Regions)
    }

    /// Crowded and delayed vehicles among those displayed.
    #[must_use]
    pub fn traffic_report(&self) -> TrafficReport {
        let state = self.shared.lock();
        TrafficReport::from_entities(state.displayed.iter().map(|d| &d.entity))
    }

    /// Focus the route of a report entry.
    pub async fn drill_down(&self, entry: &ReportEntry) -> Result<(), SessionError> {
        self.focus_route(&entry.route_id).await
    }

    #[must_use]
    pub fn locate(&self) -> MapTarget {
        let state = self.shared.lock();
        locate(state.route.as_ref(), &state.region_filter, &state.catalogue)
    }

    /// Advance marker animations to `now`, returning markers that moved.
    pub fn frame(&self, now: Instant) -> Vec<(VisualHandle, Position)> {
        self.shared.lock().motion.step(now)
    }

    /// Every displayed vehicle with its drawn position at `now`, by handle.
    #[must_use]
    pub fn rendered(&self, now: Instant) -> Vec<RenderedEntity> {
        let state = self.shared.lock();
        let mut rendered: Vec<RenderedEntity> = state
            .displayed
            .iter()
            .map(|d| RenderedEntity {
                handle: d.handle,
                position: state.motion.position(d.handle, now).unwrap_or(d.position),
                entity: d.entity.clone(),
            })
            .collect();
        rendered.sort_by_key(|r| r.handle);
        rendered
    }

    #[must_use]
    pub fn active_animations(&self, now: Instant) -> usize {
        self.shared.lock().motion.active_animations(now)
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let state = self.shared.lock();
        SessionStats {
            mode: state.mode.clone(),
            route_count: state.catalogue.len(),
            vehicle_count: state.displayed.len(),
            snapshots_applied: state.snapshots_applied,
            failed_fetches: state.failed_fetches,
            last_snapshot_at: state.last_snapshot_at,
            poll_generation: state.scheduler.generation(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ViewMode {
        self.shared.lock().mode.clone()
    }

    #[must_use]
    pub fn region_filter(&self) -> RegionFilter {
        self.shared.lock().region_filter.clone()
    }

    #[must_use]
    pub fn focused_route(&self) -> Option<Route> {
        self.shared.lock().route.clone()
    }

    /// Route catalogue for the current region.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.shared.lock().catalogue.clone()
    }

    #[must_use]
    pub fn displayed_ids(&self) -> HashSet<EntityId> {
        self.shared.lock().displayed.ids()
    }

    #[must_use]
    pub fn displayed_len(&self) -> usize {
        self.shared.lock().displayed.len()
    }

    #[must_use]
    pub fn handle_of(&self, id: &str) -> Option<VisualHandle> {
        self.shared.lock().displayed.handle_of(id)
    }

    #[must_use]
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.shared
            .lock()
            .displayed
            .get(id)
            .map(|d| d.entity.clone())
    }

    #[must_use]
    pub fn vehicles_visible(&self) -> bool {
        self.shared.lock().vehicles_visible
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.shared.lock().scheduler.is_running()
    }

    /// Mode the running poll loop serves.
    #[must_use]
    pub fn polling_mode(&self) -> Option<ViewMode> {
        self.shared
            .lock()
            .scheduler
            .active()
            .map(|handle| handle.mode().clone())
    }

    /// Poll loops started so far.
    #[must_use]
    pub fn poll_starts(&self) -> u64 {
        self.shared.lock().scheduler.starts()
    }

    /// Stop polling and drop every marker.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        state.scheduler.stop();
        self.shared.search.cancel();
        self.shared.clear_displayed(&mut state);
        info!("Session shut down");
    }
}

impl<S: DataSource + 'static> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DisplayEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Stop polling, destroy every marker and switch to `mode`.
    fn begin_transition(&self, mode: ViewMode) -> Transition {
        let mut state = self.lock();
        self.switch_mode(&mut state, mode)
    }

    /// Like [`Self::begin_transition`], unless another transition started
    /// after `epoch`.
    fn begin_transition_from(&self, mode: ViewMode, epoch: u64) -> Option<Transition> {
        let mut state = self.lock();
        if state.epoch != epoch {
            return None;
        }
        Some(self.switch_mode(&mut state, mode))
    }

    fn switch_mode(&self, state: &mut SessionState, mode: ViewMode) -> Transition {
        state.scheduler.stop();
        self.clear_displayed(state);
        if state.route.take().is_some() {
            self.emit(DisplayEvent::RouteCleared);
        }
        if let ViewMode::Global(filter) = &mode {
            state.region_filter = filter.clone();
        }

        info!("Switching view {} -> {}", state.mode, mode);
        state.mode = mode.clone();
        state.epoch += 1;
        self.emit(DisplayEvent::ModeChanged(mode));
        Transition {
            epoch: state.epoch,
            ticket: state.scheduler.ticket(),
        }
    }

    fn clear_displayed(&self, state: &mut SessionState) {
        state.motion.clear();
        for (id, handle) in state.displayed.clear() {
            self.emit(DisplayEvent::EntityRemoved { id, handle });
        }
    }

    async fn load_catalogue(&self, filter: &RegionFilter, epoch: u64) -> Result<(), SessionError> {
        match self.source.get_routes(filter).await {
            Ok(routes) => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    info!("Loaded {} routes for {}", routes.len(), filter);
                    state.catalogue = routes;
                }
                Ok(())
            }
            Err(source) => {
                warn!("Failed to load routes for {}: {}", filter, source);
                if self.lock().epoch != epoch {
                    return Ok(());
                }
                Err(SessionError::Catalogue {
                    filter: filter.clone(),
                    source,
                })
            }
        }
    }

    /// Initial global snapshot, then global polling.
    async fn load_global(self: &Arc<Self>, filter: &RegionFilter, ticket: &PollTicket) {
        let visible = self.lock().vehicles_visible;
        if !visible {
            return;
        }

        let snapshot = self.source.get_all_vehicles(filter).await;

        let mut state = self.lock();
        if !ticket.is_current() {
            debug!("Global snapshot for {} superseded", filter);
            return;
        }
        let mode = state.mode.clone();
        self.apply_result(&mut state, &mode, snapshot);
        self.start_polling(&mut state);
    }

    async fn load_focused(
        self: &Arc<Self>,
        route_id: &str,
        transition: &Transition,
    ) -> Result<(), SessionError> {
        let route = match self.source.get_route_details(route_id).await {
            Ok(route) => route,
            Err(source) => {
                warn!("Failed to load route {}: {}", route_id, source);
                if self.lock().epoch != transition.epoch {
                    return Ok(());
                }
                return Err(SessionError::Route {
                    route_id: route_id.to_string(),
                    source,
                });
            }
        };

        let load_vehicles = {
            let mut state = self.lock();
            if state.epoch != transition.epoch {
                debug!("Route {} loaded after the view moved on", route_id);
                return Ok(());
            }
            info!(
                "Loaded route {} {} ({} stops)",
                route.route_number,
                route.name,
                route.stops.len()
            );
            state.route = Some(route);
            self.emit(DisplayEvent::RouteLoaded(route_id.to_string()));
            // A visibility toggle since the transition owns the vehicle load
            transition.ticket.is_current()
        };

        if load_vehicles {
            self.load_focused_vehicles(route_id, &transition.ticket).await;
        }
        Ok(())
    }

    /// Initial route snapshot, then route polling.
    async fn load_focused_vehicles(self: &Arc<Self>, route_id: &str, ticket: &PollTicket) {
        let visible = self.lock().vehicles_visible;
        if !visible {
            return;
        }

        let snapshot = self.source.get_vehicle_positions(route_id).await;

        let mut state = self.lock();
        if !ticket.is_current() {
            debug!("Vehicle snapshot for route {} superseded", route_id);
            return;
        }
        let mode = state.mode.clone();
        self.apply_result(&mut state, &mode, snapshot);
        self.start_polling(&mut state);
    }

    fn start_polling(self: &Arc<Self>, state: &mut SessionState) {
        let mode = state.mode.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let task_mode = mode.clone();

        state
            .scheduler
            .start(mode, self.config.poll_interval, move |ticket| {
                let weak = Weak::clone(&weak);
                let mode = task_mode.clone();
                async move {
                    if let Some(shared) = weak.upgrade() {
                        shared.poll_once(&mode, ticket).await;
                    }
                }
            });
    }

    async fn poll_once(&self, mode: &ViewMode, ticket: PollTicket) {
        let snapshot = match mode {
            ViewMode::Global(filter) => self.source.get_all_vehicles(filter).await,
            ViewMode::Focused(route_id) => self.source.get_vehicle_updates(route_id).await,
        };

        let mut state = self.lock();
        if !ticket.is_current() {
            debug!(
                "Discarding {} snapshot from generation {}",
                mode,
                ticket.generation()
            );
            return;
        }
        self.apply_result(&mut state, mode, snapshot);
    }

    fn apply_result(
        &self,
        state: &mut SessionState,
        mode: &ViewMode,
        snapshot: FetchResult<Vec<Entity>>,
    ) {
        match snapshot {
            Ok(entities) => self.apply_snapshot(state, &entities),
            Err(error) => {
                state.failed_fetches += 1;
                warn!(
                    "{} snapshot failed, keeping {} vehicles: {}",
                    mode,
                    state.displayed.len(),
                    error
                );
                self.emit(DisplayEvent::SnapshotFailed {
                    mode: mode.clone(),
                    error,
                });
            }
        }
    }

    fn apply_snapshot(&self, state: &mut SessionState, entities: &[Entity]) {
        let now = tokio::time::Instant::now().into_std();
        let plan = reconcile(&state.displayed, entities);
        debug!(
            "Reconciled {} vehicles: {} added, {} updated, {} removed",
            entities.len(),
            plan.added.len(),
            plan.updated.len(),
            plan.removed.len()
        );
        let applied = state.displayed.apply(plan);

        for (id, handle) in applied.removed {
            state.motion.remove(handle);
            self.emit(DisplayEvent::EntityRemoved { id, handle });
        }

        for placed in applied.added {
            state.motion.place(placed.handle, placed.position);
            self.emit(DisplayEvent::EntityAdded {
                id: placed.id,
                handle: placed.handle,
                position: placed.position,
            });
        }

        for moved in applied.updated {
            if moved.from == moved.to {
                continue;
            }
            let from = state.motion.position(moved.handle, now).unwrap_or(moved.from);
            let animated = moved.distance_meters() >= self.config.jump_threshold_meters
                || state.motion.is_animating(moved.handle, now);
            if animated {
                state.motion.animate(
                    moved.handle,
                    from,
                    moved.to,
                    self.config.animation_duration,
                    now,
                );
            } else {
                state.motion.place(moved.handle, moved.to);
            }
            self.emit(DisplayEvent::EntityMoved {
                id: moved.id,
                handle: moved.handle,
                from,
                to: moved.to,
                animated,
            });
        }

        state.snapshots_applied += 1;
        state.last_snapshot_at = Some(Utc::now());
    }
}
