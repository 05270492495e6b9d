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

//! Live transit vehicle engine for map clients.
//!
//! Polls a transit backend for vehicle positions, reconciles each snapshot
//! against what is already drawn, and animates markers between reports. The
//! crate is split into layers that can be used on their own:
//!
//! - **Source layer**: the backend request contract and its HTTP client
//! - **Reconcile layer**: snapshot diffing and the displayed vehicle set
//! - **Motion layer**: eased, frame-sampled marker animation
//! - **Scheduler layer**: a single poll loop with generation tickets
//! - **Session layer**: global/focused view modes tying the rest together
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use transit_core::{HttpDataSource, HttpSourceConfig, Session, SessionConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let source = HttpDataSource::new(HttpSourceConfig::default()).unwrap();
//!     let session = Session::new(Arc::new(source), SessionConfig::default());
//!     session.start().await.unwrap();
//!
//!     loop {
//!         for (handle, position) in session.frame(Instant::now()) {
//!             println!("{handle} -> {position}");
//!         }
//!         tokio::time::sleep(Duration::from_millis(33)).await;
//!     }
//! }
//! ```
//!
//! # Reconciling Snapshots Directly
//!
//! ```
//! use transit_core::model::{Entity, Position};
//! use transit_core::reconcile::{reconcile, DisplayedEntitySet};
//!
//! let mut displayed = DisplayedEntitySet::new();
//! let snapshot = vec![Entity::new("bus_1", "route_1", Position::new(18.52, 73.85))];
//!
//! let plan = reconcile(&displayed, &snapshot);
//! assert_eq!(plan.added.len(), 1);
//!
//! displayed.apply(plan);
//! assert!(displayed.contains("bus_1"));
//! ```

pub mod model;
pub mod motion;
pub mod reconcile;
pub mod report;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{
    Entity, EntityId, Position, Region, RegionFilter, Route, RouteId, RouteSummary, VehicleKind,
    ViewMode,
};
pub use motion::MotionInterpolator;
pub use reconcile::{reconcile, DisplayedEntitySet, ReconciliationPlan, VisualHandle};
pub use report::{ReportEntry, TrafficReport};
pub use scheduler::{PollScheduler, PollTicket};
pub use search::SearchIndex;
pub use session::{
    DisplayEvent, MapTarget, RenderedEntity, Session, SessionConfig, SessionError, SessionStats,
};
pub use source::{DataSource, FetchError, FetchResult, HttpDataSource, HttpSourceConfig};
