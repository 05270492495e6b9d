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

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt::Write as _;

use transit_core::{DisplayEvent, SessionStats, ViewMode};

/// Backend reachability as seen from snapshot results
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedStatus {
    Connecting,
    Live,
    Error,
}

/// Diagnostic message with timestamp
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Console-side status: feed health, marker churn and diagnostics
#[derive(Debug)]
pub struct SystemStatus {
    pub feed_status: FeedStatus,
    pub last_error: Option<String>,
    /// Failures since the last good snapshot
    pub consecutive_failures: u32,

    // Marker statistics
    pub markers_added: u64,
    pub markers_moved: u64,
    pub markers_removed: u64,
    pub animated_moves: u64,

    // Moves per second (for the status line)
    pub moves_per_second: f64,
    pub moves_history: VecDeque<(DateTime<Utc>, u32)>, // Last 60 seconds of move counts

    // Diagnostic messages (keep last 50)
    pub diagnostics: VecDeque<DiagnosticMessage>,
    max_diagnostics: usize,

    // Frame metrics
    pub frames_rendered: u64,
    pub last_frame_moved: usize,
    pub average_frame_moved: f64,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemStatus {
    pub fn new() -> Self {
        Self {
            feed_status: FeedStatus::Connecting,
            last_error: None,
            consecutive_failures: 0,

            markers_added: 0,
            markers_moved: 0,
            markers_removed: 0,
            animated_moves: 0,

            moves_per_second: 0.0,
            moves_history: VecDeque::with_capacity(60),

            diagnostics: VecDeque::with_capacity(50),
            max_diagnostics: 50,

            frames_rendered: 0,
            last_frame_moved: 0,
            average_frame_moved: 0.0,
        }
    }

    /// Fold one display event into the counters
    pub fn record_event(&mut self, event: &DisplayEvent) {
        match event {
            DisplayEvent::EntityAdded { .. } => {
                self.markers_added += 1;
                self.mark_live();
            }
            DisplayEvent::EntityMoved { animated, .. } => {
                self.markers_moved += 1;
                if *animated {
                    self.animated_moves += 1;
                }
                self.record_move();
                self.mark_live();
            }
            DisplayEvent::EntityRemoved { .. } => {
                self.markers_removed += 1;
            }
            DisplayEvent::ModeChanged(mode) => {
                let message = match mode {
                    ViewMode::Global(filter) => format!("Showing all vehicles in {filter}"),
                    ViewMode::Focused(route_id) => format!("Following route {route_id}"),
                };
                self.add_diagnostic(DiagnosticLevel::Info, message);
            }
            DisplayEvent::RouteLoaded(route_id) => {
                self.add_diagnostic(DiagnosticLevel::Info, format!("Route {route_id} loaded"));
            }
            DisplayEvent::RouteCleared => {}
            DisplayEvent::SnapshotFailed { mode, error } => {
                self.feed_status = FeedStatus::Error;
                self.consecutive_failures += 1;
                self.last_error = Some(error.to_string());
                self.add_diagnostic(
                    DiagnosticLevel::Warning,
                    format!("{mode} update failed: {error}"),
                );
            }
        }
    }

    fn mark_live(&mut self) {
        if self.feed_status != FeedStatus::Live {
            if self.consecutive_failures > 0 {
                self.add_diagnostic(
                    DiagnosticLevel::Info,
                    format!(
                        "Feed recovered after {} failed updates",
                        self.consecutive_failures
                    ),
                );
            }
            self.feed_status = FeedStatus::Live;
        }
        self.consecutive_failures = 0;
    }

    /// Record a snapshot that applied cleanly but changed nothing
    pub fn record_quiet_snapshot(&mut self) {
        self.mark_live();
    }

    /// Record a marker move for the moves-per-second average
    pub fn record_move(&mut self) {
        self.record_move_at(Utc::now());
    }

    fn record_move_at(&mut self, now: DateTime<Utc>) {
        // Find or create entry for the current second
        match self.moves_history.back_mut() {
            Some((last_time, count)) if (now - *last_time).num_milliseconds() < 1000 => {
                *count += 1;
            }
            _ => self.moves_history.push_back((now, 1)),
        }

        // Remove entries older than 60 seconds
        while let Some((timestamp, _)) = self.moves_history.front() {
            if (now - *timestamp).num_seconds() > 60 {
                self.moves_history.pop_front();
            } else {
                break;
            }
        }

        // Average over the last 10 seconds
        let ten_secs_ago = now - chrono::Duration::seconds(10);
        let (moves, seconds) = self
            .moves_history
            .iter()
            .filter(|(timestamp, _)| *timestamp >= ten_secs_ago)
            .fold((0u32, 0u32), |(moves, seconds), (_, count)| {
                (moves + count, seconds + 1)
            });

        if seconds > 0 {
            self.moves_per_second = f64::from(moves) / f64::from(seconds);
        }
    }

    /// Update frame metrics
    pub fn record_frame(&mut self, moved: usize) {
        const ALPHA: f64 = 0.1; // Smoothing factor

        self.frames_rendered += 1;
        self.last_frame_moved = moved;
        #[expect(clippy::cast_precision_loss, reason = "marker counts are small")]
        let moved = moved as f64;
        if self.frames_rendered == 1 {
            self.average_frame_moved = moved;
        } else {
            self.average_frame_moved = ALPHA * moved + (1.0 - ALPHA) * self.average_frame_moved;
        }
    }

    /// Add a diagnostic message
    pub fn add_diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        let diagnostic = DiagnosticMessage {
            timestamp: Utc::now(),
            level,
            message,
        };

        self.diagnostics.push_back(diagnostic);

        // Keep only the last N messages
        while self.diagnostics.len() > self.max_diagnostics {
            self.diagnostics.pop_front();
        }
    }

    /// Diagnostics newer than `since`, oldest first
    pub fn diagnostics_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Iterator<Item = &DiagnosticMessage> {
        self.diagnostics.iter().filter(move |d| d.timestamp > since)
    }

    /// One-line summary for the console
    pub fn summary(&self, stats: &SessionStats) -> String {
        let feed = match self.feed_status {
            FeedStatus::Connecting => "connecting",
            FeedStatus::Live => "live",
            FeedStatus::Error => "error",
        };

        let mut line = format!(
            "[{}] {} | {} vehicles | {} routes | feed {}",
            Utc::now().format("%H:%M:%S"),
            stats.mode,
            stats.vehicle_count,
            stats.route_count,
            feed
        );
        if let Some(at) = stats.last_snapshot_at {
            let age = (Utc::now() - at).num_seconds().max(0);
            let _ = write!(line, " ({age}s ago)");
        }
        let _ = write!(
            line,
            " | {:.1} moves/s | {} ok / {} failed",
            self.moves_per_second, stats.snapshots_applied, stats.failed_fetches
        );
        line
    }
}
