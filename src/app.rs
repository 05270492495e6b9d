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

//! Console front end: drives the session's frame clock and prints what a map
//! renderer would draw.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use transit_core::{
    DataSource, DisplayEvent, FetchError, HttpDataSource, Session, SessionError, TrafficReport,
};

use crate::config::AppConfig;
use crate::status::{DiagnosticLevel, SystemStatus};
use crate::Args;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to create backend client: {0}")]
    Client(#[source] FetchError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub async fn run(config: AppConfig, args: Args) -> Result<(), AppError> {
    let source = HttpDataSource::new(config.source_config()).map_err(AppError::Client)?;
    info!("Using transit backend at {}", source.base_url());
    let session = Session::new(Arc::new(source), config.session_config());

    if args.list_regions {
        for region in session.regions().await? {
            println!(
                "{} {} ({}): {}",
                region.code,
                region.name,
                region.continent,
                region.cities.join(", ")
            );
        }
        return Ok(());
    }

    let mut events = session.subscribe();
    let mut status = SystemStatus::new();

    if let Err(e) = session.start().await {
        // Vehicles still load and poll; the catalogue comes back on refresh
        error!("{}", e);
        status.add_diagnostic(DiagnosticLevel::Error, e.to_string());
    }

    if let Some(route_id) = &args.route {
        session.focus_route(route_id).await?;
    } else if let Some(query) = &args.search {
        follow_first_match(&session, query).await?;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
        signal_token.cancel();
    });

    let mut frames = interval(config.frame_interval());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_ticks = interval(config.status_interval());
    status_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_status = Utc::now();
    let mut last_applied = 0;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = frames.tick() => {
                let moved = session.frame(Instant::now());
                status.record_frame(moved.len());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    log_event(&event, args.verbose_events);
                    status.record_event(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Display events lagged, skipped {}", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = status_ticks.tick() => {
                let stats = session.stats();
                if stats.snapshots_applied > last_applied {
                    status.record_quiet_snapshot();
                    last_applied = stats.snapshots_applied;
                }

                for diagnostic in status.diagnostics_since(last_status) {
                    if diagnostic.level != DiagnosticLevel::Info {
                        println!("  ! {}", diagnostic.message);
                    }
                }
                last_status = Utc::now();

                println!("{}", status.summary(&stats));
                if args.report {
                    print_report(&session.traffic_report());
                }
            }
        }
    }

    session.shutdown();
    Ok(())
}

async fn follow_first_match<S: DataSource + 'static>(
    session: &Session<S>,
    query: &str,
) -> Result<(), SessionError> {
    let Some(results) = session.search(query).await? else {
        return Ok(());
    };

    for result in &results {
        println!(
            "{:>6}  {} ({}, {}, {} stops)",
            result.route_number,
            result.name,
            result.kind.label(),
            result.city,
            result.stop_count
        );
    }

    match results.first() {
        Some(first) => session.select_search_result(first).await,
        None => {
            warn!("No routes match {:?}", query);
            Ok(())
        }
    }
}

fn log_event(event: &DisplayEvent, verbose: bool) {
    match event {
        DisplayEvent::ModeChanged(mode) => info!("View: {}", mode),
        DisplayEvent::RouteLoaded(route_id) => info!("Route {} loaded", route_id),
        DisplayEvent::RouteCleared => debug!("Route cleared"),
        DisplayEvent::SnapshotFailed { mode, error } => {
            warn!("{} update failed: {}", mode, error);
        }
        DisplayEvent::EntityAdded {
            id,
            handle,
            position,
        } if verbose => info!("+ {} {} at {}", handle, id, position),
        DisplayEvent::EntityMoved {
            id,
            handle,
            to,
            animated,
            ..
        } if verbose => info!(
            "~ {} {} -> {}{}",
            handle,
            id,
            to,
            if *animated { "" } else { " (jump)" }
        ),
        DisplayEvent::EntityRemoved { id, handle } if verbose => info!("- {} {}", handle, id),
        _ => {}
    }
}

fn print_report(report: &TrafficReport) {
    if report.is_empty() {
        return;
    }
    for entry in &report.crowded {
        println!(
            "  crowded  {:<8} {:>3}%  {}",
            entry.route_label, entry.occupancy_percent, entry.next_stops
        );
    }
    for entry in &report.delayed {
        println!(
            "  delayed  {:<8} {}  {}",
            entry.route_label, entry.status, entry.next_stops
        );
    }
}
