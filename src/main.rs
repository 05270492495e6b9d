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

mod app;
mod config;
mod status;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use config::AppConfig;

/// Live transit vehicle tracker
#[derive(Parser, Debug, Default)]
#[command(name = "transit-live", version, about)]
pub struct Args {
    /// Transit backend base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Country code to show (e.g. IN)
    #[arg(long)]
    pub country: Option<String>,

    /// City to show
    #[arg(long)]
    pub city: Option<String>,

    /// Follow this route after the initial load
    #[arg(long, conflicts_with = "search")]
    pub route: Option<String>,

    /// Search routes and follow the first match
    #[arg(long)]
    pub search: Option<String>,

    /// Vehicle poll interval in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Animation frames per second
    #[arg(long)]
    pub frame_rate: Option<u32>,

    /// Load routes but do not draw or poll vehicles
    #[arg(long)]
    pub hide_vehicles: bool,

    /// Print the regions with service and exit
    #[arg(long)]
    pub list_regions: bool,

    /// Print the traffic report with every status line
    #[arg(long)]
    pub report: bool,

    /// Log every marker add, move and removal
    #[arg(long)]
    pub verbose_events: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    pub save_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }
    };
    config.apply_args(&args);

    if args.save_config {
        match config.save() {
            Ok(()) => {
                if let Ok(path) = AppConfig::get_config_path() {
                    info!("Configuration saved to {}", path.display());
                }
            }
            Err(e) => warn!("Failed to save config: {}", e),
        }
    }

    match app::run(config, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
