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

//! Application configuration management.
//!
//! Configuration is stored in TOML through `confy` and can be overridden per
//! run from the command line. Missing fields fall back to their defaults, so
//! older config files keep loading as fields are added.

use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use transit_core::session::DEFAULT_JUMP_THRESHOLD_METERS;
use transit_core::source::http::DEFAULT_BASE_URL;
use transit_core::{HttpSourceConfig, RegionFilter, SessionConfig};

use crate::Args;

const APP_NAME: &str = "transit-live";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Transit backend base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Vehicle poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Marker animation length in milliseconds
    #[serde(default = "default_animation_duration_ms")]
    pub animation_duration_ms: u64,

    /// Moves shorter than this many meters jump instead of animating
    #[serde(default = "default_jump_threshold_meters")]
    pub jump_threshold_meters: f64,

    /// Quiet period after typing before a route search is sent
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Country code shown at startup (all countries when unset)
    #[serde(default)]
    pub default_country: Option<String>,

    /// City shown at startup
    #[serde(default)]
    pub default_city: Option<String>,

    /// Animation frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Seconds between status lines
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// Draw and poll vehicles
    #[serde(default = "default_true")]
    pub show_vehicles: bool,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_animation_duration_ms() -> u64 {
    4000
}

fn default_jump_threshold_meters() -> f64 {
    DEFAULT_JUMP_THRESHOLD_METERS
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_frame_rate() -> u32 {
    30
}

fn default_status_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            animation_duration_ms: default_animation_duration_ms(),
            jump_threshold_meters: default_jump_threshold_meters(),
            search_debounce_ms: default_search_debounce_ms(),
            default_country: None,
            default_city: None,
            frame_rate: default_frame_rate(),
            status_interval_secs: default_status_interval_secs(),
            show_vehicles: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Apply command-line overrides on top of the stored values
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.api_url {
            self.api_base_url.clone_from(url);
        }
        if let Some(country) = &args.country {
            self.default_country = Some(country.clone());
        }
        if let Some(city) = &args.city {
            self.default_city = Some(city.clone());
        }
        if let Some(ms) = args.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(rate) = args.frame_rate {
            self.frame_rate = rate;
        }
        if args.hide_vehicles {
            self.show_vehicles = false;
        }
    }

    /// Region shown at startup
    pub fn region_filter(&self) -> RegionFilter {
        RegionFilter {
            country: self.default_country.clone().filter(|c| !c.is_empty()),
            city: self.default_city.clone().filter(|c| !c.is_empty()),
        }
    }

    pub fn source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let poll_interval = Duration::from_millis(self.poll_interval_ms.max(500));
        let animation_duration = Duration::from_millis(self.animation_duration_ms);
        if animation_duration >= poll_interval {
            warn!(
                "Animation ({}ms) outlasts the poll interval ({}ms); markers retarget mid-move",
                animation_duration.as_millis(),
                poll_interval.as_millis()
            );
        }

        SessionConfig {
            poll_interval,
            animation_duration,
            jump_threshold_meters: self.jump_threshold_meters.max(0.0),
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            initial_filter: self.region_filter(),
            vehicles_visible: self.show_vehicles,
        }
    }

    /// Time between animation frames, from a frame rate clamped to 1-120
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.clamp(1, 120)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }
}
