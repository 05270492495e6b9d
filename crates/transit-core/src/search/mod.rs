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

//! Debounced route search.
//!
//! Each keystroke calls [`SearchIndex::search`]. A call waits out the debounce
//! window first; a newer call cancels it, so a burst of keystrokes issues a
//! single backend request. Responses that arrive after a newer query was
//! submitted are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::model::RouteSummary;
use crate::source::{DataSource, FetchResult};

/// Quiet period after the last keystroke before a request is sent.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Route search with debounce and stale-response suppression.
#[derive(Debug)]
pub struct SearchIndex<S> {
    source: Arc<S>,
    debounce: Duration,
    sequence: AtomicU64,
    pending: Mutex<Option<CancellationToken>>,
}

impl<S: DataSource> SearchIndex<S> {
    pub fn new(source: Arc<S>, debounce: Duration) -> Self {
        Self {
            source,
            debounce,
            sequence: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Search routes by name or number, optionally limited to a country.
    ///
    /// Returns `Ok(None)` when a newer query superseded this one. An empty
    /// query resolves immediately to an empty list without a request.
    pub async fn search(
        &self,
        query: &str,
        country: Option<&str>,
    ) -> FetchResult<Option<Vec<RouteSummary>>> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.replace_pending(Some(token.clone())) {
            previous.cancel();
        }

        let query = query.trim();
        if query.is_empty() {
            return Ok(Some(Vec::new()));
        }

        tokio::select! {
            () = tokio::time::sleep(self.debounce) => {}
            () = token.cancelled() => {
                debug!("Search for {:?} superseded during debounce", query);
                return Ok(None);
            }
        }

        let result = tokio::select! {
            result = self.source.search_routes(query, country) => result,
            () = token.cancelled() => {
                debug!("Search for {:?} superseded in flight", query);
                return Ok(None);
            }
        };

        if self.sequence.load(Ordering::SeqCst) != sequence {
            return Ok(None);
        }
        result.map(Some)
    }

    /// Drop any pending query, e.g. when the search box is cleared.
    pub fn cancel(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.replace_pending(None) {
            previous.cancel();
        }
    }

    fn replace_pending(&self, token: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *pending, token)
    }
}
