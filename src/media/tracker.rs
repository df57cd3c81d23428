//! Media-query change tracking
//!
//! Watches a set of combined media queries and reports the ones whose
//! matched state flipped. With native change subscriptions each query gets
//! its own listener and fires a singleton change batch. Without them a
//! single debounced resize listener re-evaluates every tracked query and
//! delivers all flips in one batch.
//!
//! Each tracker owns only its own host subscriptions, so multiple polyfill
//! instances tracking overlapping queries never interfere.

use crate::dom::Viewport;
use crate::media::MediaEvaluator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Queries whose matched state flipped, with the new state
pub type ChangeBatch = Vec<(String, bool)>;

/// Callback receiving each change batch
pub type ChangeListener = Arc<dyn Fn(&[(String, bool)]) + Send + Sync>;

/// Tracks match-state changes for one polyfill instance's query set
pub struct ChangeTracker {
    viewport: Arc<dyn Viewport>,
    evaluator: Arc<MediaEvaluator>,
    debounce: Duration,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    listening: bool,
    detached: bool,
    queries: Vec<String>,
    /// last known matched state per query, the baseline for diffing
    baseline: HashMap<String, bool>,
    subscriptions: Vec<crate::dom::ListenerId>,
    last_run: Option<Instant>,
}

impl ChangeTracker {
    pub fn new(
        viewport: Arc<dyn Viewport>,
        evaluator: Arc<MediaEvaluator>,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            viewport,
            evaluator,
            debounce,
            state: Mutex::new(TrackerState::default()),
        })
    }

    /// Snapshot the current matched state of every query and start
    /// listening for changes. Idempotent; a detached tracker stays detached.
    pub fn listen(self: &Arc<Self>, queries: Vec<String>, on_change: ChangeListener) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.listening || state.detached {
                return;
            }
            state.listening = true;
            for query in queries {
                if !state.queries.contains(&query) {
                    state.queries.push(query);
                }
            }
            let snapshot: HashMap<String, bool> = state
                .queries
                .iter()
                .map(|q| (q.clone(), self.evaluator.matches(q)))
                .collect();
            state.baseline = snapshot;
        }

        if self.viewport.supports_native_changes() {
            self.subscribe_native(on_change);
        } else {
            self.subscribe_resize(on_change);
        }
    }

    fn subscribe_native(self: &Arc<Self>, on_change: ChangeListener) {
        let queries = match self.state.lock() {
            Ok(state) => state.queries.clone(),
            Err(_) => return,
        };
        for query in queries {
            let tracker = Arc::downgrade(self);
            let listener = Arc::clone(&on_change);
            let tracked = query.clone();
            let id = self.viewport.subscribe_query(
                &query,
                Box::new(move |now_matches| {
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.native_fired(&tracked, now_matches, &listener);
                    }
                }),
            );
            if let Ok(mut state) = self.state.lock() {
                state.subscriptions.push(id);
            }
        }
    }

    fn subscribe_resize(self: &Arc<Self>, on_change: ChangeListener) {
        let tracker = Arc::downgrade(self);
        let id = self.viewport.subscribe_resize(Box::new(move || {
            if let Some(tracker) = tracker.upgrade() {
                tracker.resize_fired(&on_change);
            }
        }));
        if let Ok(mut state) = self.state.lock() {
            state.subscriptions.push(id);
        }
    }

    /// Native notification for a single query
    fn native_fired(&self, query: &str, now_matches: bool, on_change: &ChangeListener) {
        let flipped = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.detached {
                return;
            }
            if state.baseline.get(query) == Some(&now_matches) {
                false
            } else {
                state.baseline.insert(query.to_string(), now_matches);
                true
            }
        };
        if flipped {
            (**on_change)(&[(query.to_string(), now_matches)]);
        }
    }

    /// Resize fallback: re-evaluate everything, report all flips at once
    fn resize_fired(&self, on_change: &ChangeListener) {
        let batch = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.detached {
                return;
            }
            // debounce: drop events landing inside the window of the last
            // processed one
            if let Some(last) = state.last_run {
                if !self.debounce.is_zero() && last.elapsed() < self.debounce {
                    return;
                }
            }
            state.last_run = Some(Instant::now());

            // the viewport just changed; force fresh measurements
            self.evaluator.clear_cache();

            let mut batch: ChangeBatch = Vec::new();
            let queries = state.queries.clone();
            for query in queries {
                let now = self.evaluator.matches(&query);
                if state.baseline.get(&query) != Some(&now) {
                    batch.push((query.clone(), now));
                }
                state.baseline.insert(query, now);
            }
            batch
        };
        if !batch.is_empty() {
            (**on_change)(&batch);
        }
    }

    /// Remove every host subscription belonging to this tracker; terminal
    pub fn detach(&self) {
        let subscriptions = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.detached = true;
            std::mem::take(&mut state.subscriptions)
        };
        for id in subscriptions {
            self.viewport.unsubscribe(id);
        }
    }
}
