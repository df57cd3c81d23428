//! Batched stylesheet retrieval
//!
//! The [`Downloader`] sits between the engine and the wire. It caches
//! stylesheet text by URL, coalesces concurrent requests for the same URL
//! into one fetch, and delivers each batch's texts in request order once
//! every URL in the batch has arrived. Actual retrieval goes through the
//! injected [`Fetcher`], so tests can serve canned responses or hold
//! completions back to exercise the deferred pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Retrieves the text of one URL and hands it to `done`
///
/// A fetcher that never invokes `done` (failure, or a deliberately held
/// test completion) leaves the waiting pipeline stalled; that is the
/// documented failure mode, there is no timeout.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, done: Box<dyn FnOnce(String) + Send>);
}

/// Fetcher backed by a blocking HTTP client
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, done: Box<dyn FnOnce(String) + Send>) {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text);
        match response {
            Ok(text) => done(text),
            Err(e) => log::warn!("stylesheet download failed for {}: {}", url, e),
        }
    }
}

/// Fetcher serving canned responses from memory
///
/// In immediate mode completions are delivered synchronously. In deferred
/// mode they are held until [`StaticFetcher::flush`], which lets tests
/// register callbacks against an instance whose downloads are still "in
/// flight". URLs with no configured response are dropped with a warning,
/// stalling the requester like a real failed download.
pub struct StaticFetcher {
    responses: RwLock<HashMap<String, String>>,
    held: Mutex<Vec<(String, Box<dyn FnOnce(String) + Send>)>>,
    defer: AtomicBool,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            held: Mutex::new(Vec::new()),
            defer: AtomicBool::new(false),
        }
    }

    /// Create a fetcher that holds completions until `flush`
    pub fn deferred() -> Self {
        let fetcher = Self::new();
        fetcher.defer.store(true, Ordering::SeqCst);
        fetcher
    }

    /// Configure the response body for a URL
    pub fn insert(&self, url: &str, body: &str) {
        if let Ok(mut responses) = self.responses.write() {
            responses.insert(url.to_string(), body.to_string());
        }
    }

    /// Deliver every held completion in arrival order
    pub fn flush(&self) {
        let held = match self.held.lock() {
            Ok(mut held) => std::mem::take(&mut *held),
            Err(_) => return,
        };
        for (url, done) in held {
            match self.body_for(&url) {
                Some(body) => done(body),
                None => log::warn!("no canned response for {}", url),
            }
        }
    }

    fn body_for(&self, url: &str) -> Option<String> {
        self.responses.read().ok()?.get(url).cloned()
    }
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str, done: Box<dyn FnOnce(String) + Send>) {
        if self.defer.load(Ordering::SeqCst) {
            if let Ok(mut held) = self.held.lock() {
                held.push((url.to_string(), done));
            }
            return;
        }
        match self.body_for(url) {
            Some(body) => done(body),
            None => log::warn!("no canned response for {}", url),
        }
    }
}

/// One pending batch request: the ordered URL list and its callback
struct Waiter {
    urls: Vec<String>,
    done: Box<dyn FnOnce(Vec<String>) + Send>,
}

struct DownloadState {
    cache: HashMap<String, String>,
    in_flight: HashSet<String>,
    waiters: Vec<Waiter>,
}

/// Caching, coalescing stylesheet downloader
///
/// Shared process-wide (one per [`crate::engine::PolyfillContext`] family)
/// so that multiple polyfill instances requesting the same stylesheet cost
/// one network fetch.
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<DownloadState>,
    request_count: AtomicUsize,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            state: Mutex::new(DownloadState {
                cache: HashMap::new(),
                in_flight: HashSet::new(),
                waiters: Vec::new(),
            }),
            request_count: AtomicUsize::new(0),
        })
    }

    /// Request the text of `urls`; `on_complete` receives the texts in the
    /// same order once all of them are available
    ///
    /// Cached URLs complete without fetching; URLs already in flight for
    /// another caller are not fetched twice.
    pub fn request(self: &Arc<Self>, urls: &[String], on_complete: impl FnOnce(Vec<String>) + Send + 'static) {
        let to_fetch = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.waiters.push(Waiter {
                urls: urls.to_vec(),
                done: Box::new(on_complete),
            });
            let mut to_fetch = Vec::new();
            for url in urls {
                if !state.cache.contains_key(url) && state.in_flight.insert(url.clone()) {
                    to_fetch.push(url.clone());
                }
            }
            to_fetch
        };

        // a batch of fully cached URLs completes right away
        self.drain_ready();

        for url in to_fetch {
            self.request_count.fetch_add(1, Ordering::SeqCst);
            let downloader = Arc::clone(self);
            let fetched = url.clone();
            self.fetcher.fetch(
                &url,
                Box::new(move |text| downloader.finish(fetched, text)),
            );
        }
    }

    /// Record one URL's text and complete any batches that are now ready
    fn finish(self: &Arc<Self>, url: String, text: String) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.in_flight.remove(&url);
            state.cache.insert(url, text);
        }
        self.drain_ready();
    }

    /// Complete every waiter whose URLs are all cached, invoking callbacks
    /// outside the lock so they may issue new requests
    fn drain_ready(&self) {
        let ready = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let mut ready = Vec::new();
            let mut i = 0;
            while i < state.waiters.len() {
                let satisfied = state.waiters[i]
                    .urls
                    .iter()
                    .all(|url| state.cache.contains_key(url));
                if satisfied {
                    let waiter = state.waiters.remove(i);
                    let texts = waiter
                        .urls
                        .iter()
                        .filter_map(|url| state.cache.get(url).cloned())
                        .collect::<Vec<_>>();
                    ready.push((waiter.done, texts));
                } else {
                    i += 1;
                }
            }
            ready
        };
        for (done, texts) in ready {
            done(texts);
        }
    }

    /// Drop all cached texts; in-flight fetches are unaffected
    pub fn clear_cache(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.cache.clear();
        }
    }

    /// Number of fetches actually issued, for tests and telemetry
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}
