//! The polyfill pipeline
//!
//! A [`Polyfill`] runs a strictly ordered pipeline the moment it is built:
//! resolve the stylesheet list, download the link texts, parse, filter by
//! keywords, build the media-query set, report initial matches, then start
//! change tracking. Downloads finish whenever they finish and the consumer
//! may register callbacks before or after any stage, so every stage is a
//! deferred task gated on a predicate over the accumulated state; a resolver
//! re-runs the stage checks to a fixpoint whenever state changes.

use crate::css::{CssParser, FilteredRule, Keywords, Node, RuleFilter, Ruleset};
use crate::dom::{Document, Viewport};
use crate::engine::stylesheets::{self, StyleSheet};
use crate::media::{ChangeTracker, MediaEvaluator};
use crate::network::{Downloader, HttpFetcher};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Callback receiving matched or unmatched rules
pub type MatchCallback = Arc<dyn Fn(&Ruleset) + Send + Sync>;

/// Configuration for one polyfill instance
#[derive(Debug, Clone)]
pub struct PolyfillOptions {
    /// Which rules are relevant to this polyfill
    pub keywords: Keywords,
    /// Restrict stylesheet discovery to exactly these element ids
    pub include: Vec<String>,
    /// Element ids to skip when scanning all stylesheets
    pub exclude: Vec<String>,
    /// Debounce window for resize-driven change detection, in milliseconds
    pub debounce_timeout_ms: u64,
}

impl Default for PolyfillOptions {
    fn default() -> Self {
        Self {
            keywords: Keywords::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            debounce_timeout_ms: 100,
        }
    }
}

impl PolyfillOptions {
    pub fn with_keywords(keywords: Keywords) -> Self {
        Self {
            keywords,
            ..Self::default()
        }
    }
}

/// Hosts and process-wide services shared by polyfill instances
///
/// Cloning the context shares the downloader and parse caches, which is how
/// several instances on one page avoid duplicate fetches and parses.
#[derive(Clone)]
pub struct PolyfillContext {
    pub document: Arc<dyn Document>,
    pub viewport: Arc<dyn Viewport>,
    pub downloader: Arc<Downloader>,
    pub parser: Arc<CssParser>,
}

impl PolyfillContext {
    /// Context with the default HTTP fetcher and a fresh parse cache
    pub fn new(document: Arc<dyn Document>, viewport: Arc<dyn Viewport>) -> Self {
        Self::with_services(
            document,
            viewport,
            Downloader::new(Arc::new(HttpFetcher::new())),
            Arc::new(CssParser::new()),
        )
    }

    /// Context over explicitly constructed services
    pub fn with_services(
        document: Arc<dyn Document>,
        viewport: Arc<dyn Viewport>,
        downloader: Arc<Downloader>,
        parser: Arc<CssParser>,
    ) -> Self {
        Self {
            document,
            viewport,
            downloader,
            parser,
        }
    }
}

/// A CSS feature polyfill instance
///
/// Construction starts the pipeline immediately. Register callbacks with
/// [`do_matched`](Self::do_matched) / [`undo_unmatched`](Self::undo_unmatched)
/// at any point; [`destroy`](Self::destroy) tears the instance down.
pub struct Polyfill {
    inner: Arc<PolyfillInner>,
}

struct PolyfillInner {
    context: PolyfillContext,
    options: PolyfillOptions,
    evaluator: Arc<MediaEvaluator>,
    tracker: Arc<ChangeTracker>,
    state: Mutex<PipelineState>,
}

#[derive(Default)]
struct PipelineState {
    stylesheets: Vec<StyleSheet>,
    texts_ready: bool,
    trees: Option<Vec<Arc<Vec<Node>>>>,
    filtered: Option<Vec<Arc<FilteredRule>>>,
    /// distinct combined media queries across the filtered rules
    queries: Option<Vec<String>>,
    initial_reported: bool,
    listening: bool,
    matched: Option<MatchCallback>,
    unmatched: Option<MatchCallback>,
    destroyed: bool,
    // resolver bookkeeping: tolerate re-entrant registration from callbacks
    resolving: bool,
    dirty: bool,
}

/// One runnable pipeline stage, extracted under the state lock and executed
/// outside it when it invokes consumer callbacks
enum Stage {
    Parse,
    Filter,
    BuildQuerySet,
    ReportInitial(MatchCallback),
    Listen(Vec<String>),
}

impl Polyfill {
    /// Build an instance and kick off its pipeline
    pub fn new(context: PolyfillContext, options: PolyfillOptions) -> Self {
        let evaluator = Arc::new(MediaEvaluator::new(Arc::clone(&context.viewport)));
        let tracker = ChangeTracker::new(
            Arc::clone(&context.viewport),
            Arc::clone(&evaluator),
            Duration::from_millis(options.debounce_timeout_ms),
        );
        let inner = Arc::new(PolyfillInner {
            context,
            options,
            evaluator,
            tracker,
            state: Mutex::new(PipelineState::default()),
        });
        inner.start();
        Self { inner }
    }

    /// Register the callback for rules whose media starts matching. Safe to
    /// call before or after the pipeline completes; once rules exist the
    /// current matches are reported exactly once.
    pub fn do_matched(&self, callback: impl Fn(&Ruleset) + Send + Sync + 'static) -> &Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.matched = Some(Arc::new(callback));
        }
        self.inner.resolve();
        self
    }

    /// Register the callback for rules whose media stops matching
    pub fn undo_unmatched(&self, callback: impl Fn(&Ruleset) + Send + Sync + 'static) -> &Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.unmatched = Some(Arc::new(callback));
        }
        self.inner.resolve();
        self
    }

    /// Snapshot of the filtered rules that currently apply: no media
    /// dependency, or a combined query that presently evaluates true
    pub fn current_matches(&self) -> Ruleset {
        self.inner.current_matches()
    }

    /// Tear the instance down: report everything currently matching through
    /// the unmatch callback, then detach all change listeners. A no-op when
    /// the pipeline never produced rules. Terminal.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl PolyfillInner {
    /// Stage 1 and 2: resolve the stylesheet list and request link texts
    fn start(self: &Arc<Self>) {
        let sheets = stylesheets::resolve(self.context.document.as_ref(), &self.options);
        let urls: Vec<String> = sheets.iter().filter_map(|s| s.href.clone()).collect();
        log::debug!(
            "pipeline start: {} stylesheet(s), {} to download",
            sheets.len(),
            urls.len()
        );

        if let Ok(mut state) = self.state.lock() {
            state.stylesheets = sheets;
            state.texts_ready = urls.is_empty();
        }
        if urls.is_empty() {
            self.resolve();
            return;
        }

        let instance = Arc::clone(self);
        self.context
            .downloader
            .request(&urls, move |texts| instance.texts_arrived(texts));
    }

    fn texts_arrived(self: &Arc<Self>, texts: Vec<String>) {
        if let Ok(mut state) = self.state.lock() {
            let mut texts = texts.into_iter();
            for sheet in state.stylesheets.iter_mut() {
                if sheet.href.is_some() {
                    sheet.css_text = texts.next();
                }
            }
            state.texts_ready = true;
        }
        self.resolve();
    }

    /// The resolver: run every stage whose precondition holds, repeating
    /// until none is runnable. Consumer callbacks run outside the state
    /// lock, and a callback that registers further callbacks re-enters here
    /// harmlessly: the in-progress resolver picks the new work up via the
    /// dirty flag.
    fn resolve(self: &Arc<Self>) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.resolving {
                state.dirty = true;
                return;
            }
            state.resolving = true;
        }
        loop {
            match self.next_stage() {
                Some(stage) => self.run(stage),
                None => {
                    let Ok(mut state) = self.state.lock() else {
                        return;
                    };
                    if state.dirty {
                        state.dirty = false;
                        continue;
                    }
                    state.resolving = false;
                    break;
                }
            }
        }
    }

    /// Find the first stage whose precondition is satisfied and mark it
    /// done, so re-entry can never run a stage twice
    fn next_stage(&self) -> Option<Stage> {
        let mut state = self.state.lock().ok()?;
        if state.destroyed {
            return None;
        }
        if state.texts_ready && state.trees.is_none() {
            return Some(Stage::Parse);
        }
        if state.trees.is_some() && state.filtered.is_none() {
            return Some(Stage::Filter);
        }
        if state.filtered.is_some() && state.queries.is_none() {
            return Some(Stage::BuildQuerySet);
        }
        if state.filtered.is_some() && !state.initial_reported {
            if let Some(matched) = state.matched.clone() {
                state.initial_reported = true;
                return Some(Stage::ReportInitial(matched));
            }
        }
        if state.filtered.is_some()
            && state.matched.is_some()
            && state.unmatched.is_some()
            && !state.listening
        {
            if let Some(queries) = state.queries.clone() {
                state.listening = true;
                return Some(Stage::Listen(queries));
            }
        }
        None
    }

    fn run(self: &Arc<Self>, stage: Stage) {
        match stage {
            Stage::Parse => {
                if let Ok(mut state) = self.state.lock() {
                    let trees = state
                        .stylesheets
                        .iter()
                        .map(|sheet| {
                            let text = sheet.css_text.as_deref().unwrap_or("");
                            // only URL-addressed sheets get a stable cache key
                            self.context.parser.parse(text, sheet.href.as_deref())
                        })
                        .collect();
                    state.trees = Some(trees);
                }
            }
            Stage::Filter => {
                if let Ok(mut state) = self.state.lock() {
                    let filter = RuleFilter::new(&self.options.keywords);
                    let mut rules = Vec::new();
                    if let Some(trees) = &state.trees {
                        for (sheet, tree) in state.stylesheets.iter().zip(trees.iter()) {
                            rules.extend(filter.filter_with_context(
                                tree,
                                &implicit_media(sheet),
                                &[],
                            ));
                        }
                    }
                    log::debug!("filter matched {} rule(s)", rules.len());
                    state.filtered = Some(rules);
                }
            }
            Stage::BuildQuerySet => {
                if let Ok(mut state) = self.state.lock() {
                    let mut queries = Vec::new();
                    for rule in state.filtered.iter().flatten() {
                        if let Some(query) = rule.media_text() {
                            if !queries.contains(&query) {
                                queries.push(query);
                            }
                        }
                    }
                    state.queries = Some(queries);
                }
            }
            Stage::ReportInitial(matched) => {
                let matches = self.current_matches();
                (*matched)(&matches);
            }
            Stage::Listen(queries) => {
                let instance = Arc::downgrade(self);
                self.tracker.listen(
                    queries,
                    Arc::new(move |batch: &[(String, bool)]| {
                        if let Some(instance) = Weak::upgrade(&instance) {
                            instance.change_batch(batch);
                        }
                    }),
                );
            }
        }
    }

    /// Partition the filtered rules by one change batch and notify the
    /// consumer, at most one call per callback per batch
    fn change_batch(&self, batch: &[(String, bool)]) {
        let (matched, unmatched, rules) = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            if state.destroyed {
                return;
            }
            (
                state.matched.clone(),
                state.unmatched.clone(),
                state.filtered.clone().unwrap_or_default(),
            )
        };

        let mut now_matching = Vec::new();
        let mut now_unmatching = Vec::new();
        for rule in rules {
            let Some(query) = rule.media_text() else {
                continue;
            };
            match batch.iter().find(|(q, _)| *q == query) {
                Some((_, true)) => now_matching.push(rule),
                Some((_, false)) => now_unmatching.push(rule),
                None => {}
            }
        }

        if !now_matching.is_empty() {
            if let Some(matched) = matched {
                (*matched)(&Ruleset::new(now_matching));
            }
        }
        if !now_unmatching.is_empty() {
            if let Some(unmatched) = unmatched {
                (*unmatched)(&Ruleset::new(now_unmatching));
            }
        }
    }

    fn current_matches(&self) -> Ruleset {
        let rules = {
            let Ok(state) = self.state.lock() else {
                return Ruleset::default();
            };
            state.filtered.clone().unwrap_or_default()
        };
        let matching = rules
            .into_iter()
            .filter(|rule| match rule.media_text() {
                None => true,
                Some(query) => self.evaluator.matches(&query),
            })
            .collect();
        Ruleset::new(matching)
    }

    fn destroy(&self) {
        let flush = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            if state.filtered.is_some() {
                state.unmatched.clone()
            } else {
                None
            }
        };
        if let Some(unmatched) = flush {
            let matches = self.current_matches();
            if !matches.is_empty() {
                (*unmatched)(&matches);
            }
            self.tracker.detach();
        }
    }
}

/// A stylesheet's `media` HTML attribute acts as an implicit enclosing
/// `@media` block; `all` and `screen` are meaningless in that role
fn implicit_media(sheet: &StyleSheet) -> Vec<String> {
    match sheet.media_attribute.as_deref() {
        Some(media) if media != "all" && media != "screen" => vec![media.to_string()],
        _ => Vec::new(),
    }
}
