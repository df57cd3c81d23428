//! Media query evaluation
//!
//! Prefers the host's native matcher, which understands the full media-query
//! grammar. Without one, queries are evaluated manually: only `min-width`
//! and `max-width` constraints (px or em) are understood, everything else in
//! the query is ignored. The strategy is picked once at construction.

use crate::dom::Viewport;
use regex::Regex;
use std::sync::{Arc, RwLock};

/// Evaluates whether a media-query string currently matches
pub struct MediaEvaluator {
    viewport: Arc<dyn Viewport>,
    strategy: Strategy,
}

enum Strategy {
    Native,
    Manual(ManualMatcher),
}

impl MediaEvaluator {
    /// Detect the host capability once and fix the evaluation strategy
    pub fn new(viewport: Arc<dyn Viewport>) -> Self {
        // the probe query matches everywhere, so `Some(true)` means a
        // working native matcher
        let strategy = if viewport.native_match("only all") == Some(true) {
            Strategy::Native
        } else {
            Strategy::Manual(ManualMatcher::new())
        };
        Self { viewport, strategy }
    }

    /// Whether `query` matches the current viewport state
    pub fn matches(&self, query: &str) -> bool {
        match &self.strategy {
            Strategy::Native => self.viewport.native_match(query).unwrap_or(false),
            Strategy::Manual(matcher) => matcher.matches(query, self.viewport.as_ref()),
        }
    }

    /// Invalidate the cached viewport width and em measurement; call after
    /// a resize so the next evaluation re-reads the host
    pub fn clear_cache(&self) {
        if let Strategy::Manual(matcher) = &self.strategy {
            matcher.clear_cache();
        }
    }
}

/// Manual `min-width`/`max-width` evaluation against the viewport width
struct ManualMatcher {
    re_min: Option<Regex>,
    re_max: Option<Regex>,
    // measurements are expensive on a real host, so both are cached until
    // the next clear_cache
    width: RwLock<Option<f32>>,
    em_size: RwLock<Option<f32>>,
}

impl ManualMatcher {
    fn new() -> Self {
        Self {
            re_min: Regex::new(r"\(min-width:\s*([0-9.]+)(px|em)\s*\)").ok(),
            re_max: Regex::new(r"\(max-width:\s*([0-9.]+)(px|em)\s*\)").ok(),
            width: RwLock::new(None),
            em_size: RwLock::new(None),
        }
    }

    fn matches(&self, query: &str, viewport: &dyn Viewport) -> bool {
        let width = self.cached(&self.width, || viewport.width());
        let min = self.constraint(&self.re_min, query, viewport);
        let max = self.constraint(&self.re_max, query, viewport);
        match (min, max) {
            (Some(min), Some(max)) => min <= width && max >= width,
            (Some(min), None) => min <= width,
            (None, Some(max)) => max >= width,
            // nothing we understand in the query
            (None, None) => false,
        }
    }

    /// Extract one width constraint in pixels, resolving em through the
    /// host's measured default font size
    fn constraint(&self, re: &Option<Regex>, query: &str, viewport: &dyn Viewport) -> Option<f32> {
        let captures = re.as_ref()?.captures(query)?;
        let number: f32 = captures.get(1)?.as_str().parse().ok()?;
        if captures.get(2)?.as_str() == "em" {
            let em = self.cached(&self.em_size, || viewport.em_size());
            Some(number * em)
        } else {
            Some(number)
        }
    }

    fn cached(&self, slot: &RwLock<Option<f32>>, compute: impl FnOnce() -> f32) -> f32 {
        if let Ok(cached) = slot.read() {
            if let Some(value) = *cached {
                return value;
            }
        }
        let value = compute();
        if let Ok(mut cached) = slot.write() {
            *cached = Some(value);
        }
        value
    }

    fn clear_cache(&self) {
        if let Ok(mut width) = self.width.write() {
            *width = None;
        }
        if let Ok(mut em) = self.em_size.write() {
            *em = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SimViewport;

    fn evaluator(width: f32, em: f32) -> (Arc<SimViewport>, MediaEvaluator) {
        let viewport = Arc::new(SimViewport::new(width, em));
        let evaluator = MediaEvaluator::new(Arc::clone(&viewport) as Arc<dyn Viewport>);
        (viewport, evaluator)
    }

    #[test]
    fn test_min_width_em_resolution() {
        // 500px viewport, 16px em: 30em = 480px matches, 40em = 640px does not
        let (_, evaluator) = evaluator(500.0, 16.0);
        assert!(evaluator.matches("(min-width: 30em)"));
        assert!(!evaluator.matches("(min-width: 40em)"));
    }

    #[test]
    fn test_min_and_max_px() {
        let (_, evaluator) = evaluator(500.0, 16.0);
        assert!(evaluator.matches("(min-width: 400px)"));
        assert!(!evaluator.matches("(min-width: 600px)"));
        assert!(evaluator.matches("(max-width: 600px)"));
        assert!(!evaluator.matches("(max-width: 400px)"));
    }

    #[test]
    fn test_both_constraints_must_hold() {
        let (_, evaluator) = evaluator(500.0, 16.0);
        assert!(evaluator.matches("(min-width: 400px) and (max-width: 600px)"));
        assert!(!evaluator.matches("(min-width: 400px) and (max-width: 450px)"));
        assert!(!evaluator.matches("(min-width: 550px) and (max-width: 600px)"));
    }

    #[test]
    fn test_unsupported_query_is_a_non_match() {
        let (_, evaluator) = evaluator(500.0, 16.0);
        assert!(!evaluator.matches("(orientation: landscape)"));
        assert!(!evaluator.matches("screen"));
        // an understood constraint still decides even with noise around it
        assert!(evaluator.matches("screen and (min-width: 400px) and (color)"));
    }

    #[test]
    fn test_width_is_cached_until_cleared() {
        let (viewport, evaluator) = evaluator(500.0, 16.0);
        assert!(evaluator.matches("(min-width: 400px)"));

        // width changes are invisible until the cache is cleared
        viewport.set_width(300.0);
        assert!(evaluator.matches("(min-width: 400px)"));

        evaluator.clear_cache();
        assert!(!evaluator.matches("(min-width: 400px)"));
    }

    #[test]
    fn test_native_matcher_is_preferred() {
        struct NativeViewport;
        impl Viewport for NativeViewport {
            fn width(&self) -> f32 {
                0.0
            }
            fn em_size(&self) -> f32 {
                16.0
            }
            fn native_match(&self, query: &str) -> Option<bool> {
                Some(query == "only all" || query.contains("min-width"))
            }
            fn supports_native_changes(&self) -> bool {
                true
            }
            fn subscribe_query(
                &self,
                _query: &str,
                _listener: crate::dom::QueryListener,
            ) -> crate::dom::ListenerId {
                0
            }
            fn subscribe_resize(
                &self,
                _listener: crate::dom::ResizeListener,
            ) -> crate::dom::ListenerId {
                0
            }
            fn unsubscribe(&self, _id: crate::dom::ListenerId) {}
        }

        let evaluator = MediaEvaluator::new(Arc::new(NativeViewport));
        // width of 0 would fail manually; the native answer wins
        assert!(evaluator.matches("(min-width: 99999px)"));
        assert!(!evaluator.matches("(orientation: portrait)"));
    }
}
