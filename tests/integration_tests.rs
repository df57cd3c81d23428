//! Integration tests for the cssfill engine
//!
//! These tests drive whole polyfill instances against simulated hosts and
//! verify the components work together correctly.

use cssfill::css::CssParser;
use cssfill::dom::{SimViewport, StaticDocument, Viewport};
use cssfill::network::{Downloader, Fetcher, StaticFetcher};
use cssfill::{Keywords, Polyfill, PolyfillContext, PolyfillOptions, Ruleset};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

const SITE_CSS: &str = "\
    .plain { position: sticky; top: 0; }\n\
    @media (min-width: 40em) { .wide { position: sticky; } }\n\
    @media print { .paper { position: sticky; } }\n";

fn sticky_options() -> PolyfillOptions {
    let mut options = PolyfillOptions::with_keywords(Keywords {
        declarations: vec!["position:sticky".to_string()],
        ..Keywords::default()
    });
    options.debounce_timeout_ms = 0;
    options
}

fn collecting() -> (
    impl Fn(&Ruleset) + Send + Sync + 'static,
    Arc<Mutex<Vec<Vec<String>>>>,
) {
    let calls: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let callback = move |ruleset: &Ruleset| {
        let selectors: Vec<String> = ruleset.iter().map(|r| r.selector_text()).collect();
        if let Ok(mut calls) = sink.lock() {
            calls.push(selectors);
        }
    };
    (callback, calls)
}

/// Two instances sharing a context cost one fetch per stylesheet; clearing
/// the download cache forces a refetch
#[test]
fn test_download_cache_is_shared_across_instances() {
    let fetcher = Arc::new(StaticFetcher::new());
    fetcher.insert("https://example.com/site.css", SITE_CSS);
    let viewport = Arc::new(SimViewport::new(800.0, 16.0));
    let document = StaticDocument::new()
        .with_base_url("https://example.com/")
        .with_link(None, "https://example.com/site.css", None);
    let context = PolyfillContext::with_services(
        Arc::new(document),
        Arc::clone(&viewport) as Arc<dyn Viewport>,
        Downloader::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>),
        Arc::new(CssParser::new()),
    );

    let first = Polyfill::new(context.clone(), sticky_options());
    let second = Polyfill::new(context.clone(), sticky_options());
    assert_eq!(context.downloader.request_count(), 1);
    assert_eq!(first.current_matches().len(), 2);
    assert_eq!(second.current_matches().len(), 2);

    context.downloader.clear_cache();
    let third = Polyfill::new(context.clone(), sticky_options());
    assert_eq!(context.downloader.request_count(), 2);
    assert_eq!(third.current_matches().len(), 2);
}

/// Full lifecycle: initial report, resize flips, destroy flush
#[test]
fn test_end_to_end_match_unmatch_cycle() {
    let viewport = Arc::new(SimViewport::new(800.0, 16.0));
    let document = StaticDocument::new().with_inline(None, SITE_CSS);
    let context = PolyfillContext::with_services(
        Arc::new(document),
        Arc::clone(&viewport) as Arc<dyn Viewport>,
        Downloader::new(Arc::new(StaticFetcher::new())),
        Arc::new(CssParser::new()),
    );
    let polyfill = Polyfill::new(context, sticky_options());

    let (matched, match_calls) = collecting();
    let (unmatched, unmatch_calls) = collecting();
    polyfill.do_matched(matched).undo_unmatched(unmatched);

    // 800px = 50em: .plain and .wide apply, the print rule never does
    {
        let initial = match_calls.lock().unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0], vec![".plain".to_string(), ".wide".to_string()]);
    }

    // 500px < 40em (640px): .wide unmatches, nothing new matches
    viewport.set_width(500.0);
    {
        let unmatches = unmatch_calls.lock().unwrap();
        assert_eq!(unmatches.len(), 1);
        assert_eq!(unmatches[0], vec![".wide".to_string()]);
        assert_eq!(match_calls.lock().unwrap().len(), 1);
    }

    // destroy reports what still matches, then goes quiet
    polyfill.destroy();
    {
        let unmatches = unmatch_calls.lock().unwrap();
        assert_eq!(unmatches.len(), 2);
        assert_eq!(unmatches[1], vec![".plain".to_string()]);
    }
    viewport.set_width(800.0);
    assert_eq!(match_calls.lock().unwrap().len(), 1);
    assert_eq!(unmatch_calls.lock().unwrap().len(), 2);
}

/// The parse cache makes a second instance skip re-parsing; the parse tree
/// serializes to the documented JSON shapes
#[test]
fn test_parse_cache_and_json_output() {
    let parser = CssParser::new();
    let first = parser.parse(SITE_CSS, Some("site.css"));
    let second = parser.parse(SITE_CSS, Some("site.css"));
    assert!(Arc::ptr_eq(&first, &second));

    let json = serde_json::to_value(first.as_ref()).unwrap();
    assert_eq!(json[0]["selectors"][0], ".plain");
    assert_eq!(json[1]["media"], "(min-width: 40em)");
    assert_eq!(json[1]["rules"][0]["selectors"][0], ".wide");
}

proptest! {
    /// The parser never panics, whatever the input
    #[test]
    fn test_parser_does_not_panic(css in "\\PC*") {
        let _ = CssParser::new().parse(&css, None);
    }

    /// Parsing plus filtering never panics on structured-ish garbage
    #[test]
    fn test_filter_does_not_panic(css in "[a-z@{}():;,.*\"' \\n-]{0,200}") {
        let tree = CssParser::new().parse(&css, None);
        let filter = cssfill::css::RuleFilter::new(&Keywords {
            selectors: vec![".a".to_string()],
            declarations: vec!["position:*".to_string()],
        });
        let _ = filter.filter(&tree);
    }
}
