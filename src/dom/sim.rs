//! Deterministic host implementations
//!
//! [`StaticDocument`] and [`SimViewport`] stand in for a real page in tests
//! and the CLI: the document is a fixed element list built up front, and the
//! viewport is a settable width whose changes fire resize listeners
//! synchronously. The simulated viewport has no native media matcher, so an
//! engine driven by it exercises the manual evaluation and resize-diffing
//! paths.

use crate::dom::{
    Document, ListenerId, QueryListener, ResizeListener, StyleElement, StyleElementKind, Viewport,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use url::Url;

/// A fixed document built from explicit stylesheet elements
#[derive(Debug, Clone, Default)]
pub struct StaticDocument {
    base_url: Option<Url>,
    elements: Vec<StyleElement>,
}

impl StaticDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL used for same-origin checks
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Url::parse(url).ok();
        self
    }

    /// Append an inline `<style>` element
    pub fn with_inline(mut self, id: Option<&str>, text: &str) -> Self {
        self.elements.push(StyleElement {
            id: id.map(str::to_string),
            kind: StyleElementKind::Inline {
                text: text.to_string(),
            },
        });
        self
    }

    /// Append a `<link rel="stylesheet">` element
    pub fn with_link(mut self, id: Option<&str>, href: &str, media: Option<&str>) -> Self {
        self.elements.push(StyleElement {
            id: id.map(str::to_string),
            kind: StyleElementKind::Link {
                rel: "stylesheet".to_string(),
                href: href.to_string(),
                media: media.map(str::to_string),
            },
        });
        self
    }

    /// Append an arbitrary element, e.g. a link with a different `rel`
    pub fn with_element(mut self, element: StyleElement) -> Self {
        self.elements.push(element);
        self
    }
}

impl Document for StaticDocument {
    fn stylesheet_elements(&self) -> Vec<StyleElement> {
        self.elements.clone()
    }

    fn base_url(&self) -> Option<Url> {
        self.base_url.clone()
    }
}

/// A simulated viewport with a settable width
///
/// `set_width` updates the width and fires every registered resize listener
/// synchronously, which makes change-tracking tests deterministic.
pub struct SimViewport {
    width: RwLock<f32>,
    em_size: f32,
    resize_listeners: Mutex<Vec<(ListenerId, Arc<ResizeListener>)>>,
    next_id: AtomicU64,
}

impl SimViewport {
    pub fn new(width: f32, em_size: f32) -> Self {
        Self {
            width: RwLock::new(width),
            em_size,
            resize_listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Change the viewport width and notify resize listeners
    pub fn set_width(&self, width: f32) {
        if let Ok(mut current) = self.width.write() {
            *current = width;
        }
        // snapshot first so a listener may unsubscribe while we iterate
        let listeners: Vec<Arc<ResizeListener>> = match self.resize_listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in listeners {
            (*listener)();
        }
    }

    /// Number of live resize subscriptions
    pub fn resize_listener_count(&self) -> usize {
        self.resize_listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl Viewport for SimViewport {
    fn width(&self) -> f32 {
        self.width.read().map(|w| *w).unwrap_or(0.0)
    }

    fn em_size(&self) -> f32 {
        self.em_size
    }

    fn native_match(&self, _query: &str) -> Option<bool> {
        None
    }

    fn supports_native_changes(&self) -> bool {
        false
    }

    fn subscribe_query(&self, _query: &str, _listener: QueryListener) -> ListenerId {
        // no native matcher; hand out an id that unsubscribe will ignore
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn subscribe_resize(&self, listener: ResizeListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.resize_listeners.lock() {
            listeners.push((id, Arc::new(listener)));
        }
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.resize_listeners.lock() {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_static_document_reports_elements_in_order() {
        let document = StaticDocument::new()
            .with_inline(Some("first"), ".a {}")
            .with_link(None, "https://example.com/site.css", Some("print"));
        let elements = document.stylesheet_elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].id.as_deref(), Some("first"));
        match &elements[1].kind {
            StyleElementKind::Link { media, .. } => assert_eq!(media.as_deref(), Some("print")),
            other => panic!("expected link, got {:?}", other),
        }
    }

    #[test]
    fn test_sim_viewport_fires_resize_listeners() {
        let viewport = SimViewport::new(500.0, 16.0);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let id = viewport.subscribe_resize(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        viewport.set_width(300.0);
        assert_eq!(viewport.width(), 300.0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        viewport.unsubscribe(id);
        viewport.set_width(800.0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(viewport.resize_listener_count(), 0);
    }
}
