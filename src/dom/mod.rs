//! Host document and viewport abstractions
//!
//! The engine never touches a real DOM. Everything it needs from the
//! embedding page goes through two seam traits: [`Document`] enumerates the
//! page's stylesheet elements, [`Viewport`] reports widths and dispatches
//! media/resize notifications. A browser embedding implements these against
//! its own machinery; [`sim`] provides deterministic in-process
//! implementations for tests and the CLI.

pub mod sim;

pub use sim::{SimViewport, StaticDocument};

use url::Url;

/// Opaque handle identifying one listener registration
pub type ListenerId = u64;

/// Listener for native per-query match-state changes; receives the new state
pub type QueryListener = Box<dyn Fn(bool) + Send + Sync>;

/// Listener for viewport resize events
pub type ResizeListener = Box<dyn Fn() + Send + Sync>;

/// One `<link>` or `<style>` element as the document reports it
#[derive(Debug, Clone, PartialEq)]
pub struct StyleElement {
    pub id: Option<String>,
    pub kind: StyleElementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StyleElementKind {
    /// Inline `<style>` contents, available without a download
    Inline { text: String },
    /// A `<link>` reference; `media` is the element's media attribute
    Link {
        rel: String,
        href: String,
        media: Option<String>,
    },
}

/// The document side of the host: stylesheet discovery
#[cfg_attr(test, mockall::automock)]
pub trait Document: Send + Sync {
    /// The document's stylesheet elements in document order
    fn stylesheet_elements(&self) -> Vec<StyleElement>;

    /// Base URL used for resolving hrefs and same-origin checks; `None`
    /// disables the origin check (every href counts as local)
    fn base_url(&self) -> Option<Url>;
}

/// The viewport side of the host: measurements and change notification
pub trait Viewport: Send + Sync {
    /// Current viewport width in pixels
    fn width(&self) -> f32;

    /// The pixel value of `1em` as used in media queries. This is the
    /// browser's default font size (usually 16px), not the page's styled
    /// font size; hosts measure it once and cache it.
    fn em_size(&self) -> f32;

    /// Evaluate a query with the host's native matcher, or `None` when no
    /// native matcher exists
    fn native_match(&self, query: &str) -> Option<bool>;

    /// Whether native per-query change subscriptions are available
    fn supports_native_changes(&self) -> bool;

    /// Subscribe to native match-state changes for one query
    fn subscribe_query(&self, query: &str, listener: QueryListener) -> ListenerId;

    /// Subscribe to viewport resize events
    fn subscribe_resize(&self, listener: ResizeListener) -> ListenerId;

    /// Remove a previous subscription; unknown ids are ignored
    fn unsubscribe(&self, id: ListenerId);
}
