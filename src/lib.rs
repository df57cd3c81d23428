//! # Cssfill - CSS Feature Polyfill Engine
//!
//! Given keyword patterns describing CSS selectors or `property: value`
//! declarations, cssfill acquires a document's stylesheets, parses them,
//! filters the rules down to the ones matching the patterns, works out which
//! of those currently apply under the viewport's active media queries, and
//! notifies consumer code as rules start and stop matching. Consumers use
//! the notifications to emulate CSS features the host doesn't support
//! (`position: sticky`, `:local-link`, ...) with script.
//!
//! ## Architecture
//!
//! - **css**: recursive-descent CSS parser and keyword rule filtering
//! - **media**: media-query evaluation and change tracking
//! - **network**: cached, coalescing stylesheet retrieval
//! - **dom**: host document/viewport seam traits plus deterministic
//!   simulations for tests and the CLI
//! - **engine**: the deferred pipeline tying the stages together
//! - **utils**: shared utilities and error types
//!
//! ## Example
//!
//! ```
//! use cssfill::dom::{SimViewport, StaticDocument};
//! use cssfill::{Keywords, Polyfill, PolyfillContext, PolyfillOptions};
//! use std::sync::Arc;
//!
//! let document = StaticDocument::new()
//!     .with_inline(None, "@media (max-width: 600px) { .m { position: sticky; } }");
//! let viewport = Arc::new(SimViewport::new(500.0, 16.0));
//! let context = PolyfillContext::new(Arc::new(document), viewport);
//!
//! let options = PolyfillOptions::with_keywords(Keywords {
//!     declarations: vec!["position:sticky".to_string()],
//!     ..Keywords::default()
//! });
//! let polyfill = Polyfill::new(context, options);
//! assert_eq!(polyfill.current_matches().len(), 1);
//! ```

pub mod css;
pub mod dom;
pub mod engine;
pub mod media;
pub mod network;
pub mod utils;

// Re-export main types for convenience
pub use css::{Declaration, FilteredRule, Keywords, Ruleset};
pub use engine::{Polyfill, PolyfillContext, PolyfillOptions};
pub use utils::error::{CssfillError, Result};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "cssfill";
