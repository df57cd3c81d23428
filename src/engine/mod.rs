//! Polyfill pipeline orchestration
//!
//! The engine ties the subsystems together: stylesheet discovery and
//! download, parsing, keyword filtering, media-query tracking, and the
//! match/unmatch notifications consumers build their polyfills on.

mod polyfill;
mod stylesheets;

pub use polyfill::{MatchCallback, Polyfill, PolyfillContext, PolyfillOptions};
pub use stylesheets::StyleSheet;
