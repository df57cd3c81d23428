//! CSS parsing and rule filtering

pub mod filter;
pub mod parser;
pub mod tree;

pub use filter::{FilteredRule, Keywords, RuleFilter, Ruleset};
pub use parser::CssParser;
pub use tree::{ConditionalBlock, Declaration, Keyframe, KeyframesBlock, Node, StyleRule};
