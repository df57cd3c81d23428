//! Parsed CSS rule tree
//!
//! The parser produces a flat list of [`Node`]s; `@media` and `@supports`
//! blocks nest further node lists, forming a tree. Nodes are plain data and
//! serialize to compact JSON shapes:
//!
//! - rule: `{"selectors": [...], "declarations": [...]}`
//! - media: `{"media": "...", "rules": [...]}`
//! - supports: `{"supports": "...", "rules": [...]}`
//! - keyframes: `{"name": "...", "keyframes": [...]}` (plus `"vendor"` when prefixed)
//! - page: `{"type": "page", "selectors": [...], "declarations": [...]}`
//! - import/charset/namespace: `{"import": "..."}` etc.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single `property: value` pair inside a declaration block
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// A plain style rule: selector list plus declaration block
///
/// Also used for `@page` rules, which share the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
}

/// An `@media` or `@supports` block: the raw condition text and the nested
/// rule list, which may itself contain further conditional blocks
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBlock {
    pub condition: String,
    pub rules: Vec<Node>,
}

/// A single frame inside an `@keyframes` block
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Keyframe {
    /// Frame selectors: `from`, `to` or percentages
    pub values: Vec<String>,
    pub declarations: Vec<Declaration>,
}

/// An `@keyframes` block, optionally vendor prefixed (`@-webkit-keyframes`)
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframesBlock {
    pub name: String,
    pub vendor: Option<String>,
    pub keyframes: Vec<Keyframe>,
}

/// A parsed CSS construct
///
/// Invariant: nesting forms a tree. A node's children are fully contained
/// within its source brace block.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Rule(StyleRule),
    Media(ConditionalBlock),
    Supports(ConditionalBlock),
    Keyframes(KeyframesBlock),
    Page(StyleRule),
    Import(String),
    Charset(String),
    Namespace(String),
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Rule(rule) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("selectors", &rule.selectors)?;
                map.serialize_entry("declarations", &rule.declarations)?;
                map.end()
            }
            Self::Media(block) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("media", &block.condition)?;
                map.serialize_entry("rules", &block.rules)?;
                map.end()
            }
            Self::Supports(block) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("supports", &block.condition)?;
                map.serialize_entry("rules", &block.rules)?;
                map.end()
            }
            Self::Keyframes(block) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("name", &block.name)?;
                if let Some(vendor) = &block.vendor {
                    map.serialize_entry("vendor", vendor)?;
                }
                map.serialize_entry("keyframes", &block.keyframes)?;
                map.end()
            }
            Self::Page(rule) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "page")?;
                map.serialize_entry("selectors", &rule.selectors)?;
                map.serialize_entry("declarations", &rule.declarations)?;
                map.end()
            }
            Self::Import(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("import", value)?;
                map.end()
            }
            Self::Charset(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("charset", value)?;
                map.end()
            }
            Self::Namespace(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("namespace", value)?;
                map.end()
            }
        }
    }
}
