//! Keyword filtering over parsed rule trees
//!
//! A polyfill only cares about the handful of rules that mention the feature
//! it emulates. [`RuleFilter`] walks a parsed tree depth-first, keeps the
//! rules matching the configured keyword patterns, and records the `@media`
//! and `@supports` conditions enclosing each kept rule so the engine knows
//! which media state the rule depends on.

use crate::css::tree::{Declaration, Node};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Keyword patterns selecting which CSS rules are relevant
///
/// `selectors` entries are substring patterns tested against a rule's
/// comma-joined selector list. `declarations` entries are `"property:value"`
/// pairs where `*` is a wildcard, each side matched anchored against a
/// declaration's property and value.
#[derive(Debug, Clone, Default)]
pub struct Keywords {
    pub selectors: Vec<String>,
    pub declarations: Vec<String>,
}

/// A rule that survived keyword filtering, annotated with its accumulated
/// media/supports context
///
/// `media` holds every ancestor media condition outer-to-inner; joining the
/// entries with `" and "` yields the single combined query the rule depends
/// on. `supports` accumulates independently along the same path. Empty means
/// absent.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FilteredRule {
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supports: Vec<String>,
}

impl FilteredRule {
    /// The comma-joined selector list
    pub fn selector_text(&self) -> String {
        self.selectors.join(", ")
    }

    /// Declarations as a property → value map
    pub fn declaration_map(&self) -> HashMap<String, String> {
        self.declarations
            .iter()
            .map(|d| (d.property.clone(), d.value.clone()))
            .collect()
    }

    /// The combined media query this rule depends on, or `None` when the
    /// rule applies unconditionally
    pub fn media_text(&self) -> Option<String> {
        (!self.media.is_empty()).then(|| self.media.join(" and "))
    }

    /// The combined supports condition, when any
    pub fn supports_text(&self) -> Option<String> {
        (!self.supports.is_empty()).then(|| self.supports.join(" and "))
    }
}

/// An ordered collection of filtered rules, as delivered to match/unmatch
/// callbacks
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    rules: Vec<Arc<FilteredRule>>,
}

impl Ruleset {
    pub fn new(rules: Vec<Arc<FilteredRule>>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<FilteredRule>> {
        self.rules.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FilteredRule>> {
        self.rules.iter()
    }

    pub fn rules(&self) -> &[Arc<FilteredRule>] {
        &self.rules
    }
}

/// Compiled keyword filter
pub struct RuleFilter {
    selectors: Vec<String>,
    declarations: Vec<(Regex, Regex)>,
}

impl RuleFilter {
    /// Compile the keyword patterns once; malformed declaration patterns
    /// (no `:` separator) are silently dropped
    pub fn new(keywords: &Keywords) -> Self {
        let declarations = keywords
            .declarations
            .iter()
            .filter_map(|pattern| {
                let (property, value) = pattern.split_once(':')?;
                Some((glob_regex(property)?, glob_regex(value)?))
            })
            .collect();
        Self {
            selectors: keywords.selectors.clone(),
            declarations,
        }
    }

    /// Filter a parsed tree, returning matching rules in document order
    pub fn filter(&self, nodes: &[Node]) -> Vec<Arc<FilteredRule>> {
        self.filter_with_context(nodes, &[], &[])
    }

    /// Filter with pre-seeded media/supports context, used for stylesheets
    /// whose `media` HTML attribute acts as an implicit enclosing `@media`
    pub fn filter_with_context(
        &self,
        nodes: &[Node],
        media: &[String],
        supports: &[String],
    ) -> Vec<Arc<FilteredRule>> {
        let mut matched = Vec::new();
        self.walk(nodes, media, supports, &mut matched);
        matched
    }

    fn walk(
        &self,
        nodes: &[Node],
        media: &[String],
        supports: &[String],
        matched: &mut Vec<Arc<FilteredRule>>,
    ) {
        for node in nodes {
            match node {
                Node::Rule(rule) => {
                    // selector match takes priority; either way the rule is
                    // emitted at most once, with all of its declarations
                    if self.matches_selectors(&rule.selectors)
                        || self.matches_declarations(&rule.declarations)
                    {
                        matched.push(Arc::new(FilteredRule {
                            selectors: rule.selectors.clone(),
                            declarations: rule.declarations.clone(),
                            media: media.to_vec(),
                            supports: supports.to_vec(),
                        }));
                    }
                }
                Node::Media(block) => {
                    let mut media = media.to_vec();
                    media.push(block.condition.clone());
                    self.walk(&block.rules, &media, supports, matched);
                }
                Node::Supports(block) => {
                    let mut supports = supports.to_vec();
                    supports.push(block.condition.clone());
                    self.walk(&block.rules, media, &supports, matched);
                }
                // keyframes, page and statement at-rules carry no
                // filterable style rules
                _ => {}
            }
        }
    }

    fn matches_selectors(&self, selectors: &[String]) -> bool {
        if self.selectors.is_empty() {
            return false;
        }
        let joined = selectors.join(",");
        self.selectors.iter().any(|pattern| joined.contains(pattern))
    }

    fn matches_declarations(&self, declarations: &[Declaration]) -> bool {
        declarations.iter().any(|declaration| {
            self.declarations.iter().any(|(property, value)| {
                property.is_match(&declaration.property) && value.is_match(&declaration.value)
            })
        })
    }
}

/// Compile a `*`-wildcard pattern into an anchored regex
fn glob_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern.trim()).replace("\\*", ".*");
    Regex::new(&format!("^{escaped}$")).ok()
}
