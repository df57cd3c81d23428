//! Recursive-descent CSS parser
//!
//! Converts raw stylesheet text into a [`Node`] tree. The grammar covers
//! plain rules plus the at-rules the polyfill pipeline cares about: `@media`,
//! `@supports`, `@keyframes`, `@page`, `@import`, `@charset` and
//! `@namespace`. Comments are stripped before parsing.
//!
//! The parser is tolerant by design: malformed or unterminated constructs
//! produce a best-effort partial tree, never an error. The cursor only moves
//! forward; at each position the at-rule productions are tried in a fixed
//! order before falling back to a plain rule, and a production either
//! consumes its construct or yields to the next alternative.

use crate::css::tree::{ConditionalBlock, Declaration, Keyframe, KeyframesBlock, Node, StyleRule};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// CSS parser with an explicitly clearable parse cache
///
/// The cache is keyed by a caller-supplied identifier (usually the stylesheet
/// URL), so repeated parses of the same sheet across polyfill instances
/// resolve without re-scanning the text. Share one parser per process via
/// `Arc` to get that behavior; `clear_cache` empties it.
pub struct CssParser {
    cache: RwLock<HashMap<String, Arc<Vec<Node>>>>,
}

impl CssParser {
    /// Create a new parser with an empty cache
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Parse CSS text into a node tree
    ///
    /// When `cache_key` is supplied and a prior parse with that key exists,
    /// the cached tree is returned without re-parsing.
    pub fn parse(&self, css: &str, cache_key: Option<&str>) -> Arc<Vec<Node>> {
        if let Some(key) = cache_key {
            if let Ok(cache) = self.cache.read() {
                if let Some(tree) = cache.get(key) {
                    return Arc::clone(tree);
                }
            }
        }

        let stripped = strip_comments(css);
        let mut cursor = Cursor::new(&stripped);
        let tree = Arc::new(cursor.rules());

        if let Some(key) = cache_key {
            if let Ok(mut cache) = self.cache.write() {
                cache.insert(key.to_string(), Arc::clone(&tree));
            }
        }
        tree
    }

    /// Drop every cached parse result
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

impl Default for CssParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove `/* ... */` comments; an unterminated comment swallows the rest
fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Forward-only parse cursor over comment-stripped CSS text
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.bump(rest.len() - trimmed.len());
    }

    /// Consume a literal prefix, returning whether it was present
    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.bump(prefix.len());
            true
        } else {
            false
        }
    }

    /// Opening brace plus trailing whitespace
    fn open(&mut self) -> bool {
        let opened = self.eat("{");
        if opened {
            self.skip_whitespace();
        }
        opened
    }

    /// Closing brace plus trailing whitespace; failure is tolerated by
    /// callers so truncated input still yields the nodes parsed so far
    fn close(&mut self) -> bool {
        let closed = self.eat("}");
        if closed {
            self.skip_whitespace();
        }
        closed
    }

    /// A `[-\w]+` identifier plus trailing whitespace
    fn ident(&mut self) -> Option<String> {
        let word: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if word.is_empty() {
            return None;
        }
        self.bump(word.len());
        self.skip_whitespace();
        Some(word)
    }

    /// Parse a rule list: the stylesheet top level, or the body of an
    /// `@media`/`@supports` block (which stops at the enclosing `}`)
    fn rules(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        self.skip_whitespace();
        while !self.eof() && self.peek() != Some('}') {
            match self.at_rule().or_else(|| self.rule()) {
                Some(node) => nodes.push(node),
                None => break,
            }
            self.skip_whitespace();
        }
        nodes
    }

    fn at_rule(&mut self) -> Option<Node> {
        if self.peek() != Some('@') {
            return None;
        }
        self.keyframes()
            .or_else(|| self.media())
            .or_else(|| self.supports())
            .or_else(|| self.statement("@import").map(Node::Import))
            .or_else(|| self.statement("@charset").map(Node::Charset))
            .or_else(|| self.statement("@namespace").map(Node::Namespace))
            .or_else(|| self.page())
    }

    /// `@keyframes name { frames }`, with optional vendor prefix
    fn keyframes(&mut self) -> Option<Node> {
        let word: String = self.rest()[1..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let vendor = word.strip_suffix("keyframes")?;
        let vendor = (!vendor.is_empty()).then(|| vendor.to_string());
        self.bump(1 + word.len());
        self.skip_whitespace();

        let name = self.ident()?;
        if !self.open() {
            return None;
        }
        let mut frames = Vec::new();
        while let Some(frame) = self.keyframe() {
            frames.push(frame);
        }
        self.close();
        Some(Node::Keyframes(KeyframesBlock {
            name,
            vendor,
            keyframes: frames,
        }))
    }

    /// One keyframe: `from`/`to`/percentage selectors plus a declaration block
    fn keyframe(&mut self) -> Option<Keyframe> {
        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            match self.keyframe_value() {
                Some(value) => values.push(value),
                None => break,
            }
            self.skip_whitespace();
            self.eat(",");
        }
        if values.is_empty() {
            return None;
        }
        let declarations = self.declarations()?;
        Some(Keyframe {
            values,
            declarations,
        })
    }

    fn keyframe_value(&mut self) -> Option<String> {
        let rest = self.rest();
        if rest.starts_with("from") {
            self.bump(4);
            return Some("from".to_string());
        }
        if rest.starts_with("to") {
            self.bump(2);
            return Some("to".to_string());
        }
        // percentage: digits and dots followed by '%'
        let digits = rest
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
            .count();
        if digits > 0 && rest[digits..].starts_with('%') {
            let value = rest[..digits + 1].to_string();
            self.bump(digits + 1);
            return Some(value);
        }
        None
    }

    fn media(&mut self) -> Option<Node> {
        let condition = self.condition("@media")?;
        if !self.open() {
            return None;
        }
        let rules = self.rules();
        self.close();
        Some(Node::Media(ConditionalBlock { condition, rules }))
    }

    fn supports(&mut self) -> Option<Node> {
        let condition = self.condition("@supports")?;
        if !self.open() {
            return None;
        }
        let rules = self.rules();
        self.close();
        Some(Node::Supports(ConditionalBlock { condition, rules }))
    }

    /// Match `keyword condition` up to (not including) the block's `{`.
    /// Nothing is consumed unless both the keyword and a non-empty condition
    /// are present.
    fn condition(&mut self, keyword: &str) -> Option<String> {
        let after = self.rest().strip_prefix(keyword)?;
        let condition_len = after.find('{').unwrap_or(after.len());
        let condition = after[..condition_len].trim();
        if condition.is_empty() {
            return None;
        }
        self.bump(keyword.len() + condition_len);
        Some(condition.to_string())
    }

    /// Statement-style at-rule: `@import url(...);` and friends. The
    /// terminating semicolon is required; nothing is consumed otherwise.
    fn statement(&mut self, keyword: &str) -> Option<String> {
        let after = self.rest().strip_prefix(keyword)?;
        let value_len = after.find([';', '\n']).unwrap_or(after.len());
        let value = after[..value_len].trim();
        if value.is_empty() || !after[value_len..].starts_with(';') {
            return None;
        }
        self.bump(keyword.len() + value_len + 1);
        self.skip_whitespace();
        Some(value.to_string())
    }

    /// `@page :first { declarations }`; margin at-rule blocks inside the
    /// body are consumed but not represented in the tree
    fn page(&mut self) -> Option<Node> {
        if !self.rest().starts_with("@page") {
            return None;
        }
        self.bump("@page".len());
        self.skip_whitespace();
        let selectors = self.selector().unwrap_or_default();
        if !self.open() {
            return None;
        }
        let mut declarations = Vec::new();
        loop {
            self.skip_whitespace();
            if let Some(declaration) = self.declaration() {
                declarations.push(declaration);
            } else if !self.margin_rule() {
                break;
            }
        }
        self.close();
        Some(Node::Page(StyleRule {
            selectors,
            declarations,
        }))
    }

    /// Margin at-rule inside `@page` (`@top-left { ... }`): skip it whole
    fn margin_rule(&mut self) -> bool {
        if self.peek() != Some('@') {
            return false;
        }
        self.bump(1);
        if self.ident().is_none() {
            return false;
        }
        self.declarations().is_some()
    }

    fn rule(&mut self) -> Option<Node> {
        let selectors = self.selector()?;
        let declarations = self.declarations()?;
        Some(Node::Rule(StyleRule {
            selectors,
            declarations,
        }))
    }

    /// Selector text up to the next `{`, split on top-level commas
    fn selector(&mut self) -> Option<Vec<String>> {
        let rest = self.rest();
        let len = rest.find('{')?;
        let text = &rest[..len];
        if text.trim().is_empty() {
            return None;
        }
        self.bump(len);
        Some(split_selector_list(text))
    }

    /// A `{}`-delimited declaration block; a missing closing brace at end of
    /// input still yields the declarations parsed so far
    fn declarations(&mut self) -> Option<Vec<Declaration>> {
        if !self.open() {
            return None;
        }
        let mut declarations = Vec::new();
        while let Some(declaration) = self.declaration() {
            declarations.push(declaration);
        }
        self.close();
        Some(declarations)
    }

    fn declaration(&mut self) -> Option<Declaration> {
        self.skip_whitespace();

        // property: optional star hack then word characters
        let rest = self.rest();
        let star = usize::from(rest.starts_with('*'));
        let word_len = rest[star..]
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len() - star);
        if word_len == 0 {
            return None;
        }
        let property = rest[..star + word_len].to_string();
        self.bump(star + word_len);
        self.skip_whitespace();

        if !self.eat(":") {
            return None;
        }
        self.skip_whitespace();

        let value = self.declaration_value()?;
        Some(Declaration { property, value })
    }

    /// Value text up to the next top-level `;` or `}`. Parentheses nest and
    /// quoted strings (with backslash escapes) are skipped whole, so
    /// `calc(100% - (1em + 2px))`, `rgba(0, 0, 0, 0.5)` and
    /// `url(data:image/png;base64,...)` are captured as single values.
    fn declaration_value(&mut self) -> Option<String> {
        let rest = self.rest();
        let mut depth = 0usize;
        let mut end = rest.len();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '\'' | '"' => {
                    while let Some((_, sc)) = chars.next() {
                        if sc == '\\' {
                            chars.next();
                        } else if sc == c {
                            break;
                        }
                    }
                }
                ';' | '}' if depth == 0 => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }

        let value = rest[..end].trim();
        if value.is_empty() {
            return None;
        }
        let value = value.to_string();
        self.bump(end);
        // trailing semicolons and whitespace
        while matches!(self.peek(), Some(';')) {
            self.bump(1);
            self.skip_whitespace();
        }
        self.skip_whitespace();
        Some(value)
    }
}

/// Split a selector list on commas that sit outside parentheses, brackets
/// and quoted strings, trimming each part
fn split_selector_list(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '\'' | '"' => {
                while let Some((_, sc)) = chars.next() {
                    if sc == '\\' {
                        chars.next();
                    } else if sc == c {
                        break;
                    }
                }
            }
            ',' if depth == 0 => {
                let part = text[start..i].trim();
                if !part.is_empty() {
                    parts.push(part.to_string());
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        parts.push(tail.to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(css: &str) -> Vec<Node> {
        CssParser::new().parse(css, None).as_ref().clone()
    }

    fn rule(node: &Node) -> &StyleRule {
        match node {
            Node::Rule(rule) => rule,
            other => panic!("expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_rule() {
        let nodes = parse("body { color: red; }");
        assert_eq!(nodes.len(), 1);
        let rule = rule(&nodes[0]);
        assert_eq!(rule.selectors, vec!["body"]);
        assert_eq!(rule.declarations, vec![Declaration::new("color", "red")]);
    }

    #[test]
    fn test_parse_selector_list_and_multiple_declarations() {
        let nodes = parse(".a, .b > span { color: blue; font-size: 16px; margin: 0 }");
        let rule = rule(&nodes[0]);
        assert_eq!(rule.selectors, vec![".a", ".b > span"]);
        assert_eq!(
            rule.declarations,
            vec![
                Declaration::new("color", "blue"),
                Declaration::new("font-size", "16px"),
                Declaration::new("margin", "0"),
            ]
        );
    }

    #[test]
    fn test_selector_commas_inside_functions_do_not_split() {
        let nodes = parse(":is(h1, h2), p { margin: 0; }");
        let rule = rule(&nodes[0]);
        assert_eq!(rule.selectors, vec![":is(h1, h2)", "p"]);
    }

    #[test]
    fn test_parse_media_block() {
        let nodes = parse("@media (min-width: 40em) { .c { position: sticky; } }");
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::Media(block) => {
                assert_eq!(block.condition, "(min-width: 40em)");
                assert_eq!(block.rules.len(), 1);
                assert_eq!(rule(&block.rules[0]).selectors, vec![".c"]);
            }
            other => panic!("expected media, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_media_blocks() {
        let nodes = parse(
            "@media (min-width: 40em) {\
               @media (max-width: 1000px) { .c { top: 0; } }\
             }",
        );
        match &nodes[0] {
            Node::Media(outer) => match &outer.rules[0] {
                Node::Media(inner) => {
                    assert_eq!(inner.condition, "(max-width: 1000px)");
                    assert_eq!(rule(&inner.rules[0]).selectors, vec![".c"]);
                }
                other => panic!("expected nested media, got {:?}", other),
            },
            other => panic!("expected media, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_supports_block() {
        let nodes = parse("@supports (display: grid) { .g { display: grid; } }");
        match &nodes[0] {
            Node::Supports(block) => {
                assert_eq!(block.condition, "(display: grid)");
                assert_eq!(block.rules.len(), 1);
            }
            other => panic!("expected supports, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_keyframes() {
        let nodes = parse(
            "@keyframes fade { from { opacity: 0; } 50% { opacity: 0.5; } to { opacity: 1; } }",
        );
        match &nodes[0] {
            Node::Keyframes(block) => {
                assert_eq!(block.name, "fade");
                assert_eq!(block.vendor, None);
                assert_eq!(block.keyframes.len(), 3);
                assert_eq!(block.keyframes[0].values, vec!["from"]);
                assert_eq!(block.keyframes[1].values, vec!["50%"]);
                assert_eq!(
                    block.keyframes[2].declarations,
                    vec![Declaration::new("opacity", "1")]
                );
            }
            other => panic!("expected keyframes, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_vendor_prefixed_keyframes() {
        let nodes = parse("@-webkit-keyframes spin { from { left: 0; } }");
        match &nodes[0] {
            Node::Keyframes(block) => {
                assert_eq!(block.name, "spin");
                assert_eq!(block.vendor.as_deref(), Some("-webkit-"));
            }
            other => panic!("expected keyframes, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_statement_at_rules() {
        let nodes = parse(
            "@charset \"utf-8\";\n@import url(\"theme.css\") screen;\n@namespace svg url(http://www.w3.org/2000/svg);",
        );
        assert_eq!(
            nodes,
            vec![
                Node::Charset("\"utf-8\"".to_string()),
                Node::Import("url(\"theme.css\") screen".to_string()),
                Node::Namespace("svg url(http://www.w3.org/2000/svg)".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_page_rule() {
        let nodes = parse("@page :first { margin: 1in; @top-left { content: \"x\"; } }");
        match &nodes[0] {
            Node::Page(rule) => {
                assert_eq!(rule.selectors, vec![":first"]);
                assert_eq!(rule.declarations, vec![Declaration::new("margin", "1in")]);
            }
            other => panic!("expected page, got {:?}", other),
        }
    }

    #[test]
    fn test_value_with_nested_parens_and_data_url() {
        let nodes = parse(
            ".x {\
               width: calc(100% - (1em + 2px));\
               background-image: url(data:image/png;base64,iVBORw0KGgo=);\
               content: \"a;b}\";\
             }",
        );
        let rule = rule(&nodes[0]);
        assert_eq!(
            rule.declarations,
            vec![
                Declaration::new("width", "calc(100% - (1em + 2px))"),
                Declaration::new(
                    "background-image",
                    "url(data:image/png;base64,iVBORw0KGgo=)"
                ),
                Declaration::new("content", "\"a;b}\""),
            ]
        );
    }

    #[test]
    fn test_star_hack_property() {
        let nodes = parse(".x { *zoom: 1; }");
        let rule = rule(&nodes[0]);
        assert_eq!(rule.declarations, vec![Declaration::new("*zoom", "1")]);
    }

    #[test]
    fn test_comments_are_stripped() {
        let nodes = parse("/* lead */ body { /* mid */ color: /* gone */ red; } /* tail */");
        let rule = rule(&nodes[0]);
        assert_eq!(rule.declarations, vec![Declaration::new("color", "red")]);
    }

    #[test]
    fn test_top_level_construct_order() {
        let css = "\
            @charset \"utf-8\";\n\
            @import url(a.css);\n\
            @namespace url(http://example.com);\n\
            body { color: red; }\n\
            @media screen { p { margin: 0; } }\n\
            @supports (display: flex) { .f { display: flex; } }\n\
            @keyframes k { to { top: 0; } }\n\
            @page { margin: 1cm; }\n";
        let nodes = parse(css);
        assert_eq!(nodes.len(), 8);
        assert!(matches!(nodes[0], Node::Charset(_)));
        assert!(matches!(nodes[1], Node::Import(_)));
        assert!(matches!(nodes[2], Node::Namespace(_)));
        assert!(matches!(nodes[3], Node::Rule(_)));
        assert!(matches!(nodes[4], Node::Media(_)));
        assert!(matches!(nodes[5], Node::Supports(_)));
        assert!(matches!(nodes[6], Node::Keyframes(_)));
        assert!(matches!(nodes[7], Node::Page(_)));
    }

    #[test]
    fn test_unterminated_block_yields_partial_tree() {
        let nodes = parse(".a { color: red; ");
        let rule = rule(&nodes[0]);
        assert_eq!(rule.declarations, vec![Declaration::new("color", "red")]);

        // garbage after a valid rule is dropped, the valid part survives
        let nodes = parse(".a { color: red; } @@@nonsense");
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_cache_returns_same_tree() {
        let parser = CssParser::new();
        let first = parser.parse(".a { color: red; }", Some("sheet.css"));
        // a different text with the same key must still hit the cache
        let second = parser.parse(".b { color: blue; }", Some("sheet.css"));
        assert!(Arc::ptr_eq(&first, &second));

        parser.clear_cache();
        let third = parser.parse(".b { color: blue; }", Some("sheet.css"));
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
