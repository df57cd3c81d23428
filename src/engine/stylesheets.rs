//! Stylesheet discovery
//!
//! Turns the document's `<link>`/`<style>` elements into the instance's
//! [`StyleSheet`] list, honoring the include/exclude configuration. Print
//! stylesheets and cross-origin links are skipped silently, as are ids that
//! resolve to nothing; an unusable reference is never an error.

use crate::dom::{Document, StyleElement, StyleElementKind};
use crate::engine::PolyfillOptions;
use url::Url;

/// One stylesheet the engine will process
///
/// `css_text` is filled in exactly once, when the download completes (inline
/// sheets carry their text from the start); the sheet is immutable
/// afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
    /// Stable identifier: the href for links, a synthesized id for inline
    /// sheets. Doubles as the parse cache key for downloaded sheets.
    pub source_identifier: String,
    /// Download URL; `None` for inline sheets
    pub href: Option<String>,
    /// The element's `media` attribute, if any
    pub media_attribute: Option<String>,
    pub css_text: Option<String>,
}

/// Resolve the stylesheet list for one polyfill instance
pub fn resolve(document: &dyn Document, options: &PolyfillOptions) -> Vec<StyleSheet> {
    let elements = document.stylesheet_elements();
    let base = document.base_url();
    let mut sheets = Vec::new();

    if !options.include.is_empty() {
        // only the explicitly included elements, in include order
        for id in &options.include {
            let found = elements
                .iter()
                .find(|element| element.id.as_deref() == Some(id.as_str()));
            if let Some(element) = found {
                if let Some(sheet) = sheet_from(element, base.as_ref(), sheets.len()) {
                    sheets.push(sheet);
                }
            } else {
                log::debug!("include id not found in document: {}", id);
            }
        }
        return sheets;
    }

    // all stylesheets mode, minus the excluded ids
    for element in &elements {
        let excluded = element
            .id
            .as_ref()
            .is_some_and(|id| options.exclude.contains(id));
        if excluded {
            continue;
        }
        if let Some(sheet) = sheet_from(element, base.as_ref(), sheets.len()) {
            sheets.push(sheet);
        }
    }
    sheets
}

fn sheet_from(element: &StyleElement, base: Option<&Url>, index: usize) -> Option<StyleSheet> {
    match &element.kind {
        StyleElementKind::Inline { text } => {
            let source_identifier = element
                .id
                .clone()
                .unwrap_or_else(|| format!("inline:{}", index));
            Some(StyleSheet {
                source_identifier,
                href: None,
                media_attribute: None,
                css_text: Some(text.clone()),
            })
        }
        StyleElementKind::Link { rel, href, media } => {
            if !rel.eq_ignore_ascii_case("stylesheet") {
                return None;
            }
            if media.as_deref() == Some("print") {
                return None;
            }
            if !is_local(base, href) {
                log::debug!("skipping cross-origin stylesheet: {}", href);
                return None;
            }
            Some(StyleSheet {
                source_identifier: href.clone(),
                href: Some(href.clone()),
                media_attribute: media.clone(),
                css_text: None,
            })
        }
    }
}

/// Whether `href` resolves to the same origin as the document. With no base
/// URL there is nothing to compare against and every href counts as local.
fn is_local(base: Option<&Url>, href: &str) -> bool {
    let Some(base) = base else {
        return true;
    };
    Url::options()
        .base_url(Some(base))
        .parse(href)
        .map(|resolved| resolved.origin() == base.origin())
        .unwrap_or(false)
}
