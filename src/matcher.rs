//! Classification of DOM nodes as short-form promotion surfaces.
//!
//! Three classes come out of here: shelves (titled containers), items
//! (single cards/tiles), and tags (filter chips). Signals, strongest first:
//!
//! - a link into the dedicated short-form path segment (always reliable,
//!   matched by prefix),
//! - the bilingual vocabulary against titles and ARIA labels: exact match
//!   for shelf/section titles, substring for item text, so a category that
//!   merely contains the word as a substring is never swept up,
//! - structural containment: a shelf holding an already-classified item.

use crate::config::DetectionConfig;
use crate::dom::Document;
use crate::types::{Classification, NodeId};

pub struct Matcher {
    cfg: DetectionConfig,
}

impl Matcher {
    pub fn new(cfg: DetectionConfig) -> Self {
        Self { cfg }
    }

    /// Classify a node, or return None when it is not a short-form surface.
    ///
    /// `is_marked` reports whether a node already carries the suppression
    /// mark; it feeds the structural-containment rule. Detached or unknown
    /// nodes classify as None. Never panics.
    pub fn classify<F>(&self, doc: &Document, id: NodeId, is_marked: F) -> Option<Classification>
    where
        F: Fn(NodeId) -> bool,
    {
        let node = doc.node(id)?;

        if node.tag == "a" {
            if let Some(href) = node.attr("href") {
                if self.href_is_shorts(href) {
                    return Some(Classification::Item);
                }
            }
            return None;
        }

        if self.cfg.chip_containers.iter().any(|t| *t == node.tag) {
            if self.subtree_has_shorts_link(doc, id)
                || self.label_has_keyword_substring(doc, id)
            {
                return Some(Classification::Tag);
            }
            return None;
        }

        if self.cfg.item_containers.iter().any(|t| *t == node.tag) {
            if self.subtree_has_shorts_link(doc, id)
                || self.label_has_keyword_substring(doc, id)
            {
                return Some(Classification::Item);
            }
            return None;
        }

        let is_shelf_tag = self.cfg.shelf_containers.iter().any(|t| *t == node.tag);
        let is_section_tag = self.cfg.section_containers.iter().any(|t| *t == node.tag);
        if is_shelf_tag || is_section_tag {
            if let Some(title) = self.heading_text(doc, id) {
                if self.keyword_exact(&title) {
                    return Some(Classification::Shelf);
                }
            }
            if let Some(label) = doc.attr(id, "aria-label") {
                if self.keyword_exact(label) {
                    return Some(Classification::Shelf);
                }
            }
            // Structural containment applies to shelves only; sections are
            // the collapser's business and need the stricter all-marked rule.
            if is_shelf_tag {
                let contains_marked_item = doc.descendants(id).into_iter().any(|d| {
                    doc.node(d)
                        .map(|n| self.cfg.item_containers.iter().any(|t| *t == n.tag))
                        .unwrap_or(false)
                        && is_marked(d)
                });
                if contains_marked_item || self.subtree_has_shorts_link(doc, id) {
                    return Some(Classification::Shelf);
                }
            }
            return None;
        }

        None
    }

    /// Whether a link target points into the dedicated short-form path.
    /// Prefix match on the path segment; also accepts absolute URLs
    /// containing the segment.
    pub fn href_is_shorts(&self, href: &str) -> bool {
        let prefix = &self.cfg.shorts_path_prefix;
        href.starts_with(prefix.as_str()) || href.contains(prefix.as_str())
    }

    /// Trimmed, case-insensitive equality against the vocabulary
    fn keyword_exact(&self, text: &str) -> bool {
        let trimmed = text.trim().to_lowercase();
        self.cfg
            .keywords
            .iter()
            .any(|k| k.to_lowercase() == trimmed)
    }

    /// Case-insensitive substring against vocabulary and hashtag tokens
    fn keyword_substring(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        if lowered.is_empty() {
            return false;
        }
        self.cfg
            .hashtag_tokens
            .iter()
            .chain(self.cfg.keywords.iter())
            .any(|k| lowered.contains(&k.to_lowercase()))
    }

    fn label_has_keyword_substring(&self, doc: &Document, id: NodeId) -> bool {
        if let Some(label) = doc.attr(id, "aria-label") {
            if self.keyword_substring(label) {
                return true;
            }
        }
        self.keyword_substring(&doc.visible_text(id))
    }

    fn subtree_has_shorts_link(&self, doc: &Document, id: NodeId) -> bool {
        let check = |nid: NodeId| {
            doc.node(nid)
                .filter(|n| n.tag == "a")
                .and_then(|n| n.attr("href"))
                .map(|href| self.href_is_shorts(href))
                .unwrap_or(false)
        };
        check(id) || doc.descendants(id).into_iter().any(check)
    }

    /// Nearest enclosing item container of a node (a bare link is marked
    /// through its card when it has one)
    pub fn enclosing_item_container(&self, doc: &Document, id: NodeId) -> Option<NodeId> {
        doc.closest(id, |n| {
            self.cfg.item_containers.iter().any(|t| *t == n.tag)
        })
    }

    /// Text of the first heading node inside a shelf/section, if any
    pub fn heading_text(&self, doc: &Document, id: NodeId) -> Option<String> {
        for d in doc.descendants(id) {
            let node = doc.node(d)?;
            let tag_hit = self.cfg.heading_tags.iter().any(|t| *t == node.tag);
            let class_hit = node
                .attr("class")
                .map(|c| {
                    self.cfg
                        .heading_classes
                        .iter()
                        .any(|h| c.split_whitespace().any(|part| part == h))
                })
                .unwrap_or(false);
            if tag_hit || class_hit {
                let text = doc.visible_text(d);
                if !text.trim().is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }
}
