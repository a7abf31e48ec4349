//! Suppression marking and the enforcing stylesheet.
//!
//! Two layers hide content. The stylesheet carries a static allow-list of
//! structurally-reliable surfaces (navigation entries, reel renderers) and a
//! rule for the suppression mark, which hides those with zero latency the
//! moment it is inserted. The dynamic layer is `mark`, which tags nodes the
//! matcher classified and records them in the processed set. The host page
//! strips injected nodes during its own re-renders, so the stylesheet is
//! re-inserted whenever a periodic check finds it missing.

use crate::config::DetectionConfig;
use crate::dom::{Document, Node};
use crate::types::NodeId;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Attribute carrying the suppression mark
pub const HIDDEN_MARK: &str = "data-shorts-shield-hidden";

/// HTML id of the injected style node
pub const STYLE_HTML_ID: &str = "shorts-shield-style";

/// Attribute condition operator in a static selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Prefix,
    Contains,
}

/// One compiled static selector: `tag`, `tag[attr=v]`, `tag[attr^=v]`,
/// `tag[attr*=v]`, or `[attr...=v]` with no tag
#[derive(Debug, Clone)]
struct StaticRule {
    source: String,
    tag: Option<String>,
    attr: Option<(String, AttrOp, String)>,
}

impl StaticRule {
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return None;
        }
        let (tag_part, attr_part) = match selector.find('[') {
            Some(idx) => {
                let rest = &selector[idx + 1..];
                let inner = rest.strip_suffix(']')?;
                (&selector[..idx], Some(inner))
            }
            None => (selector, None),
        };
        let tag = (!tag_part.is_empty()).then(|| tag_part.to_string());
        let attr = match attr_part {
            Some(inner) => {
                let (name, op, value) = if let Some((n, v)) = inner.split_once("^=") {
                    (n, AttrOp::Prefix, v)
                } else if let Some((n, v)) = inner.split_once("*=") {
                    (n, AttrOp::Contains, v)
                } else if let Some((n, v)) = inner.split_once('=') {
                    (n, AttrOp::Equals, v)
                } else {
                    return None;
                };
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), op, value.trim_matches('"').to_string()))
            }
            None => None,
        };
        if tag.is_none() && attr.is_none() {
            return None;
        }
        Some(Self {
            source: selector.to_string(),
            tag,
            attr,
        })
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if node.tag != *tag {
                return false;
            }
        }
        if let Some((name, op, value)) = &self.attr {
            let Some(actual) = node.attr(name) else {
                return false;
            };
            return match op {
                AttrOp::Equals => actual == value,
                AttrOp::Prefix => actual.starts_with(value.as_str()),
                AttrOp::Contains => actual.contains(value.as_str()),
            };
        }
        true
    }
}

/// Applies and removes suppression marks and owns the processed set
pub struct Suppressor {
    rules: Vec<StaticRule>,
    processed: HashSet<NodeId>,
}

impl Suppressor {
    pub fn new(cfg: &DetectionConfig) -> Self {
        let rules = cfg
            .static_hidden_selectors
            .iter()
            .filter_map(|sel| {
                let rule = StaticRule::parse(sel);
                if rule.is_none() {
                    warn!("Ignoring unparsable static selector '{}'", sel);
                }
                rule
            })
            .collect();
        Self {
            rules,
            processed: HashSet::new(),
        }
    }

    /// Idempotently mark a node hidden and record it as processed.
    /// Returns true only when the mark is newly applied.
    pub fn mark(&mut self, doc: &mut Document, id: NodeId) -> bool {
        if doc.node(id).is_none() {
            return false;
        }
        self.processed.insert(id);
        if doc.attr(id, HIDDEN_MARK) == Some("1") {
            return false;
        }
        doc.set_attr(id, HIDDEN_MARK, "1");
        true
    }

    pub fn is_marked(&self, doc: &Document, id: NodeId) -> bool {
        doc.attr(id, HIDDEN_MARK) == Some("1")
    }

    /// Clear every suppression mark in the document and reset the
    /// processed set. Returns how many marks were removed.
    pub fn restore_all(&mut self, doc: &mut Document) -> usize {
        let mut cleared = 0;
        let mut ids = doc.descendants(doc.root());
        ids.push(doc.root());
        for id in ids {
            if doc.attr(id, HIDDEN_MARK).is_some() {
                doc.remove_attr(id, HIDDEN_MARK);
                cleared += 1;
            }
        }
        self.processed.clear();
        debug!("Restored {} suppressed nodes", cleared);
        cleared
    }

    // Processed-set bookkeeping. Membership is by arena id; the document
    // frees ids on removal, so the set is pruned rather than left to grow.

    pub fn is_processed(&self, id: NodeId) -> bool {
        self.processed.contains(&id)
    }

    pub fn note_processed(&mut self, id: NodeId) {
        self.processed.insert(id);
    }

    pub fn clear_processed(&mut self) {
        self.processed.clear();
    }

    pub fn prune_processed(&mut self, removed: &[NodeId]) {
        for id in removed {
            self.processed.remove(id);
        }
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    /// The stylesheet text enforcing both hiding layers
    pub fn stylesheet_text(&self) -> String {
        let mut lines: Vec<String> = self
            .rules
            .iter()
            .map(|r| format!("{} {{ display: none !important; }}", r.source))
            .collect();
        lines.push(format!(
            "[{}=\"1\"] {{ display: none !important; }}",
            HIDDEN_MARK
        ));
        lines.join("\n")
    }

    /// Insert the style node if it is not in the document.
    /// Returns true when a fresh node was inserted.
    pub fn ensure_stylesheet(&self, doc: &mut Document) -> bool {
        if doc.node_by_html_id(STYLE_HTML_ID).is_some() {
            return false;
        }
        let style = doc.create_element("style");
        doc.set_attr(style, "id", STYLE_HTML_ID);
        let text = self.stylesheet_text();
        doc.set_text(style, &text);
        doc.append_child(doc.head(), style);
        debug!("Inserted suppression stylesheet");
        true
    }

    /// Remove the style node if present
    pub fn remove_stylesheet(&self, doc: &mut Document) {
        if let Some(style) = doc.node_by_html_id(STYLE_HTML_ID) {
            doc.remove(style);
        }
    }

    pub fn stylesheet_present(&self, doc: &Document) -> bool {
        doc.node_by_html_id(STYLE_HTML_ID).is_some()
    }

    /// Whether a node is computed as hidden: a suppression mark or a static
    /// rule on itself or any ancestor. Only meaningful while the stylesheet
    /// is in the document.
    pub fn is_hidden(&self, doc: &Document, id: NodeId) -> bool {
        if !self.stylesheet_present(doc) {
            return false;
        }
        let mut cur = Some(id);
        while let Some(c) = cur {
            let Some(node) = doc.node(c) else {
                return false;
            };
            if node.attr(HIDDEN_MARK) == Some("1") {
                return true;
            }
            if self.rules.iter().any(|r| r.matches(node)) {
                return true;
            }
            cur = node.parent();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::dom::NodeSpec;

    fn setup() -> (Suppressor, Document) {
        let mut doc = Document::new();
        let sup = Suppressor::new(&DetectionConfig::default());
        sup.ensure_stylesheet(&mut doc);
        (sup, doc)
    }

    #[test]
    fn test_mark_hides_and_is_idempotent() {
        let (mut sup, mut doc) = setup();
        let div = doc.create_element("div");
        doc.append_child(doc.body(), div);

        assert!(sup.mark(&mut doc, div));
        assert!(sup.is_hidden(&doc, div));
        assert!(sup.is_processed(div));

        // Second mark is a no-op
        assert!(!sup.mark(&mut doc, div));
        assert!(sup.is_hidden(&doc, div));
    }

    #[test]
    fn test_mark_missing_node_is_noop() {
        let (mut sup, mut doc) = setup();
        assert!(!sup.mark(&mut doc, 12345));
        assert_eq!(sup.processed_len(), 0);
    }

    #[test]
    fn test_descendant_of_marked_node_is_hidden() {
        let (mut sup, mut doc) = setup();
        let spec = NodeSpec::new("section")
            .with_id(10)
            .with_child(NodeSpec::new("span").with_id(11));
        doc.insert_spec(None, &spec).unwrap();
        sup.mark(&mut doc, 10);
        assert!(sup.is_hidden(&doc, 11));
    }

    #[test]
    fn test_static_rule_hides_without_mark() {
        let (sup, mut doc) = setup();
        let spec = NodeSpec::new("ytd-reel-shelf-renderer").with_id(20);
        doc.insert_spec(None, &spec).unwrap();
        assert!(sup.is_hidden(&doc, 20));

        let link = NodeSpec::new("a").with_id(21).with_attr("href", "/shorts/abc");
        doc.insert_spec(None, &link).unwrap();
        assert!(sup.is_hidden(&doc, 21));
    }

    #[test]
    fn test_static_attr_contains_rule() {
        let (sup, mut doc) = setup();
        let spec = NodeSpec::new("ytd-mini-guide-entry-renderer")
            .with_id(30)
            .with_attr("aria-label", "ショート を開く");
        doc.insert_spec(None, &spec).unwrap();
        assert!(sup.is_hidden(&doc, 30));
    }

    #[test]
    fn test_unrelated_node_not_hidden() {
        let (sup, mut doc) = setup();
        let spec = NodeSpec::new("ytd-video-renderer").with_id(40);
        doc.insert_spec(None, &spec).unwrap();
        assert!(!sup.is_hidden(&doc, 40));
    }

    #[test]
    fn test_restore_all_clears_marks_and_processed() {
        let (mut sup, mut doc) = setup();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(doc.body(), a);
        doc.append_child(doc.body(), b);
        sup.mark(&mut doc, a);
        sup.mark(&mut doc, b);

        assert_eq!(sup.restore_all(&mut doc), 2);
        assert!(!sup.is_hidden(&doc, a));
        assert!(doc.attr(a, HIDDEN_MARK).is_none());
        assert_eq!(sup.processed_len(), 0);
    }

    #[test]
    fn test_stylesheet_self_heal() {
        let (sup, mut doc) = setup();
        assert!(!sup.ensure_stylesheet(&mut doc)); // already present

        // Host strips the injected node during a re-render
        let style = doc.node_by_html_id(STYLE_HTML_ID).unwrap();
        doc.remove(style);
        assert!(!sup.stylesheet_present(&doc));

        assert!(sup.ensure_stylesheet(&mut doc));
        assert!(sup.stylesheet_present(&doc));
    }

    #[test]
    fn test_no_stylesheet_means_nothing_hidden() {
        let mut doc = Document::new();
        let mut sup = Suppressor::new(&DetectionConfig::default());
        let div = doc.create_element("div");
        doc.append_child(doc.body(), div);
        sup.mark(&mut doc, div);
        // Mark is set but nothing enforces it
        assert!(!sup.is_hidden(&doc, div));
    }

    #[test]
    fn test_prune_processed() {
        let (mut sup, mut doc) = setup();
        let spec = NodeSpec::new("div")
            .with_id(50)
            .with_child(NodeSpec::new("div").with_id(51));
        doc.insert_spec(None, &spec).unwrap();
        sup.mark(&mut doc, 50);
        sup.mark(&mut doc, 51);

        let removed = doc.remove(50);
        sup.prune_processed(&removed);
        assert_eq!(sup.processed_len(), 0);
    }

    #[test]
    fn test_selector_parsing_shapes() {
        assert!(StaticRule::parse("ytd-reel-shelf-renderer").is_some());
        assert!(StaticRule::parse("a[href^=/shorts/]").is_some());
        assert!(StaticRule::parse("[aria-label*=Shorts]").is_some());
        assert!(StaticRule::parse("tp-yt-paper-item[title=ショート]").is_some());
        assert!(StaticRule::parse("").is_none());
        assert!(StaticRule::parse("[=broken]").is_none());
    }

    #[test]
    fn test_stylesheet_text_contains_mark_rule() {
        let sup = Suppressor::new(&DetectionConfig::default());
        let text = sup.stylesheet_text();
        assert!(text.contains(HIDDEN_MARK));
        assert!(text.contains("display: none !important"));
    }
}
