//! Upward collapse of sections left empty by suppression.
//!
//! Marking every item in a shelf leaves the enclosing section as a strip of
//! dividers and whitespace. After a mark, the collapser walks up to the
//! nearest section ancestor and marks it too, but only when every
//! recognized content-bearing descendant is already suppressed. Anything
//! unrecognized or still visible vetoes the collapse; leaving a section
//! visible is always the safe default.

use crate::config::DetectionConfig;
use crate::dom::Document;
use crate::suppressor::Suppressor;
use crate::types::NodeId;
use tracing::trace;

pub struct Collapser {
    section_tags: Vec<String>,
    content_tags: Vec<String>,
}

impl Collapser {
    pub fn new(cfg: &DetectionConfig) -> Self {
        let mut content_tags = cfg.item_containers.clone();
        content_tags.extend(cfg.shelf_containers.iter().cloned());
        Self {
            section_tags: cfg.section_containers.clone(),
            content_tags,
        }
    }

    /// Collapse the section enclosing `id` when all its recognized content
    /// is suppressed. Returns the section id when a new mark was applied.
    pub fn collapse_if_empty(
        &self,
        doc: &mut Document,
        sup: &mut Suppressor,
        id: NodeId,
    ) -> Option<NodeId> {
        let section = doc.closest(id, |n| self.section_tags.iter().any(|t| *t == n.tag))?;
        if sup.is_marked(doc, section) {
            return None;
        }

        let mut recognized = 0usize;
        for d in doc.descendants(section) {
            let Some(node) = doc.node(d) else { continue };
            if self.content_tags.iter().any(|t| *t == node.tag) {
                recognized += 1;
                if !suppressed_within(doc, sup, section, d) {
                    trace!("Section {} keeps visible content {}", section, d);
                    return None;
                }
            } else if node.tag == "a" {
                // An unrecognized surface that still links somewhere visible
                // (a plain watch link outside any recognized container)
                // means this section carries content we did not classify.
                let is_watch_link = node
                    .attr("href")
                    .map(|h| h.starts_with("/watch"))
                    .unwrap_or(false);
                if is_watch_link && !suppressed_within(doc, sup, section, d) {
                    trace!("Section {} keeps unrecognized link {}", section, d);
                    return None;
                }
            }
        }

        if recognized == 0 {
            return None;
        }

        sup.mark(doc, section).then_some(section)
    }
}

/// Whether `id` sits inside a marked subtree no higher than `section`
fn suppressed_within(doc: &Document, sup: &Suppressor, section: NodeId, id: NodeId) -> bool {
    match doc.closest(id, |n| sup.is_marked(doc, n.id)) {
        Some(marked) => doc.is_ancestor(section, marked),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeSpec;

    fn setup() -> (Collapser, Suppressor, Document) {
        let cfg = DetectionConfig::default();
        let mut doc = Document::new();
        let sup = Suppressor::new(&cfg);
        sup.ensure_stylesheet(&mut doc);
        (Collapser::new(&cfg), sup, doc)
    }

    fn section_with_two_items(doc: &mut Document) {
        let spec = NodeSpec::new("ytd-item-section-renderer")
            .with_id(10)
            .with_child(NodeSpec::new("ytd-rich-item-renderer").with_id(11))
            .with_child(NodeSpec::new("ytd-rich-item-renderer").with_id(12));
        doc.insert_spec(None, &spec).unwrap();
    }

    #[test]
    fn test_collapses_when_all_items_marked() {
        let (col, mut sup, mut doc) = setup();
        section_with_two_items(&mut doc);
        sup.mark(&mut doc, 11);
        sup.mark(&mut doc, 12);

        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 12), Some(10));
        assert!(sup.is_marked(&doc, 10));
    }

    #[test]
    fn test_one_unmarked_item_vetoes() {
        let (col, mut sup, mut doc) = setup();
        section_with_two_items(&mut doc);
        sup.mark(&mut doc, 11);

        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 11), None);
        assert!(!sup.is_marked(&doc, 10));
    }

    #[test]
    fn test_marked_shelf_covers_its_items() {
        let (col, mut sup, mut doc) = setup();
        let spec = NodeSpec::new("ytd-rich-section-renderer")
            .with_id(20)
            .with_child(
                NodeSpec::new("ytd-reel-shelf-renderer")
                    .with_id(21)
                    .with_child(NodeSpec::new("ytd-rich-item-renderer").with_id(22)),
            );
        doc.insert_spec(None, &spec).unwrap();
        // The shelf is marked; its items carry no individual mark
        sup.mark(&mut doc, 21);

        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 21), Some(20));
    }

    #[test]
    fn test_unrecognized_watch_link_vetoes() {
        let (col, mut sup, mut doc) = setup();
        let spec = NodeSpec::new("ytd-item-section-renderer")
            .with_id(30)
            .with_child(NodeSpec::new("ytd-rich-item-renderer").with_id(31))
            .with_child(NodeSpec::new("a").with_id(32).with_attr("href", "/watch?v=abc"));
        doc.insert_spec(None, &spec).unwrap();
        sup.mark(&mut doc, 31);

        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 31), None);
    }

    #[test]
    fn test_empty_section_not_collapsed() {
        let (col, mut sup, mut doc) = setup();
        let spec = NodeSpec::new("ytd-item-section-renderer").with_id(40);
        doc.insert_spec(None, &spec).unwrap();

        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 40), None);
    }

    #[test]
    fn test_node_outside_any_section() {
        let (col, mut sup, mut doc) = setup();
        let div = doc.create_element("ytd-rich-item-renderer");
        doc.append_child(doc.body(), div);
        sup.mark(&mut doc, div);

        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, div), None);
    }

    #[test]
    fn test_already_collapsed_section_is_noop() {
        let (col, mut sup, mut doc) = setup();
        section_with_two_items(&mut doc);
        sup.mark(&mut doc, 11);
        sup.mark(&mut doc, 12);
        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 11), Some(10));
        assert_eq!(col.collapse_if_empty(&mut doc, &mut sup, 12), None);
    }
}
