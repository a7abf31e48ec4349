//! Arena-backed model of the host page's DOM.
//!
//! The engine never touches a real browser document; the host mirrors the
//! subtrees the engine cares about into this model and streams mutations for
//! it. Nodes live in an id-keyed arena. Removing a node frees its whole
//! subtree, so id-keyed side tables (such as the processed set) never keep
//! host-discarded nodes alive; membership of a dead id is pruned at removal
//! time.

use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Playback state carried by media nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    pub playing: bool,
    pub muted: bool,
    pub current_time: f64,
}

impl Default for MediaState {
    fn default() -> Self {
        // The host registers media elements mid-playback; a short-form page
        // starts its player unmuted.
        Self {
            playing: true,
            muted: false,
            current_time: 0.0,
        }
    }
}

/// A single node in the document arena
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub tag: String,
    attrs: HashMap<String, String>,
    pub text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    pub media: Option<MediaState>,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Serializable description of a subtree the host inserts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Host-assigned id; allocated by the document when absent
    #[serde(default)]
    pub id: Option<NodeId>,
    pub tag: String,
    #[serde(default)]
    pub attrs: HashMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            id: None,
            tag: tag.to_string(),
            attrs: HashMap::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// The document arena
#[derive(Debug)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    next_id: NodeId,
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: HashMap::new(),
            root: 1,
            head: 2,
            body: 3,
            next_id: 4,
        };
        doc.nodes.insert(1, raw_node(1, "html", None));
        doc.nodes.insert(2, raw_node(2, "head", Some(1)));
        doc.nodes.insert(3, raw_node(3, "body", Some(1)));
        let root = doc.nodes.get_mut(&1).unwrap();
        root.children = vec![2, 3];
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Create a detached element owned by the arena
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = self.alloc_id();
        let media = (tag == "video").then(MediaState::default);
        let mut node = raw_node(id, tag, None);
        node.media = media;
        self.nodes.insert(id, node);
        id
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    /// Returns false when either node is gone.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            return false;
        }
        if self.is_ancestor(child, parent) || parent == child {
            return false;
        }
        if let Some(old_parent) = self.nodes.get(&child).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(&old_parent) {
                p.children.retain(|&c| c != child);
            }
        }
        self.nodes.get_mut(&parent).unwrap().children.push(child);
        self.nodes.get_mut(&child).unwrap().parent = Some(parent);
        true
    }

    /// Materialize a host-described subtree under `parent` (body when absent).
    /// A spec reusing a live id is ignored. Returns the new subtree root.
    pub fn insert_spec(&mut self, parent: Option<NodeId>, spec: &NodeSpec) -> Option<NodeId> {
        let parent = parent.unwrap_or(self.body);
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let id = self.build_spec(spec)?;
        self.append_child(parent, id);
        Some(id)
    }

    fn build_spec(&mut self, spec: &NodeSpec) -> Option<NodeId> {
        let id = match spec.id {
            Some(id) => {
                if self.nodes.contains_key(&id) {
                    return None;
                }
                self.next_id = self.next_id.max(id + 1);
                id
            }
            None => self.alloc_id(),
        };
        let mut node = raw_node(id, &spec.tag, None);
        node.attrs = spec.attrs.clone();
        node.text = spec.text.clone();
        node.media = (spec.tag == "video").then(MediaState::default);
        self.nodes.insert(id, node);
        for child_spec in &spec.children {
            if let Some(child) = self.build_spec(child_spec) {
                self.append_child(id, child);
            }
        }
        Some(id)
    }

    /// Remove a node and its subtree, returning every freed id.
    /// The structural nodes (html/head/body) cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        if id == self.root || id == self.head || id == self.body {
            return Vec::new();
        }
        if !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|&c| c != id);
            }
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.remove(&cur) {
                stack.extend(node.children);
                removed.push(cur);
            }
        }
        removed
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(&id).and_then(|n| n.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attrs.remove(name);
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text = text.to_string();
        }
    }

    /// Whether `ancestor` is on the parent chain of `id` (or is `id` itself)
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.nodes.get(&c).and_then(|n| n.parent);
        }
        false
    }

    /// Nearest node (starting at `id` itself) satisfying the predicate
    pub fn closest<F>(&self, id: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.nodes.get(&c)?;
            if pred(node) {
                return Some(c);
            }
            cur = node.parent;
        }
        None
    }

    /// Pre-order descendants of `id`, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get(&cur) {
                out.push(cur);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Every node in the document with the given tag
    pub fn nodes_with_tag(&self, tag: &str) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.tag == tag)
            .map(|n| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Look a node up by its `id` attribute (the HTML id, not the arena id)
    pub fn node_by_html_id(&self, html_id: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.attr("id") == Some(html_id))
            .map(|n| n.id)
    }

    /// Concatenated text of `id` and its subtree
    pub fn visible_text(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        if let Some(node) = self.nodes.get(&id) {
            if !node.text.trim().is_empty() {
                parts.push(node.text.trim().to_string());
            }
        }
        for desc in self.descendants(id) {
            if let Some(node) = self.nodes.get(&desc) {
                if !node.text.trim().is_empty() {
                    parts.push(node.text.trim().to_string());
                }
            }
        }
        parts.join(" ")
    }

    /// Every media node currently in the document
    pub fn media_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.media.is_some())
            .map(|n| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_node(id: NodeId, tag: &str, parent: Option<NodeId>) -> Node {
    Node {
        id,
        tag: tag.to_string(),
        attrs: HashMap::new(),
        text: String::new(),
        children: Vec::new(),
        parent,
        media: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_structure() {
        let doc = Document::new();
        assert_eq!(doc.node(doc.root()).unwrap().tag, "html");
        assert_eq!(doc.node(doc.head()).unwrap().tag, "head");
        assert_eq!(doc.node(doc.body()).unwrap().tag, "body");
        assert_eq!(doc.node_count(), 3);
    }

    #[test]
    fn test_create_and_append() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        assert!(doc.append_child(doc.body(), div));
        assert_eq!(doc.node(div).unwrap().parent(), Some(doc.body()));
        assert!(doc.is_ancestor(doc.body(), div));
    }

    #[test]
    fn test_append_rejects_cycle() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(doc.body(), a);
        doc.append_child(a, b);
        assert!(!doc.append_child(b, a));
        assert!(!doc.append_child(a, a));
    }

    #[test]
    fn test_insert_spec_subtree() {
        let mut doc = Document::new();
        let spec = NodeSpec::new("section")
            .with_id(100)
            .with_child(NodeSpec::new("a").with_id(101).with_attr("href", "/shorts/xyz"));
        let root = doc.insert_spec(None, &spec).unwrap();
        assert_eq!(root, 100);
        assert_eq!(doc.attr(101, "href"), Some("/shorts/xyz"));
        assert!(doc.is_ancestor(doc.body(), 101));
    }

    #[test]
    fn test_insert_spec_duplicate_id_ignored() {
        let mut doc = Document::new();
        let spec = NodeSpec::new("div").with_id(50);
        assert!(doc.insert_spec(None, &spec).is_some());
        assert!(doc.insert_spec(None, &spec).is_none());
    }

    #[test]
    fn test_allocated_ids_do_not_collide_with_host_ids() {
        let mut doc = Document::new();
        doc.insert_spec(None, &NodeSpec::new("div").with_id(500)).unwrap();
        let fresh = doc.create_element("span");
        assert!(fresh > 500);
    }

    #[test]
    fn test_remove_frees_subtree() {
        let mut doc = Document::new();
        let spec = NodeSpec::new("section")
            .with_id(10)
            .with_child(NodeSpec::new("div").with_id(11))
            .with_child(NodeSpec::new("div").with_id(12));
        doc.insert_spec(None, &spec).unwrap();
        let removed = doc.remove(10);
        assert_eq!(removed.len(), 3);
        assert!(doc.node(11).is_none());
        assert!(!doc
            .node(doc.body())
            .unwrap()
            .children()
            .contains(&10));
    }

    #[test]
    fn test_remove_structural_nodes_is_noop() {
        let mut doc = Document::new();
        assert!(doc.remove(doc.body()).is_empty());
        assert_eq!(doc.node_count(), 3);
    }

    #[test]
    fn test_visible_text_concatenates_subtree() {
        let mut doc = Document::new();
        let spec = NodeSpec::new("div")
            .with_id(20)
            .with_text("Shorts")
            .with_child(NodeSpec::new("span").with_id(21).with_text("for you"));
        doc.insert_spec(None, &spec).unwrap();
        assert_eq!(doc.visible_text(20), "Shorts for you");
    }

    #[test]
    fn test_closest_walks_upward() {
        let mut doc = Document::new();
        let spec = NodeSpec::new("ytd-rich-item-renderer")
            .with_id(30)
            .with_child(NodeSpec::new("a").with_id(31));
        doc.insert_spec(None, &spec).unwrap();
        let found = doc.closest(31, |n| n.tag == "ytd-rich-item-renderer");
        assert_eq!(found, Some(30));
        assert_eq!(doc.closest(31, |n| n.tag == "nope"), None);
    }

    #[test]
    fn test_node_by_html_id() {
        let mut doc = Document::new();
        let spec = NodeSpec::new("div").with_id(40).with_attr("id", "content");
        doc.insert_spec(None, &spec).unwrap();
        assert_eq!(doc.node_by_html_id("content"), Some(40));
        assert_eq!(doc.node_by_html_id("missing"), None);
    }

    #[test]
    fn test_video_nodes_carry_media_state() {
        let mut doc = Document::new();
        let video = doc.create_element("video");
        doc.append_child(doc.body(), video);
        let media = doc.node(video).unwrap().media.unwrap();
        assert!(media.playing);
        assert!(!media.muted);
        assert_eq!(doc.media_nodes(), vec![video]);
    }
}
