//! Arena-backed render tree.
//!
//! The page renderer's surfaces are materialized into a small element tree:
//! a root, one container per page (tagged with its page number), the page's
//! top marker, a text layer, and one text leaf per rendered line. Leaves hold
//! their text as inline segments so that search highlights can be layered on
//! and stripped off again without changing the tree shape.

use std::collections::BTreeMap;

use crate::PageSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Root,
    PageContainer,
    TopMarker,
    TextLayer,
    TextLeaf,
}

/// A run of leaf text, either plain or wrapped in a search highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Mark {
        match_id: usize,
        text: String,
        current: bool,
    },
}

impl Inline {
    pub fn text(&self) -> &str {
        match self {
            Inline::Text(text) => text,
            Inline::Mark { text, .. } => text,
        }
    }

    pub fn is_mark(&self) -> bool {
        matches!(self, Inline::Mark { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub role: NodeRole,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub page_number: Option<u32>,
    /// Vertical position of a text leaf inside its page, normalized to 0..1.
    pub top: f32,
    pub content: Vec<Inline>,
}

impl Node {
    fn new(role: NodeRole, parent: Option<NodeId>, page_number: Option<u32>) -> Self {
        Self {
            role,
            parent,
            children: Vec::new(),
            page_number,
            top: 0.0,
            content: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.content.iter().map(Inline::text).collect()
    }

    pub fn has_marks(&self) -> bool {
        self.content.iter().any(Inline::is_mark)
    }
}

#[derive(Debug, Clone)]
pub struct RenderTree {
    nodes: Vec<Node>,
    containers: BTreeMap<u32, NodeId>,
    markers: BTreeMap<u32, NodeId>,
}

impl Default for RenderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeRole::Root, None, None)],
            containers: BTreeMap::new(),
            markers: BTreeMap::new(),
        }
    }

    /// Builds the tree for a freshly loaded document. Surfaces are expected in
    /// page order; page numbers are 1-based.
    pub fn from_surfaces(surfaces: &[PageSurface]) -> Self {
        let mut tree = Self::new();
        let root = tree.root();
        for surface in surfaces {
            let page_number = surface.page_index as u32 + 1;
            let container = tree.append_element(root, NodeRole::PageContainer, Some(page_number));
            let marker = tree.append_element(container, NodeRole::TopMarker, Some(page_number));
            let layer = tree.append_element(marker, NodeRole::TextLayer, None);
            for line in &surface.lines {
                if line.text.is_empty() {
                    continue;
                }
                tree.append_text(layer, &line.text, line.top);
            }
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        role: NodeRole,
        page_number: Option<u32>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(role, Some(parent), page_number));
        self.nodes[parent.0].children.push(id);
        if let Some(page) = page_number {
            match role {
                NodeRole::PageContainer => {
                    self.containers.insert(page, id);
                }
                NodeRole::TopMarker => {
                    self.markers.insert(page, id);
                }
                _ => {}
            }
        }
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str, top: f32) -> NodeId {
        let id = self.append_element(parent, NodeRole::TextLeaf, None);
        let node = &mut self.nodes[id.0];
        node.top = top.clamp(0.0, 1.0);
        node.content = vec![Inline::Text(text.to_owned())];
        id
    }

    pub fn page_count(&self) -> usize {
        self.containers.len()
    }

    pub fn page_container(&self, page_number: u32) -> Option<NodeId> {
        self.containers.get(&page_number).copied()
    }

    /// Top markers in page order, paired with their page numbers.
    pub fn top_markers(&self) -> Vec<(NodeId, u32)> {
        self.markers.iter().map(|(page, id)| (*id, *page)).collect()
    }

    /// Pre-order walk starting at (and including) `start`.
    pub fn descendants(&self, start: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![start],
        }
    }

    pub fn is_text_leaf(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.children.is_empty() && node.content.iter().any(|inline| !inline.text().is_empty())
    }

    /// Every text-bearing leaf in document order.
    pub fn text_leaves(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|id| self.is_text_leaf(*id))
            .collect()
    }

    pub fn text_leaves_of_page(&self, page_number: u32) -> Vec<NodeId> {
        match self.page_container(page_number) {
            Some(container) => self
                .descendants(container)
                .filter(|id| self.is_text_leaf(*id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            for inline in &self.node(node).content {
                out.push_str(inline.text());
            }
        }
        out
    }

    /// Walks parent pointers from `id` (inclusive) to the nearest node tagged
    /// with a page number.
    pub fn enclosing_page(&self, id: NodeId) -> Option<u32> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.get(current)?;
            if let Some(page) = node.page_number {
                return Some(page);
            }
            cursor = node.parent;
        }
        None
    }

    pub fn set_content(&mut self, id: NodeId, content: Vec<Inline>) {
        self.nodes[id.0].content = content;
    }

    pub fn content_mut(&mut self, id: NodeId) -> &mut Vec<Inline> {
        &mut self.nodes[id.0].content
    }

    /// Collapses highlighted leaves back to a single plain text run.
    /// Returns the number of leaves that were restored.
    pub fn strip_marks(&mut self) -> usize {
        let mut restored = 0;
        for node in &mut self.nodes {
            if !node.has_marks() {
                continue;
            }
            let text = node.text();
            node.content = vec![Inline::Text(text)];
            restored += 1;
        }
        restored
    }
}

pub struct Descendants<'a> {
    tree: &'a RenderTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.get(id)?;
        self.stack.extend(node.children.iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageSize, TextLine};

    fn surface(page_index: usize, lines: &[&str]) -> PageSurface {
        let count = lines.len().max(1) as f32;
        PageSurface {
            page_index,
            size: PageSize {
                width: 600.0,
                height: 800.0,
            },
            lines: lines
                .iter()
                .enumerate()
                .map(|(idx, text)| TextLine {
                    text: (*text).to_owned(),
                    top: idx as f32 / count,
                })
                .collect(),
        }
    }

    #[test]
    fn builds_one_container_and_marker_per_page() {
        let tree = RenderTree::from_surfaces(&[
            surface(0, &["first"]),
            surface(1, &["second", "", "third"]),
        ]);

        assert_eq!(tree.page_count(), 2);
        let markers = tree.top_markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].1, 1);
        assert_eq!(markers[1].1, 2);
        assert_eq!(tree.text_leaves_of_page(2).len(), 2);
    }

    #[test]
    fn text_leaves_follow_document_order() {
        let tree = RenderTree::from_surfaces(&[
            surface(0, &["a", "b"]),
            surface(1, &["c"]),
        ]);
        let texts: Vec<String> = tree
            .text_leaves()
            .into_iter()
            .map(|id| tree.node(id).text())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn enclosing_page_walks_ancestry() {
        let mut tree = RenderTree::from_surfaces(&[surface(0, &["x"]), surface(1, &["y"])]);
        let leaf = tree.text_leaves()[1];
        assert_eq!(tree.enclosing_page(leaf), Some(2));

        let root = tree.root();
        let orphan = tree.append_text(root, "loose", 0.0);
        assert_eq!(tree.enclosing_page(orphan), None);
    }

    #[test]
    fn strip_marks_restores_plain_text() {
        let mut tree = RenderTree::from_surfaces(&[surface(0, &["Cat cat"])]);
        let leaf = tree.text_leaves()[0];
        tree.set_content(
            leaf,
            vec![
                Inline::Mark {
                    match_id: 0,
                    text: "Cat".into(),
                    current: true,
                },
                Inline::Text(" ".into()),
                Inline::Mark {
                    match_id: 1,
                    text: "cat".into(),
                    current: false,
                },
            ],
        );

        assert_eq!(tree.strip_marks(), 1);
        assert_eq!(tree.node(leaf).content, vec![Inline::Text("Cat cat".into())]);
        assert_eq!(tree.strip_marks(), 0);
    }
}
