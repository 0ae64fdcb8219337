//! Host document tree
//!
//! An arena of nodes addressed by [`NodeId`]. The engine only needs a small
//! slice of DOM behaviour: attribute lookup, text replacement, deep cloning,
//! sibling insertion and subtree removal.
//!
//! Removed nodes stay in the arena but are marked dead and unreachable, so a
//! stale `NodeId` can never be re-attached by accident.

mod html;

pub use html::VOID_ELEMENTS;

/// Index of a node inside one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    /// Attributes in source order
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alive: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            alive: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(NodeKind::Element(Element {
            tag: tag.into(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(&el.tag),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).map(|n| n.alive).unwrap_or(false)
    }

    /// Whether `node` is reachable from the root
    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root() || self.is_descendant_of(node, self.root())
    }

    // ─────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => el
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => &el.attrs,
            _ => &[],
        }
    }

    /// Set an attribute; no-op on non-element nodes
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element(el) = &mut self.nodes[node.0].kind {
            let value = value.into();
            match el.attrs.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value,
                None => el.attrs.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let NodeKind::Element(el) = &mut self.nodes[node.0].kind {
            el.attrs.retain(|(k, _)| k != name);
        }
    }

    /// Toggle `display: none` in the inline style, keeping other declarations
    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) {
        let mut decls: Vec<String> = self
            .attr(node, "style")
            .unwrap_or("")
            .split(';')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .filter(|d| {
                d.split(':')
                    .next()
                    .map(|prop| prop.trim() != "display")
                    .unwrap_or(true)
            })
            .map(str::to_string)
            .collect();

        if hidden {
            decls.push("display: none".to_string());
        }

        if decls.is_empty() {
            self.remove_attr(node, "style");
        } else {
            self.set_attr(node, "style", decls.join("; "));
        }
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.attr(node, "style")
            .map(|s| {
                s.split(';').any(|d| {
                    let mut parts = d.splitn(2, ':');
                    let prop = parts.next().unwrap_or("").trim();
                    let val = parts.next().unwrap_or("").trim();
                    prop == "display" && val == "none"
                })
            })
            .unwrap_or(false)
    }

    // ─────────────────────────────────────────────────────────────
    // Structure
    // ─────────────────────────────────────────────────────────────

    /// Unlink a node from its parent; the subtree stays alive
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` right before `reference` under `parent`
    ///
    /// Falls back to appending when `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let siblings = &mut self.nodes[parent.0].children;
        match siblings.iter().position(|c| *c == reference) {
            Some(pos) => siblings.insert(pos, child),
            None => siblings.push(child),
        }
    }

    /// Detach a subtree and mark every node in it dead
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            self.nodes[current.0].alive = false;
            stack.extend(self.nodes[current.0].children.iter().copied());
        }
    }

    /// Copy a subtree; the copy is detached
    pub fn deep_clone(&mut self, node: NodeId) -> NodeId {
        let kind = self.nodes[node.0].kind.clone();
        let copy = self.push(kind);
        let children = self.nodes[node.0].children.clone();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// All nodes below `node` in document order (excluding `node`)
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[node.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev().copied());
        }
        out
    }

    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes[node.0].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.nodes[p.0].parent;
        }
        false
    }

    /// Descendants of `scope` carrying attribute `name`, in document order
    pub fn find_by_attr(&self, scope: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|n| self.has_attr(*n, name))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Text
    // ─────────────────────────────────────────────────────────────

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let NodeKind::Text(t) = &self.nodes[node.0].kind {
            out.push_str(t);
        }
        for d in self.descendants(node) {
            if let NodeKind::Text(t) = &self.nodes[d.0].kind {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, node: NodeId, text: impl Into<String>) {
        if let NodeKind::Text(t) = &mut self.nodes[node.0].kind {
            *t = text.into();
            return;
        }
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
            self.remove(child);
        }
        let text_node = self.create_text(text);
        self.append_child(node, text_node);
    }
}
