//! hierarchical node storage
//!
//! All nodes of one document live in a single [la_arena::Arena]. Parent and child relations are stored as
//! [NodeId]s, so a node never owns its ancestors and any location can be remembered by its hierarchical name
//! (`/a/b/c`) and looked up again later.
//!
//! Comments are attached to a node at the *property index* that was current when the comment was parsed: a
//! comment at index `n` sits before the `n`-th property, a comment at `properties.len()` trails all of them.
use indexmap::IndexMap;
use la_arena::{Arena, Idx};
use serde::ser::{SerializeMap, Serializer};

pub type NodeId = Idx<Node>;

/// Name of the root node, also its hierarchical name
pub const ROOT_NAME: &str = "/";

#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    properties: IndexMap<String, String>,
    multiline_comments: Vec<(usize, String)>,
    line_comments: Vec<(usize, String)>,
}

impl Node {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            parent,
            children: Default::default(),
            properties: Default::default(),
            multiline_comments: Default::default(),
            line_comments: Default::default(),
        }
    }
}

/// A tree of nodes, addressed by `/`-separated paths
#[derive(Debug, Clone)]
pub struct Properties {
    nodes: Arena<Node>,
    root: NodeId,
}

impl Default for Properties {
    fn default() -> Self {
        Self::new()
    }
}

impl Properties {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new(ROOT_NAME, None));
        Self { nodes, root }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node_by_id(self.root)
    }

    pub fn node_by_id(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    /// Look up a node by its hierarchical name
    ///
    /// `/` is the root. Empty segments are ignored, so `/a//b/` finds `/a/b`.
    pub fn node(&self, path: &str) -> Option<NodeRef<'_>> {
        self.find(path).map(|id| self.node_by_id(id))
    }

    pub fn find(&self, path: &str) -> Option<NodeId> {
        segments(path).try_fold(self.root, |current, segment| {
            self.nodes[current].children.get(segment).copied()
        })
    }

    /// Walk `path` from the root, creating every missing segment
    pub fn get_or_insert_path(&mut self, path: &str) -> NodeId {
        let mut current = self.root;
        for segment in segments(path) {
            current = match self.nodes[current].children.get(segment).copied() {
                Some(child) => child,
                None => {
                    let child = self.nodes.alloc(Node::new(segment, Some(current)));
                    self.nodes[current]
                        .children
                        .insert(segment.to_string(), child);
                    tracing::debug!(parent=%self.hierarchical_name(current), segment, "node created");
                    child
                }
            };
        }
        current
    }

    /// `/`-joined names from the root down to `id`
    pub fn hierarchical_name(&self, id: NodeId) -> String {
        if id == self.root {
            return ROOT_NAME.to_string();
        }

        let mut names = vec![];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            names.push(self.nodes[current].name.as_str());
            current = parent;
        }

        names
            .iter()
            .rev()
            .fold(String::new(), |mut path, name| {
                path.push('/');
                path.push_str(name);
                path
            })
    }

    pub fn depth(&self, id: NodeId) -> usize {
        std::iter::successors(self.nodes[id].parent, |parent| self.nodes[*parent].parent).count()
    }

    /// All nodes in pre-order, children in insertion order
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        let mut stack = vec![self.root];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.nodes[id].children.values().rev().copied());
            Some(self.node_by_id(id))
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn insert_property(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.nodes[id].properties.insert(key.into(), value.into())
    }

    pub(crate) fn add_line_comment(&mut self, id: NodeId, comment: impl Into<String>) {
        let node = &mut self.nodes[id];
        node.line_comments
            .push((node.properties.len(), comment.into()));
    }

    pub(crate) fn add_multiline_comment(&mut self, id: NodeId, comment: impl Into<String>) {
        let node = &mut self.nodes[id];
        node.multiline_comments
            .push((node.properties.len(), comment.into()));
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Read access to one node of a [Properties] tree
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Properties,
    id: NodeId,
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("path", &self.hierarchical_name())
            .field("properties", &self.node().properties)
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.id]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn hierarchical_name(&self) -> String {
        self.tree.hierarchical_name(self.id)
    }

    pub fn depth(&self) -> usize {
        self.tree.depth(self.id)
    }

    pub fn is_root(&self) -> bool {
        self.id == self.tree.root
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.node().parent.map(|id| self.tree.node_by_id(id))
    }

    pub fn child(&self, name: &str) -> Option<NodeRef<'a>> {
        self.node()
            .children
            .get(name)
            .map(|id| self.tree.node_by_id(*id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.node()
            .children
            .values()
            .map(move |id| tree.node_by_id(*id))
    }

    pub fn properties(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.node()
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn property_count(&self) -> usize {
        self.node().properties.len()
    }

    /// Block comments as `(property index, text)`
    pub fn multiline_comments(&self) -> impl Iterator<Item = (usize, &'a str)> {
        self.node()
            .multiline_comments
            .iter()
            .map(|(index, text)| (*index, text.as_str()))
    }

    /// Line comments as `(property index, text)`
    pub fn line_comments(&self) -> impl Iterator<Item = (usize, &'a str)> {
        self.node()
            .line_comments
            .iter()
            .map(|(index, text)| (*index, text.as_str()))
    }

    pub fn has_comments(&self) -> bool {
        !self.node().multiline_comments.is_empty() || !self.node().line_comments.is_empty()
    }

    pub fn property(&self, key: &str) -> Option<&'a str> {
        self.node().properties.get(key).map(String::as_str)
    }

    pub fn property_or(&self, key: &str, default: &'a str) -> &'a str {
        self.property(key).unwrap_or(default)
    }

    /// Unsigned decimal digits only; anything else is `None`
    pub fn property_as_int(&self, key: &str) -> Option<i64> {
        let value = self.property(key)?.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value.parse().ok()
    }

    pub fn property_as_int_or(&self, key: &str, default: i64) -> i64 {
        self.property_as_int(key).unwrap_or(default)
    }

    /// Digits with at most one decimal point
    pub fn property_as_double(&self, key: &str) -> Option<f64> {
        let value = self.property(key)?.trim();
        let mut digits = 0;
        let mut points = 0;
        for b in value.bytes() {
            match b {
                b'0'..=b'9' => digits += 1,
                b'.' => points += 1,
                _ => return None,
            }
        }
        if digits == 0 || points > 1 {
            return None;
        }
        value.parse().ok()
    }

    pub fn property_as_double_or(&self, key: &str, default: f64) -> f64 {
        self.property_as_double(key).unwrap_or(default)
    }

    pub fn property_as_bool(&self, key: &str) -> Option<bool> {
        let value = self.property(key)?.trim();
        if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    pub fn property_as_bool_or(&self, key: &str, default: bool) -> bool {
        self.property_as_bool(key).unwrap_or(default)
    }
}

impl serde::ser::Serialize for NodeRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let node = self.node();
        let sections =
            usize::from(!node.properties.is_empty()) + usize::from(!node.children.is_empty());

        let mut ser = serializer.serialize_map(Some(sections))?;
        if !node.properties.is_empty() {
            ser.serialize_entry("properties", &node.properties)?;
        }
        if !node.children.is_empty() {
            let children: IndexMap<&str, NodeRef> = self
                .children()
                .map(|child| (child.name(), child))
                .collect();
            ser.serialize_entry("children", &children)?;
        }
        ser.end()
    }
}

impl serde::ser::Serialize for Properties {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.root().serialize(serializer)
    }
}
