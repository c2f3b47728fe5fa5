use crate::dom::element::{DomNode, ElementNode, NodeIndex};
use crate::dom::selector_map::SelectorMap;
use crate::error::{BrowserError, Result};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Rebuilt page: every built node in one arena, the root element and the
/// highlight-index map pointing into the arena.
///
/// Nodes reference each other by [`NodeIndex`]. Children lists own the
/// structure; `parent` links are plain back-references used for upward
/// navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct DomState {
    nodes: Vec<DomNode>,
    root: NodeIndex,
    selector_map: SelectorMap,
}

impl DomState {
    /// Assemble a state from its parts. The root must be an element.
    pub(crate) fn from_parts(nodes: Vec<DomNode>, root: NodeIndex, selector_map: SelectorMap) -> Result<Self> {
        match nodes.get(root).map(DomNode::is_element) {
            Some(true) => Ok(Self {
                nodes,
                root,
                selector_map,
            }),
            Some(false) => Err(BrowserError::RootResolutionFailed(
                "root resolves to a text node".to_string(),
            )),
            None => Err(BrowserError::RootResolutionFailed(format!(
                "root position {} is outside the tree",
                root
            ))),
        }
    }

    /// Assemble a state and index every highlighted element reachable from the root
    pub(crate) fn with_derived_selector_map(nodes: Vec<DomNode>, root: NodeIndex) -> Result<Self> {
        let mut state = Self::from_parts(nodes, root, SelectorMap::new())?;

        let mut selector_map = SelectorMap::new();
        for (index, _) in state.walk() {
            if let Some(highlight_index) = state.element(index).and_then(|element| element.highlight_index) {
                selector_map.register(highlight_index, index);
            }
        }
        state.selector_map = selector_map;

        Ok(state)
    }

    /// Position of the root element
    pub fn root_index(&self) -> NodeIndex {
        self.root
    }

    /// The root element
    pub fn root(&self) -> &ElementNode {
        match self.nodes.get(self.root) {
            Some(DomNode::Element(element)) => element,
            _ => unreachable!("root is checked to be an element on construction"),
        }
    }

    /// Number of built nodes, reachable or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&DomNode> {
        self.nodes.get(index)
    }

    pub fn element(&self, index: NodeIndex) -> Option<&ElementNode> {
        self.nodes.get(index).and_then(DomNode::as_element)
    }

    /// All built nodes in build order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &DomNode)> {
        self.nodes.iter().enumerate()
    }

    /// Parent position of a node
    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.nodes.get(index).and_then(DomNode::parent)
    }

    /// Parent element of a node
    pub fn parent_element(&self, index: NodeIndex) -> Option<&ElementNode> {
        self.parent(index).and_then(|parent| self.element(parent))
    }

    /// Children of a node, in page order. Text nodes have none.
    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        match self.nodes.get(index) {
            Some(DomNode::Element(element)) => &element.children,
            _ => &[],
        }
    }

    /// Map of highlight indices to node positions
    pub fn selector_map(&self) -> &SelectorMap {
        &self.selector_map
    }

    /// Element carrying the given highlight index
    pub fn element_by_highlight(&self, highlight_index: usize) -> Option<&ElementNode> {
        self.selector_map
            .get(highlight_index)
            .and_then(|index| self.element(index))
    }

    /// Highlighted elements, ascending by highlight index
    pub fn clickable_elements(&self) -> Vec<(usize, &ElementNode)> {
        self.selector_map
            .sorted_indices()
            .into_iter()
            .filter_map(|highlight_index| {
                self.element_by_highlight(highlight_index)
                    .map(|element| (highlight_index, element))
            })
            .collect()
    }

    /// Depth-first, pre-order walk from the root yielding `(position, depth)`
    pub fn walk(&self) -> Walk<'_> {
        self.walk_from(self.root)
    }

    /// Depth-first, pre-order walk from any node
    pub fn walk_from(&self, start: NodeIndex) -> Walk<'_> {
        Walk {
            state: self,
            stack: vec![(start, 0)],
            visited: vec![false; self.nodes.len()],
        }
    }

    /// Count element nodes reachable from the root
    pub fn count_elements(&self) -> usize {
        self.walk()
            .filter(|(index, _)| self.element(*index).is_some())
            .count()
    }

    /// Count interactive elements
    pub fn count_interactive(&self) -> usize {
        self.selector_map.len()
    }

    /// XPaths of the elements from the root down to `index`
    pub fn ancestry(&self, index: NodeIndex) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(index);
        while let Some(position) = current {
            if path.len() > self.nodes.len() {
                break;
            }
            if let Some(element) = self.element(position) {
                path.push(element.xpath.as_str());
            }
            if position == self.root {
                break;
            }
            current = self.parent(position);
        }
        path.reverse();
        path
    }

    /// Indented text outline of the reachable tree
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for (index, depth) in self.walk() {
            let line = match &self.nodes[index] {
                DomNode::Element(element) => element.to_simple_string(),
                DomNode::Text(text) => {
                    let trimmed = text.text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    trimmed.to_string()
                }
            };
            out.push_str(&"  ".repeat(depth));
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Convert the reachable tree to nested JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&NodeView {
            state: self,
            index: self.root,
        })
        .map_err(|e| BrowserError::InvalidStructure(format!("Failed to serialize DOM to JSON: {}", e)))
    }
}

/// Pre-order iterator over a [`DomState`]. Each node is yielded at most once.
pub struct Walk<'a> {
    state: &'a DomState,
    stack: Vec<(NodeIndex, usize)>,
    visited: Vec<bool>,
}

impl Iterator for Walk<'_> {
    type Item = (NodeIndex, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((index, depth)) = self.stack.pop() {
            match self.visited.get_mut(index) {
                Some(seen) if !*seen => *seen = true,
                _ => continue,
            }

            // reversed so children come out left-to-right
            for &child in self.state.children(index).iter().rev() {
                self.stack.push((child, depth + 1));
            }

            return Some((index, depth));
        }
        None
    }
}

struct NodeView<'a> {
    state: &'a DomState,
    index: NodeIndex,
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.state.nodes[self.index] {
            DomNode::Text(text) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "TEXT_NODE")?;
                map.serialize_entry("text", &text.text)?;
                map.serialize_entry("is_visible", &text.is_visible)?;
                map.end()
            }
            DomNode::Element(element) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("tag_name", &element.tag_name)?;
                map.serialize_entry("xpath", &element.xpath)?;
                map.serialize_entry("attributes", &element.attributes)?;
                map.serialize_entry("is_visible", &element.is_visible)?;
                map.serialize_entry("is_interactive", &element.is_interactive)?;
                map.serialize_entry("is_top_element", &element.is_top_element)?;
                map.serialize_entry("is_in_viewport", &element.is_in_viewport)?;
                map.serialize_entry("shadow_root", &element.shadow_root)?;
                if let Some(highlight_index) = element.highlight_index {
                    map.serialize_entry("highlight_index", &highlight_index)?;
                }
                if let Some(viewport) = &element.viewport_info {
                    map.serialize_entry("viewport", viewport)?;
                }
                if !element.children.is_empty() {
                    map.serialize_entry(
                        "children",
                        &ChildrenView {
                            state: self.state,
                            children: &element.children,
                        },
                    )?;
                }
                map.end()
            }
        }
    }
}

struct ChildrenView<'a> {
    state: &'a DomState,
    children: &'a [NodeIndex],
}

impl Serialize for ChildrenView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.children.len()))?;
        for &index in self.children {
            seq.serialize_element(&NodeView {
                state: self.state,
                index,
            })?;
        }
        seq.end()
    }
}
