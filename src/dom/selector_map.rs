use crate::dom::element::NodeIndex;
use indexmap::IndexMap;

/// Map of highlight indices to the element nodes carrying them.
///
/// Values are positions in the owning [`DomState`](crate::dom::DomState), so a
/// map is only meaningful next to the tree it was built with.
/// Uses IndexMap to preserve registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorMap {
    map: IndexMap<usize, NodeIndex>,
}

impl SelectorMap {
    /// Create a new empty SelectorMap
    pub fn new() -> Self {
        Self { map: IndexMap::new() }
    }

    /// Register an element under its highlight index.
    ///
    /// A repeated highlight index replaces the earlier entry (last write wins)
    /// and the displaced node is returned.
    pub fn register(&mut self, highlight_index: usize, node: NodeIndex) -> Option<NodeIndex> {
        self.map.insert(highlight_index, node)
    }

    /// Get node position by highlight index
    pub fn get(&self, highlight_index: usize) -> Option<NodeIndex> {
        self.map.get(&highlight_index).copied()
    }

    /// Get the number of registered elements
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all (highlight index, node) pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (usize, NodeIndex)> + '_ {
        self.map.iter().map(|(index, node)| (*index, *node))
    }

    /// Get all highlight indices in registration order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.map.keys().copied()
    }

    /// Highlight indices in ascending order
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<_> = self.indices().collect();
        indices.sort_unstable();
        indices
    }

    /// Export to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.map)
    }
}
