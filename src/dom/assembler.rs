//! Two-pass tree reconstruction.
//!
//! Pass 1 builds every record into the arena and registers highlighted
//! elements as it goes. Pass 2 wires children to parents by id lookup.
//! Snapshots above [`AssemblerConfig::large_snapshot_threshold`] are built in
//! batches, and unhighlighted leaves are skipped entirely.

use crate::dom::element::{DomNode, NodeBuilder, NodeIndex, DEFAULT_MAX_ATTRIBUTES};
use crate::dom::instrument::{timed, Instrumentation, Phase};
use crate::dom::selector_map::SelectorMap;
use crate::dom::snapshot::{has_children_field, has_highlight_index, NodeId, Snapshot};
use crate::dom::tree::DomState;
use crate::error::{BrowserError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Tuning for [`TreeAssembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Node count above which batching and leaf pruning kick in
    pub large_snapshot_threshold: usize,

    /// Records per batch in large mode
    pub batch_size: usize,

    /// Emit a reclaim hint after this many batches
    pub reclaim_every_batches: usize,

    /// Attribute count above which the allow-list filter applies
    pub max_attributes: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            large_snapshot_threshold: 10_000,
            batch_size: 1_000,
            reclaim_every_batches: 5,
            max_attributes: DEFAULT_MAX_ATTRIBUTES,
        }
    }
}

impl AssemblerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set large snapshot threshold
    pub fn large_snapshot_threshold(mut self, threshold: usize) -> Self {
        self.large_snapshot_threshold = threshold;
        self
    }

    /// Builder method: set batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Builder method: set reclaim interval
    pub fn reclaim_every_batches(mut self, batches: usize) -> Self {
        self.reclaim_every_batches = batches;
        self
    }

    /// Builder method: set attribute limit
    pub fn max_attributes(mut self, limit: usize) -> Self {
        self.max_attributes = limit;
        self
    }
}

/// Nodes built by pass 1, waiting to be wired
struct BuildOutput {
    nodes: Vec<DomNode>,
    id_table: HashMap<NodeId, NodeIndex>,
    pending_children: Vec<(NodeIndex, Vec<Value>)>,
    selector_map: SelectorMap,
}

/// Rebuilds [`DomState`]s from decoded snapshots
#[derive(Debug, Clone, Default)]
pub struct TreeAssembler {
    config: AssemblerConfig,
    builder: NodeBuilder,
}

impl TreeAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        let builder = NodeBuilder::new(config.max_attributes);
        Self { config, builder }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Rebuild the tree of a flat snapshot
    pub fn assemble(&self, snapshot: Snapshot, instrumentation: &dyn Instrumentation) -> Result<DomState> {
        let Snapshot { node_map, root_id, .. } = snapshot;

        let built = timed(instrumentation, Phase::BuildPass, || self.build_pass(&node_map, instrumentation));

        let BuildOutput {
            mut nodes,
            id_table,
            pending_children,
            selector_map,
        } = built;

        let root = match id_table.get(&root_id) {
            Some(&index) if nodes[index].is_element() => index,
            Some(_) => {
                return Err(BrowserError::RootResolutionFailed(format!(
                    "root id '{}' is a text node",
                    root_id
                )));
            }
            None => {
                return Err(BrowserError::RootResolutionFailed(format!(
                    "root id '{}' was not built",
                    root_id
                )));
            }
        };

        timed(instrumentation, Phase::WirePass, || {
            wire_children(&mut nodes, &id_table, pending_children, root)
        });

        timed(instrumentation, Phase::Cleanup, || {
            drop(id_table);
            drop(node_map);
        });

        DomState::from_parts(nodes, root, selector_map)
    }

    fn build_pass(
        &self,
        node_map: &indexmap::IndexMap<NodeId, Value>,
        instrumentation: &dyn Instrumentation,
    ) -> BuildOutput {
        let mut output = BuildOutput {
            nodes: Vec::with_capacity(node_map.len()),
            id_table: HashMap::with_capacity(node_map.len()),
            pending_children: Vec::new(),
            selector_map: SelectorMap::new(),
        };

        let large = node_map.len() > self.config.large_snapshot_threshold;
        if !large {
            for (id, record) in node_map {
                self.build_entry(id, record, &mut output);
            }
            return output;
        }

        let highlighted: HashSet<&NodeId> = node_map
            .iter()
            .filter(|(_, record)| has_highlight_index(record))
            .map(|(id, _)| id)
            .collect();

        log::debug!(
            "Large snapshot: {} nodes, {} highlighted, batches of {}",
            node_map.len(),
            highlighted.len(),
            self.config.batch_size
        );

        let entries: Vec<(&NodeId, &Value)> = node_map.iter().collect();
        let mut skipped = 0usize;

        for (batch_number, batch) in entries.chunks(self.config.batch_size.max(1)).enumerate() {
            for &(id, record) in batch {
                // leaves nobody can act on never make it into the tree
                if !highlighted.is_empty() && !has_children_field(record) && !highlighted.contains(id) {
                    skipped += 1;
                    continue;
                }
                self.build_entry(id, record, &mut output);
            }

            let done = batch_number + 1;
            if self.config.reclaim_every_batches > 0 && done % self.config.reclaim_every_batches == 0 {
                instrumentation.reclaim_hint(done);
            }
        }

        log::debug!("Skipped {} unhighlighted leaf records", skipped);
        output
    }

    fn build_entry(&self, id: &NodeId, record: &Value, output: &mut BuildOutput) {
        let built = match self.builder.build(record) {
            Ok(Some(built)) => built,
            Ok(None) => return,
            Err(e) => {
                log::debug!("Dropping node '{}': {}", id, e);
                return;
            }
        };

        let index = output.nodes.len();

        if let DomNode::Element(element) = &built.node {
            if let Some(highlight_index) = element.highlight_index {
                if let Some(previous) = output.selector_map.register(highlight_index, index) {
                    log::warn!(
                        "Highlight index {} appears more than once; position {} replaces {}",
                        highlight_index,
                        index,
                        previous
                    );
                }
            }
            if let Some(children) = built.children {
                output.pending_children.push((index, children));
            }
        }

        output.id_table.insert(id.clone(), index);
        output.nodes.push(built.node);
    }

    /// Rebuild the tree of a legacy payload whose records nest their children
    pub fn assemble_legacy(&self, payload: Value, instrumentation: &dyn Instrumentation) -> Result<DomState> {
        let nodes = timed(instrumentation, Phase::BuildPass, || self.build_nested(payload))?;

        // selector map comes from a full walk of the finished tree
        timed(instrumentation, Phase::WirePass, || DomState::with_derived_selector_map(nodes, 0))
    }

    fn build_nested(&self, payload: Value) -> Result<Vec<DomNode>> {
        let root = match self.builder.build(&payload) {
            Ok(Some(built)) => built,
            Ok(None) => {
                return Err(BrowserError::RootResolutionFailed("legacy payload is empty".to_string()));
            }
            Err(e) => {
                return Err(BrowserError::RootResolutionFailed(format!(
                    "legacy root could not be built: {}",
                    e
                )));
            }
        };

        if !root.node.is_element() {
            return Err(BrowserError::RootResolutionFailed(
                "legacy root is a text node".to_string(),
            ));
        }

        let mut nodes = vec![root.node];
        let mut stack: Vec<(NodeIndex, Value)> = Vec::new();
        push_nested_children(&mut stack, 0, root.children);

        while let Some((parent, record)) = stack.pop() {
            let mut built = match self.builder.build(&record) {
                Ok(Some(built)) => built,
                Ok(None) => continue,
                Err(e) => {
                    log::debug!("Dropping nested node under position {}: {}", parent, e);
                    continue;
                }
            };

            let index = nodes.len();
            built.node.set_parent(parent);
            if let Some(element) = nodes[parent].as_element_mut() {
                element.children.push(index);
            }
            nodes.push(built.node);

            if nodes[index].is_element() {
                push_nested_children(&mut stack, index, built.children);
            }
        }

        Ok(nodes)
    }
}

fn push_nested_children(stack: &mut Vec<(NodeIndex, Value)>, parent: NodeIndex, children: Option<Vec<Value>>) {
    // reversed so the stack pops them in page order
    for child in children.into_iter().flatten().rev() {
        if child.is_object() {
            stack.push((parent, child));
        }
    }
}

/// Pass 2. A child keeps the first parent that claims it and the root is never
/// adopted, so whatever hangs off the root is a tree even for malformed input.
fn wire_children(
    nodes: &mut [DomNode],
    id_table: &HashMap<NodeId, NodeIndex>,
    pending_children: Vec<(NodeIndex, Vec<Value>)>,
    root: NodeIndex,
) {
    let mut orphans = 0usize;

    for (parent, children) in pending_children {
        for child in children {
            let Some(child_id) = NodeId::from_value(&child) else {
                orphans += 1;
                continue;
            };
            let Some(&child_index) = id_table.get(&child_id) else {
                log::trace!("Child id '{}' is not in the node map", child_id);
                orphans += 1;
                continue;
            };

            if child_index == parent || child_index == root || nodes[child_index].parent().is_some() {
                log::debug!("Ignoring extra edge {} -> '{}'", parent, child_id);
                continue;
            }

            nodes[child_index].set_parent(parent);
            if let Some(element) = nodes[parent].as_element_mut() {
                element.children.push(child_index);
            }
        }
    }

    if orphans > 0 {
        log::debug!("Dropped {} orphan child references", orphans);
    }
}
