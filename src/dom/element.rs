use crate::dom::snapshot::{RawElementRecord, RawNodeRecord, RawTextRecord};
use crate::error::{BrowserError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of a node inside a [`DomState`](crate::dom::DomState) arena
pub type NodeIndex = usize;

/// Attribute count above which only [`ATTRIBUTE_ALLOW_LIST`] survives
pub const DEFAULT_MAX_ATTRIBUTES: usize = 20;

/// Attributes kept on elements whose attribute count exceeds the limit
pub const ATTRIBUTE_ALLOW_LIST: [&str; 11] = [
    "id",
    "class",
    "name",
    "type",
    "value",
    "href",
    "src",
    "alt",
    "title",
    "placeholder",
    "aria-label",
];

/// Viewport size reported alongside an element
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewportInfo {
    pub width: i64,
    pub height: i64,
}

/// Represents a DOM text node
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub is_visible: bool,

    /// Enclosing element, for upward navigation only
    pub parent: Option<NodeIndex>,
}

/// Represents a DOM element node
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    /// HTML tag name (e.g., "div", "button", "input")
    pub tag_name: String,

    /// XPath of the element as computed by the extractor
    pub xpath: String,

    /// Element attributes, in page order
    pub attributes: IndexMap<String, String>,

    /// Child nodes, in page order
    pub children: Vec<NodeIndex>,

    pub is_visible: bool,
    pub is_interactive: bool,

    /// Whether the element is the topmost one at its own position
    pub is_top_element: bool,

    pub is_in_viewport: bool,

    /// Handle assigned by the extractor to elements an agent can act on
    pub highlight_index: Option<usize>,

    pub shadow_root: bool,

    pub viewport_info: Option<ViewportInfo>,

    /// Enclosing element, for upward navigation only
    pub parent: Option<NodeIndex>,
}

impl ElementNode {
    /// Create a new ElementNode
    pub fn new(tag_name: impl Into<String>, xpath: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            xpath: xpath.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            is_visible: false,
            is_interactive: false,
            is_top_element: false,
            is_in_viewport: false,
            highlight_index: None,
            shadow_root: false,
            viewport_info: None,
            parent: None,
        }
    }

    /// Builder method: set attributes
    pub fn with_attributes(mut self, attributes: IndexMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Builder method: set highlight index
    pub fn with_highlight_index(mut self, index: usize) -> Self {
        self.highlight_index = Some(index);
        self
    }

    /// Builder method: set visibility
    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.is_visible = visible;
        self
    }

    /// Get attribute value by key
    pub fn get_attribute(&self, key: &str) -> Option<&String> {
        self.attributes.get(key)
    }

    /// Get element ID
    pub fn id(&self) -> Option<&String> {
        self.get_attribute("id")
    }

    /// Whether the element carries a highlight index
    pub fn is_highlighted(&self) -> bool {
        self.highlight_index.is_some()
    }

    /// Convert to a one-line opening-tag representation
    pub fn to_simple_string(&self) -> String {
        let mut parts = vec![format!("<{}", self.tag_name)];

        if let Some(id) = self.id() {
            parts.push(format!(" id=\"{}\"", id));
        }

        if let Some(class) = self.attributes.get("class") {
            parts.push(format!(" class=\"{}\"", class));
        }

        if let Some(index) = self.highlight_index {
            parts.push(format!(" data-highlight-index=\"{}\"", index));
        }

        if self.shadow_root {
            parts.push(" shadow-root".to_string());
        }

        parts.push(">".to_string());
        parts.join("")
    }
}

/// A node of the rebuilt tree
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(TextNode),
}

impl DomNode {
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            DomNode::Element(element) => Some(element),
            DomNode::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            DomNode::Element(element) => Some(element),
            DomNode::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            DomNode::Text(text) => Some(text),
            DomNode::Element(_) => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, DomNode::Element(_))
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        match self {
            DomNode::Element(element) => element.parent,
            DomNode::Text(text) => text.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: NodeIndex) {
        match self {
            DomNode::Element(element) => element.parent = Some(parent),
            DomNode::Text(text) => text.parent = Some(parent),
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            DomNode::Element(element) => element.is_visible,
            DomNode::Text(text) => text.is_visible,
        }
    }
}

/// A node built in isolation, with the raw `children` list it still has to be wired to
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltNode {
    pub node: DomNode,
    pub children: Option<Vec<Value>>,
}

/// Turns raw records into nodes, applying pruning and attribute filtering
#[derive(Debug, Clone, Copy)]
pub struct NodeBuilder {
    max_attributes: usize,
}

impl NodeBuilder {
    pub fn new(max_attributes: usize) -> Self {
        Self { max_attributes }
    }

    /// Parse and build one record. `Ok(None)` for an absent or empty record.
    pub fn build(&self, value: &Value) -> Result<Option<BuiltNode>> {
        match RawNodeRecord::from_value(value)? {
            Some(record) => self.build_record(record).map(Some),
            None => Ok(None),
        }
    }

    pub fn build_record(&self, record: RawNodeRecord) -> Result<BuiltNode> {
        match record {
            RawNodeRecord::Text(text) => self.build_text(text),
            RawNodeRecord::Element(element) => self.build_element(element),
        }
    }

    fn build_text(&self, record: RawTextRecord) -> Result<BuiltNode> {
        let (Some(text), Some(is_visible)) = (record.text, record.is_visible) else {
            return Err(BrowserError::InvalidStructure(
                "text record requires 'text' and 'isVisible'".to_string(),
            ));
        };

        Ok(BuiltNode {
            node: DomNode::Text(TextNode {
                text,
                is_visible,
                parent: None,
            }),
            children: None,
        })
    }

    fn build_element(&self, record: RawElementRecord) -> Result<BuiltNode> {
        let (Some(tag_name), Some(xpath)) = (record.tag_name, record.xpath) else {
            return Err(BrowserError::InvalidStructure(
                "element record requires 'tagName' and 'xpath'".to_string(),
            ));
        };

        // Invisible, inert, unindexed: keep the skeleton only
        if !record.is_visible && !record.is_interactive && record.highlight_index.is_none() {
            return Ok(BuiltNode {
                node: DomNode::Element(ElementNode::new(tag_name, xpath)),
                children: record.children,
            });
        }

        let element = ElementNode {
            tag_name,
            xpath,
            attributes: self.filter_attributes(record.attributes),
            children: Vec::new(),
            is_visible: record.is_visible,
            is_interactive: record.is_interactive,
            is_top_element: record.is_top_element,
            is_in_viewport: record.is_in_viewport,
            highlight_index: record.highlight_index,
            shadow_root: record.shadow_root,
            viewport_info: record.viewport.map(|viewport| ViewportInfo {
                width: viewport.width,
                height: viewport.height,
            }),
            parent: None,
        };

        Ok(BuiltNode {
            node: DomNode::Element(element),
            children: record.children,
        })
    }

    fn filter_attributes(&self, attributes: IndexMap<String, String>) -> IndexMap<String, String> {
        if attributes.len() <= self.max_attributes {
            return attributes;
        }

        attributes
            .into_iter()
            .filter(|(key, _)| ATTRIBUTE_ALLOW_LIST.contains(&key.as_str()))
            .collect()
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTRIBUTES)
    }
}
