//! DOM reconstruction module
//!
//! This module rebuilds the page structure from the flat snapshot produced by
//! the in-page extraction script. It includes:
//! - snapshot: payload decoding and raw records
//! - element: DomNode/ElementNode and the per-record NodeBuilder
//! - assembler: two-pass TreeAssembler (flat and legacy payloads)
//! - tree: DomState, the arena holding the rebuilt tree
//! - selector_map: highlight index to element mapping
//! - cache: single-slot BuildCache
//! - instrument: phase timing hooks
//! - service: DomService, the cached reconstruction entry point

pub mod assembler;
pub mod cache;
pub mod element;
pub mod instrument;
pub mod selector_map;
pub mod service;
pub mod snapshot;
pub mod tree;

pub use assembler::{AssemblerConfig, TreeAssembler};
pub use cache::BuildCache;
pub use element::{DomNode, ElementNode, NodeBuilder, NodeIndex, TextNode, ViewportInfo};
pub use instrument::{Instrumentation, LogInstrumentation, NoopInstrumentation, Phase, PhaseStats, PhaseTimings};
pub use selector_map::SelectorMap;
pub use service::{BuildParams, DomService, DomServiceConfig};
pub use snapshot::{decode_payload, DecodedPayload, NodeId, RawNodeRecord, Snapshot};
pub use tree::DomState;

use crate::error::Result;
use serde_json::Value;

/// Rebuild a captured payload without going through a bridge or cache
pub fn rebuild_from_payload(payload: Value) -> Result<DomState> {
    rebuild_with(&TreeAssembler::default(), payload)
}

/// Rebuild a captured payload with a specific assembler
pub fn rebuild_with(assembler: &TreeAssembler, payload: Value) -> Result<DomState> {
    match decode_payload(payload)? {
        DecodedPayload::Flat(snapshot) => assembler.assemble(snapshot, &NoopInstrumentation),
        DecodedPayload::Legacy(node) => assembler.assemble_legacy(node, &NoopInstrumentation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rebuild_from_text_payload() {
        let text = r#"{"map": {"0": {"tagName": "html", "xpath": "/html"}}, "rootId": "0"}"#;
        let state = rebuild_from_payload(Value::String(text.to_string())).unwrap();
        assert_eq!(state.root().tag_name, "html");
    }

    #[test]
    fn test_rebuild_from_legacy_payload() {
        let state = rebuild_from_payload(json!({"tagName": "body", "xpath": "/body"})).unwrap();
        assert_eq!(state.root().tag_name, "body");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_loosely_typed_records_are_kept() {
        let payload = json!({
            "map": {
                "0": {"tagName": "body", "xpath": "/html/body", "isVisible": true, "isTopElement": null,
                      "children": ["1"]},
                "1": {"tagName": "a", "xpath": "/html/body/a", "isVisible": true, "isInteractive": true,
                      "highlightIndex": 0, "attributes": {"tabindex": 0, "href": "/x"}}
            },
            "rootId": "0"
        });

        let state = rebuild_from_payload(payload).unwrap();
        assert_eq!(state.root().tag_name, "body");
        assert!(!state.root().is_top_element);
        assert_eq!(state.len(), 2);
        assert_eq!(state.count_interactive(), 1);

        let link = state.element_by_highlight(0).unwrap();
        assert_eq!(link.get_attribute("tabindex"), Some(&"0".to_string()));
        assert_eq!(link.get_attribute("href"), Some(&"/x".to_string()));
    }
}
