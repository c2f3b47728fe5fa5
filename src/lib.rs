//! # browser-dom
//!
//! Rebuilds a navigable DOM tree from the flat page snapshot produced by an
//! in-page extraction script, together with an index of the interactive
//! elements an automation agent can act on.
//!
//! ## Features
//!
//! - **Snapshot decoding**: JSON text or structured payloads, flat node maps or the legacy nested form
//! - **Two-pass reconstruction**: arena-allocated nodes, wired by id in a second pass
//! - **Memory bounding**: attribute filtering, pruning of inert nodes, batched builds for large pages
//! - **Selector map**: highlight index → element, collected while building
//! - **Build cache**: per-call-site, time-bounded memo of the last result
//!
//! ## Usage
//!
//! ### Replaying a captured snapshot
//!
//! ```rust,no_run
//! use browser_dom::{DomService, StaticBridge};
//! use serde_json::json;
//!
//! # async fn run() -> browser_dom::Result<()> {
//! let bridge = StaticBridge::new(json!({
//!     "rootId": "0",
//!     "map": {
//!         "0": {"tagName": "body", "xpath": "/html/body", "isVisible": true, "children": ["1"]},
//!         "1": {"tagName": "button", "xpath": "/html/body/button", "isVisible": true, "highlightIndex": 0}
//!     }
//! }));
//!
//! let service = DomService::new(bridge);
//! let dom = service.reconstruct(true, -1, 0).await?;
//! println!("Found {} interactive elements", dom.count_interactive());
//! # Ok(())
//! # }
//! ```
//!
//! ### Live pages
//!
//! ```rust,no_run
//! use browser_dom::{BrowserSession, BuildParams, LaunchOptions};
//!
//! # async fn run() -> browser_dom::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! session.navigate("https://example.com")?;
//!
//! let script = std::fs::read_to_string("build_dom_tree.js").unwrap_or_default();
//! let service = session.dom_service(script)?;
//! let dom = service.clickable_elements(BuildParams::default()).await?;
//! print!("{}", dom.outline());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`dom`]: decoding, node building, tree assembly, caching and the service entry point
//! - [`browser`]: the extraction bridge and Chrome session management
//! - [`error`]: Error types and result aliases

pub mod browser;
pub mod dom;
pub mod error;

pub use browser::{BrowserSession, ExtractionBridge, LaunchOptions, StaticBridge, TabBridge};
pub use dom::{
    BuildParams, DomNode, DomService, DomServiceConfig, DomState, ElementNode, SelectorMap, TextNode,
};
pub use error::{BrowserError, Result};
