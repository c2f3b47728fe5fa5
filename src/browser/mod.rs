//! Browser-side plumbing: the extraction bridge and Chrome session management

pub mod bridge;
pub mod config;
pub mod session;

pub use bridge::{ExtractionBridge, StaticBridge, TabBridge};
pub use config::LaunchOptions;
pub use session::BrowserSession;
