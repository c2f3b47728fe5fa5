//! The seam to the page: one request/response call that runs the extraction
//! script and returns its raw result.

use crate::dom::service::BuildParams;
use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use headless_chrome::Tab;
use serde_json::Value;
use std::sync::Arc;

/// Runs the in-page extraction routine.
///
/// Implementations return either a JSON string or an already-structured value.
/// Failures surface as [`BrowserError::BridgeFailed`] and are not retried.
#[async_trait]
pub trait ExtractionBridge: Send + Sync {
    async fn extract(&self, params: &BuildParams) -> Result<Value>;
}

#[async_trait]
impl<T: ExtractionBridge + ?Sized> ExtractionBridge for Arc<T> {
    async fn extract(&self, params: &BuildParams) -> Result<Value> {
        (**self).extract(params).await
    }
}

/// Bridge over a live Chrome tab.
///
/// `script` is the source of a JavaScript function taking the build
/// parameters object, e.g. `(args) => JSON.stringify(buildDomTree(args))`.
#[derive(Clone)]
pub struct TabBridge {
    tab: Arc<Tab>,
    script: Arc<str>,
}

impl TabBridge {
    pub fn new(tab: Arc<Tab>, script: impl Into<Arc<str>>) -> Self {
        Self {
            tab,
            script: script.into(),
        }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }
}

/// Expression that invokes the extraction function with `params`
pub fn call_expression(script: &str, params: &BuildParams) -> Result<String> {
    let args = serde_json::to_string(params)
        .map_err(|e| BrowserError::BridgeFailed(format!("Failed to encode extraction arguments: {}", e)))?;
    let function = script.trim().trim_end_matches(';');
    Ok(format!("({})({})", function, args))
}

#[async_trait]
impl ExtractionBridge for TabBridge {
    async fn extract(&self, params: &BuildParams) -> Result<Value> {
        let expression = call_expression(&self.script, params)?;
        let tab = Arc::clone(&self.tab);

        // headless_chrome blocks on the CDP round trip
        let result = tokio::task::spawn_blocking(move || tab.evaluate(&expression, true))
            .await
            .map_err(|e| BrowserError::BridgeFailed(format!("DOM extraction task failed: {}", e)))?
            .map_err(|e| BrowserError::BridgeFailed(format!("Failed to execute DOM extraction script: {}", e)))?;

        result
            .value
            .ok_or_else(|| BrowserError::BridgeFailed("No value returned from DOM extraction".to_string()))
    }
}

/// Bridge that replays a captured payload
#[derive(Debug, Clone)]
pub struct StaticBridge {
    payload: Value,
}

impl StaticBridge {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Replay a payload exactly as the script returned it, as text
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(Value::String(text.into()))
    }
}

#[async_trait]
impl ExtractionBridge for StaticBridge {
    async fn extract(&self, _params: &BuildParams) -> Result<Value> {
        Ok(self.payload.clone())
    }
}
