//! DOM service - reconstruction entry point.
//!
//! Asks the extraction bridge for a snapshot, decodes it and rebuilds the
//! tree, memoizing the result per call site:
//! - [`DomService::clickable_elements`] is what agents call
//! - [`DomService::build_dom_tree`] is the lower-level build, with its own TTL

use crate::browser::bridge::ExtractionBridge;
use crate::dom::assembler::{AssemblerConfig, TreeAssembler};
use crate::dom::cache::BuildCache;
use crate::dom::instrument::{timed, Instrumentation, NoopInstrumentation, Phase};
use crate::dom::snapshot::{decode_payload, DecodedPayload};
use crate::dom::tree::DomState;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Arguments handed to the extraction script; also the cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildParams {
    /// Draw highlight overlays on indexed elements
    pub do_highlight_elements: bool,

    /// Highlight only this index; -1 for all
    pub focus_highlight_index: i64,

    /// Pixels beyond the viewport still considered in view; -1 for the whole page
    pub viewport_expansion: i64,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            do_highlight_elements: true,
            focus_highlight_index: -1,
            viewport_expansion: 0,
        }
    }
}

impl BuildParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set highlighting
    pub fn highlight(mut self, enabled: bool) -> Self {
        self.do_highlight_elements = enabled;
        self
    }

    /// Builder method: set focused highlight index
    pub fn focus(mut self, index: i64) -> Self {
        self.focus_highlight_index = index;
        self
    }

    /// Builder method: set viewport expansion
    pub fn viewport_expansion(mut self, pixels: i64) -> Self {
        self.viewport_expansion = pixels;
        self
    }
}

/// Configuration for [`DomService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomServiceConfig {
    /// Freshness window of [`DomService::clickable_elements`] results
    pub clickable_ttl: Duration,

    /// Freshness window of [`DomService::build_dom_tree`] results
    pub tree_ttl: Duration,

    pub assembler: AssemblerConfig,
}

impl Default for DomServiceConfig {
    fn default() -> Self {
        Self {
            clickable_ttl: Duration::from_millis(1000),
            tree_ttl: Duration::from_millis(500),
            assembler: AssemblerConfig::default(),
        }
    }
}

impl DomServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set clickable-elements TTL
    pub fn clickable_ttl(mut self, ttl: Duration) -> Self {
        self.clickable_ttl = ttl;
        self
    }

    /// Builder method: set tree-build TTL
    pub fn tree_ttl(mut self, ttl: Duration) -> Self {
        self.tree_ttl = ttl;
        self
    }

    /// Builder method: disable both caches
    pub fn without_cache(self) -> Self {
        self.clickable_ttl(Duration::ZERO).tree_ttl(Duration::ZERO)
    }

    /// Builder method: set assembler tuning
    pub fn assembler(mut self, assembler: AssemblerConfig) -> Self {
        self.assembler = assembler;
        self
    }
}

/// Main DOM service, one per page
///
/// Each cache slot sits behind an async mutex held across the bridge call, so
/// concurrent callers on one instance queue up instead of extracting twice.
pub struct DomService<B> {
    bridge: B,
    assembler: TreeAssembler,
    instrumentation: Arc<dyn Instrumentation>,
    clickable_cache: Mutex<BuildCache>,
    tree_cache: Mutex<BuildCache>,
}

impl<B: ExtractionBridge> DomService<B> {
    /// Create new DOM service with default config
    pub fn new(bridge: B) -> Self {
        Self::with_config(bridge, DomServiceConfig::default())
    }

    /// Create DOM service with custom config
    pub fn with_config(bridge: B, config: DomServiceConfig) -> Self {
        Self {
            bridge,
            assembler: TreeAssembler::new(config.assembler),
            instrumentation: Arc::new(NoopInstrumentation),
            clickable_cache: Mutex::new(BuildCache::new(config.clickable_ttl)),
            tree_cache: Mutex::new(BuildCache::new(config.tree_ttl)),
        }
    }

    /// Builder method: install an instrumentation hook
    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Rebuild the page, serving a fresh cached result when one exists
    pub async fn reconstruct(
        &self,
        do_highlight_elements: bool,
        focus_highlight_index: i64,
        viewport_expansion: i64,
    ) -> Result<Arc<DomState>> {
        self.clickable_elements(BuildParams {
            do_highlight_elements,
            focus_highlight_index,
            viewport_expansion,
        })
        .await
    }

    /// Tree plus selector map of everything an agent can act on
    pub async fn clickable_elements(&self, params: BuildParams) -> Result<Arc<DomState>> {
        let mut cache = self.clickable_cache.lock().await;
        if let Some(state) = cache.get(&params) {
            log::debug!("Using cached clickable elements for {:?}", params);
            return Ok(state);
        }

        // keep the tree's build time so a reused tree does not look younger than it is
        let (state, built_at) = self.tree_entry(params).await?;
        cache.store_at(params, Arc::clone(&state), built_at);
        Ok(state)
    }

    /// Lower-level tree build with its own freshness window
    pub async fn build_dom_tree(&self, params: BuildParams) -> Result<Arc<DomState>> {
        self.tree_entry(params).await.map(|(state, _)| state)
    }

    async fn tree_entry(&self, params: BuildParams) -> Result<(Arc<DomState>, tokio::time::Instant)> {
        let mut cache = self.tree_cache.lock().await;
        if let Some(entry) = cache.entry(&params) {
            log::debug!("Using cached DOM tree for {:?}", params);
            return Ok(entry);
        }

        let state = Arc::new(self.reconstruct_uncached(params).await?);
        let built_at = cache.store(params, Arc::clone(&state));
        Ok((state, built_at))
    }

    /// Drop both cached results
    pub async fn invalidate(&self) {
        self.clickable_cache.lock().await.invalidate();
        self.tree_cache.lock().await.invalidate();
    }

    /// Force a fresh extraction, then cache it as usual
    pub async fn rebuild(&self, params: BuildParams) -> Result<Arc<DomState>> {
        self.invalidate().await;
        self.clickable_elements(params).await
    }

    async fn reconstruct_uncached(&self, params: BuildParams) -> Result<DomState> {
        let instrumentation = self.instrumentation.as_ref();
        let started = Instant::now();

        let payload = self.bridge.extract(&params).await?;
        let bridge_elapsed = started.elapsed();
        log::info!("DOM extraction script time: {:.3}(Sec)", bridge_elapsed.as_secs_f64());
        instrumentation.record(Phase::BridgeCall, bridge_elapsed);

        let decoded = timed(instrumentation, Phase::Decode, || decode_payload(payload))?;

        let state = match decoded {
            DecodedPayload::Flat(snapshot) => {
                log::debug!("Rebuilding {} snapshot nodes", snapshot.len());
                self.assembler.assemble(snapshot, instrumentation)?
            }
            DecodedPayload::Legacy(node) => self.assembler.assemble_legacy(node, instrumentation)?,
        };

        instrumentation.record(Phase::Total, started.elapsed());
        log::debug!(
            "Rebuilt DOM: {} nodes, {} interactive",
            state.len(),
            state.count_interactive()
        );

        Ok(state)
    }
}
