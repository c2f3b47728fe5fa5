use async_trait::async_trait;
use browser_dom::dom::{Phase, PhaseTimings};
use browser_dom::{
    BrowserError, BrowserSession, BuildParams, DomService, DomServiceConfig, ExtractionBridge, LaunchOptions, Result,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replays a payload and counts how often it was asked to
struct CountingBridge {
    payload: Value,
    calls: AtomicUsize,
}

impl CountingBridge {
    fn new(payload: Value) -> Self {
        Self {
            payload,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBridge for CountingBridge {
    async fn extract(&self, _params: &BuildParams) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

struct FailingBridge;

#[async_trait]
impl ExtractionBridge for FailingBridge {
    async fn extract(&self, _params: &BuildParams) -> Result<Value> {
        Err(BrowserError::BridgeFailed("target closed".to_string()))
    }
}

fn div_with_text() -> Value {
    json!({
        "map": {
            "0": {"type": "ELEMENT", "tagName": "div", "xpath": "/html/body/div", "children": ["1"]},
            "1": {"type": "TEXT_NODE", "text": "hi", "isVisible": true}
        },
        "rootId": "0"
    })
}

fn login_form() -> Value {
    json!({
        "map": {
            "1": {"tagName": "body", "xpath": "/html/body", "isVisible": true, "children": ["2", "9"]},
            "2": {"tagName": "form", "xpath": "/html/body/form", "isVisible": true, "children": ["3", "4", "5", "99"]},
            "3": {"tagName": "input", "xpath": "/html/body/form/input[1]", "isVisible": true, "isInteractive": true,
                  "isTopElement": true, "isInViewport": true, "highlightIndex": 0,
                  "attributes": {"name": "user", "type": "text"}},
            "4": {"tagName": "input", "xpath": "/html/body/form/input[2]", "isVisible": true, "isInteractive": true,
                  "highlightIndex": 1, "attributes": {"name": "pass", "type": "password"}},
            "5": {"tagName": "button", "xpath": "/html/body/form/button", "isVisible": true, "isInteractive": true,
                  "highlightIndex": 2, "children": ["6"]},
            "6": {"type": "TEXT_NODE", "text": "Sign in", "isVisible": true},
            "9": {"tagName": "div", "xpath": "/html/body/div", "isVisible": false,
                  "attributes": {"id": "x", "data-foo": "bar"}}
        },
        "rootId": 1
    })
}

#[tokio::test]
async fn test_div_with_text_end_to_end() {
    let service = DomService::new(CountingBridge::new(div_with_text()));

    let dom = service.reconstruct(true, -1, 0).await.expect("Failed to rebuild DOM");

    assert_eq!(dom.root().tag_name, "div");
    assert_eq!(dom.root().children.len(), 1);
    let text = dom.node(dom.root().children[0]).unwrap().as_text().unwrap();
    assert_eq!(text.text, "hi");
    assert!(dom.selector_map().is_empty());
}

#[tokio::test]
async fn test_login_form() {
    let service = DomService::new(CountingBridge::new(login_form()));
    let dom = service.clickable_elements(BuildParams::default()).await.unwrap();

    assert_eq!(dom.len(), 7);
    assert_eq!(dom.count_interactive(), 3);

    let button = dom.selector_map().get(2).unwrap();
    assert_eq!(dom.element(button).unwrap().tag_name, "button");
    assert_eq!(dom.parent_element(button).unwrap().tag_name, "form");

    // "99" is not in the map
    let form = dom.parent(button).unwrap();
    assert_eq!(dom.children(form).len(), 3);

    // inert chrome keeps no attributes and is not indexed
    let hidden = dom.root().children[1];
    assert!(dom.element(hidden).unwrap().attributes.is_empty());
    assert!(dom.selector_map().iter().all(|(_, node)| node != hidden));

    let user = dom.element_by_highlight(0).unwrap();
    assert_eq!(user.get_attribute("name"), Some(&"user".to_string()));
    assert!(user.is_top_element);
}

#[tokio::test]
async fn test_text_payload() {
    let payload = Value::String(serde_json::to_string(&login_form()).unwrap());
    let service = DomService::new(CountingBridge::new(payload));

    let dom = service.clickable_elements(BuildParams::default()).await.unwrap();
    assert_eq!(dom.count_interactive(), 3);
}

#[tokio::test]
async fn test_legacy_payload_matches_flat_selector_map() {
    let legacy = json!({
        "tagName": "body", "xpath": "/html/body", "isVisible": true,
        "children": [
            {"tagName": "form", "xpath": "/html/body/form", "isVisible": true, "children": [
                {"tagName": "input", "xpath": "/html/body/form/input[1]", "isVisible": true, "highlightIndex": 0},
                {"tagName": "input", "xpath": "/html/body/form/input[2]", "isVisible": true, "highlightIndex": 1},
                {"tagName": "button", "xpath": "/html/body/form/button", "isVisible": true, "highlightIndex": 2}
            ]}
        ]
    });

    let flat = DomService::new(CountingBridge::new(login_form()))
        .clickable_elements(BuildParams::default())
        .await
        .unwrap();
    let nested = DomService::new(CountingBridge::new(legacy))
        .clickable_elements(BuildParams::default())
        .await
        .unwrap();

    let xpaths = |dom: &browser_dom::DomState| -> Vec<(usize, String)> {
        dom.clickable_elements()
            .into_iter()
            .map(|(index, element)| (index, element.xpath.clone()))
            .collect()
    };
    assert_eq!(xpaths(&flat), xpaths(&nested));
}

#[tokio::test]
async fn test_identical_snapshots_rebuild_identically() {
    let service = DomService::with_config(
        CountingBridge::new(login_form()),
        DomServiceConfig::new().without_cache(),
    );

    let first = service.clickable_elements(BuildParams::default()).await.unwrap();
    let second = service.clickable_elements(BuildParams::default()).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
    assert_eq!(service.bridge().calls(), 2);
}

#[tokio::test]
async fn test_root_errors() {
    let text_root = json!({
        "map": {"0": {"type": "TEXT_NODE", "text": "x", "isVisible": true}},
        "rootId": "0"
    });
    let err = DomService::new(CountingBridge::new(text_root))
        .reconstruct(true, -1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::RootResolutionFailed(_)));

    let missing_root = json!({"map": {}, "rootId": "42"});
    let err = DomService::new(CountingBridge::new(missing_root))
        .reconstruct(true, -1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::RootResolutionFailed(_)));
}

#[tokio::test]
async fn test_decode_errors() {
    let err = DomService::new(CountingBridge::new(json!("not json at all")))
        .reconstruct(true, -1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::DecodeFailed(_)));

    let err = DomService::new(CountingBridge::new(json!(["map", "rootId"])))
        .reconstruct(true, -1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::InvalidStructure(_)));
}

#[tokio::test]
async fn test_bridge_error_propagates() {
    let err = DomService::new(FailingBridge)
        .reconstruct(true, -1, 0)
        .await
        .unwrap_err();

    assert!(matches!(err, BrowserError::BridgeFailed(ref msg) if msg == "target closed"));
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_within_ttl() {
    let service = DomService::new(CountingBridge::new(login_form()));
    let params = BuildParams::default();

    let first = service.clickable_elements(params).await.unwrap();
    tokio::time::advance(Duration::from_millis(200)).await;
    let second = service.clickable_elements(params).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(service.bridge().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_expiry_triggers_new_extraction() {
    let config = DomServiceConfig::new()
        .clickable_ttl(Duration::from_millis(300))
        .tree_ttl(Duration::from_millis(300));
    let service = DomService::with_config(CountingBridge::new(login_form()), config);
    let params = BuildParams::default();

    let first = service.clickable_elements(params).await.unwrap();
    tokio::time::advance(Duration::from_millis(301)).await;
    let second = service.clickable_elements(params).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(service.bridge().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_call_sites_have_independent_ttls() {
    let config = DomServiceConfig::new()
        .clickable_ttl(Duration::from_millis(100))
        .tree_ttl(Duration::from_millis(1000));
    let service = DomService::with_config(CountingBridge::new(login_form()), config);
    let params = BuildParams::default();

    let first = service.clickable_elements(params).await.unwrap();
    tokio::time::advance(Duration::from_millis(150)).await;

    // clickable slot expired, tree slot still fresh
    let second = service.clickable_elements(params).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(service.bridge().calls(), 1);

    tokio::time::advance(Duration::from_millis(1000)).await;
    service.build_dom_tree(params).await.unwrap();
    assert_eq!(service.bridge().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reused_tree_keeps_its_age() {
    let config = DomServiceConfig::new()
        .clickable_ttl(Duration::from_millis(1000))
        .tree_ttl(Duration::from_millis(500));
    let service = DomService::with_config(CountingBridge::new(login_form()), config);
    let params = BuildParams::default();

    service.build_dom_tree(params).await.unwrap();
    tokio::time::advance(Duration::from_millis(400)).await;

    // served from the tree slot, built 400ms ago
    service.clickable_elements(params).await.unwrap();
    assert_eq!(service.bridge().calls(), 1);

    // 1100ms after the build: too old for either slot
    tokio::time::advance(Duration::from_millis(700)).await;
    service.clickable_elements(params).await.unwrap();
    assert_eq!(service.bridge().calls(), 2);
}

#[tokio::test]
async fn test_different_params_miss() {
    let service = DomService::new(CountingBridge::new(login_form()));

    service.reconstruct(true, -1, 0).await.unwrap();
    service.reconstruct(true, 2, 0).await.unwrap();
    service.reconstruct(false, 2, 0).await.unwrap();

    assert_eq!(service.bridge().calls(), 3);
}

#[tokio::test]
async fn test_rebuild_and_invalidate_bypass_cache() {
    let service = DomService::new(CountingBridge::new(login_form()));
    let params = BuildParams::default();

    let first = service.clickable_elements(params).await.unwrap();
    let rebuilt = service.rebuild(params).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(service.bridge().calls(), 2);

    service.invalidate().await;
    service.clickable_elements(params).await.unwrap();
    assert_eq!(service.bridge().calls(), 3);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_extraction() {
    let service = Arc::new(DomService::new(CountingBridge::new(login_form())));
    let params = BuildParams::default();

    let (a, b) = tokio::join!(service.clickable_elements(params), service.clickable_elements(params));

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(service.bridge().calls(), 1);
}

#[tokio::test]
async fn test_instrumentation_does_not_change_results() {
    let timings = Arc::new(PhaseTimings::new());
    let plain = DomService::new(CountingBridge::new(login_form()));
    let instrumented =
        DomService::new(CountingBridge::new(login_form())).with_instrumentation(timings.clone());

    let a = plain.clickable_elements(BuildParams::default()).await.unwrap();
    let b = instrumented.clickable_elements(BuildParams::default()).await.unwrap();

    assert_eq!(*a, *b);
    for phase in Phase::ALL {
        assert_eq!(timings.get(phase).map(|stats| stats.calls), Some(1), "phase {}", phase);
    }
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_live_page_extraction() {
    let script = r#"(args) => {
        const map = {};
        let next = 0;
        let highlight = 0;
        const walk = (node, xpath) => {
            const id = String(next++);
            if (node.nodeType === Node.TEXT_NODE) {
                map[id] = { type: "TEXT_NODE", text: node.textContent, isVisible: true };
                return id;
            }
            const tag = node.tagName.toLowerCase();
            const interactive = ["a", "button", "input"].includes(tag);
            const attributes = {};
            for (const attr of node.attributes) attributes[attr.name] = attr.value;
            map[id] = {
                tagName: tag, xpath, attributes, isVisible: true, isInteractive: interactive,
                highlightIndex: interactive ? highlight++ : null, children: []
            };
            let i = 0;
            for (const child of node.childNodes) {
                if (child.nodeType === Node.ELEMENT_NODE || child.nodeType === Node.TEXT_NODE) {
                    map[id].children.push(walk(child, xpath + "/" + (i++)));
                }
            }
            return id;
        };
        const rootId = walk(document.body, "/html/body");
        return JSON.stringify({ rootId, map });
    }"#;

    let session = BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser");
    session
        .navigate("data:text/html,<html><body><button id='test-btn'>Click me</button><a href='#'>Link</a></body></html>")
        .expect("Failed to navigate");

    let service = session.dom_service(script).expect("Failed to create DOM service");
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let dom = runtime
        .block_on(service.clickable_elements(BuildParams::default()))
        .expect("Failed to extract DOM");

    assert_eq!(dom.root().tag_name, "body");
    assert_eq!(dom.count_interactive(), 2);
    assert!(dom.to_json().unwrap().contains("test-btn"));
}
