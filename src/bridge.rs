/// Browser bindings: chrome.* collaborators and the object the service worker drives
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::color::ColorExtractor;
use crate::config::EngineConfig;
use crate::dispatcher::{Command, CommandResponse, Dispatcher, HostEvent, TabChange};
use crate::error::{HostError, HostResult, StorageError};
use crate::host::TabStore;
use crate::scheduler::Millis;
use crate::storage::KeyValueStore;
use crate::tab_data::{GroupId, GroupUpdate, Rgb, Tab, TabGroup, TabId, WindowId};

// Import JS bridge functions
#[wasm_bindgen(module = "/background.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn listWindows() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryWindowTabs(window_id: WindowId) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryGroupTabs(group_id: GroupId) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getTab(tab_id: TabId) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryGroups(window_id: Option<WindowId>) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getGroup(group_id: GroupId) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn groupTabs(tab_ids: JsValue, group_id: Option<GroupId>) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn ungroupTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateGroup(group_id: GroupId, update: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageGet(keys: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(items: JsValue) -> Result<(), JsValue>;

    /// Resolves to `{r, g, b}` or `null`, never later than `timeout_ms`
    #[wasm_bindgen(catch)]
    async fn extractFaviconColor(tab_id: TabId, favicon_url: &str, timeout_ms: f64) -> Result<JsValue, JsValue>;

    async fn sleep(ms: f64);
}

fn now() -> Millis {
    js_sys::Date::now() as Millis
}

/// Plain JS objects rather than `Map`s, so the values survive `sendResponse` and storage
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn js_message(error: &JsValue) -> String {
    error
        .as_string()
        .or_else(|| error.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{:?}", error))
}

fn host_error(error: JsValue) -> HostError {
    HostError::from_message(&js_message(&error))
}

fn decode<T: DeserializeOwned>(value: JsValue) -> HostResult<T> {
    serde_wasm_bindgen::from_value(value).map_err(|e| HostError::Other(format!("Failed to parse host reply: {}", e)))
}

fn encode<T: Serialize + ?Sized>(value: &T) -> HostResult<JsValue> {
    to_js(value).map_err(|e| HostError::Other(format!("Failed to serialize: {}", e)))
}

/// `chrome.tabs`, `chrome.tabGroups` and `chrome.windows`
pub struct ChromeHost;

#[async_trait(?Send)]
impl TabStore for ChromeHost {
    async fn windows(&self) -> HostResult<Vec<WindowId>> {
        decode(listWindows().await.map_err(host_error)?)
    }

    async fn tabs_in_window(&self, window_id: WindowId) -> HostResult<Vec<Tab>> {
        decode(queryWindowTabs(window_id).await.map_err(host_error)?)
    }

    async fn tabs_in_group(&self, group_id: GroupId) -> HostResult<Vec<Tab>> {
        decode(queryGroupTabs(group_id).await.map_err(host_error)?)
    }

    async fn tab(&self, tab_id: TabId) -> HostResult<Tab> {
        decode(getTab(tab_id).await.map_err(host_error)?)
    }

    async fn groups(&self, window_id: Option<WindowId>) -> HostResult<Vec<TabGroup>> {
        decode(queryGroups(window_id).await.map_err(host_error)?)
    }

    async fn group(&self, group_id: GroupId) -> HostResult<TabGroup> {
        decode(getGroup(group_id).await.map_err(host_error)?)
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> HostResult<GroupId> {
        let tab_ids = encode(tab_ids)?;
        decode(groupTabs(tab_ids, group_id).await.map_err(host_error)?)
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> HostResult<()> {
        ungroupTabs(encode(tab_ids)?).await.map_err(host_error)
    }

    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> HostResult<()> {
        updateGroup(group_id, encode(&update)?).await.map_err(host_error)
    }
}

/// `chrome.storage.local`
pub struct ChromeStorage;

#[async_trait(?Send)]
impl KeyValueStore for ChromeStorage {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let keys = to_js(keys).map_err(|e| StorageError(e.to_string()))?;
        let items = storageGet(keys).await.map_err(|e| StorageError(js_message(&e)))?;
        if items.is_null() || items.is_undefined() {
            return Ok(Map::new());
        }
        serde_wasm_bindgen::from_value(items).map_err(|e| StorageError(e.to_string()))
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError> {
        let items = to_js(&items).map_err(|e| StorageError(e.to_string()))?;
        storageSet(items).await.map_err(|e| StorageError(js_message(&e)))
    }
}

/// Favicon sampling delegated to the content script of the tab showing it
pub struct ContentScriptColors {
    timeout_ms: Millis,
}

impl ContentScriptColors {
    pub fn new(timeout_ms: Millis) -> ContentScriptColors {
        ContentScriptColors { timeout_ms }
    }
}

#[async_trait(?Send)]
impl ColorExtractor for ContentScriptColors {
    async fn dominant_color(&self, favicon_url: &str, tab_id: Option<TabId>) -> Option<Rgb> {
        let tab_id = tab_id?;
        match extractFaviconColor(tab_id, favicon_url, self.timeout_ms as f64).await {
            Ok(color) if color.is_null() || color.is_undefined() => None,
            Ok(color) => serde_wasm_bindgen::from_value(color).ok(),
            Err(e) => {
                log::debug!("Content script not available for tab {}: {}", tab_id, js_message(&e));
                None
            }
        }
    }
}

/// Engine instance owned by the service worker
#[wasm_bindgen]
pub struct Background {
    dispatcher: Rc<Dispatcher>,
    /// Deadline the pending wake-up was armed for
    armed: Rc<Cell<Option<Millis>>>,
}

#[wasm_bindgen]
impl Background {
    /// Load settings and wire the engine; `config` is optional JSON
    pub async fn create(config: Option<String>) -> Background {
        let config = EngineConfig::from_json(config.as_deref().unwrap_or_default());
        log::set_max_level(config.level().to_level_filter());

        let extractor = Rc::new(ContentScriptColors::new(config.color_extraction_timeout_ms));
        let dispatcher = Dispatcher::start(config, Rc::new(ChromeHost), extractor, Rc::new(ChromeStorage)).await;
        log::info!("Tab grouper started");

        Background {
            dispatcher: Rc::new(dispatcher),
            armed: Rc::new(Cell::new(None)),
        }
    }

    #[wasm_bindgen(js_name = onTabCreated)]
    pub fn on_tab_created(&self, tab: JsValue) {
        match serde_wasm_bindgen::from_value::<Tab>(tab) {
            Ok(tab) => self.dispatch(HostEvent::TabCreated(tab)),
            Err(e) => log::warn!("Ignoring created tab: {}", e),
        }
    }

    #[wasm_bindgen(js_name = onTabUpdated)]
    pub fn on_tab_updated(&self, change: JsValue, tab: JsValue) {
        let change = serde_wasm_bindgen::from_value::<TabChange>(change);
        let tab = serde_wasm_bindgen::from_value::<Tab>(tab);
        match (change, tab) {
            (Ok(change), Ok(tab)) => self.dispatch(HostEvent::TabUpdated { tab, change }),
            (Err(e), _) | (_, Err(e)) => log::warn!("Ignoring tab update: {}", e),
        }
    }

    #[wasm_bindgen(js_name = onTabRemoved)]
    pub fn on_tab_removed(&self, tab_id: TabId, window_id: WindowId) {
        self.dispatch(HostEvent::TabRemoved { tab_id, window_id });
    }

    #[wasm_bindgen(js_name = onStartup)]
    pub fn on_startup(&self) {
        self.dispatch(HostEvent::Startup);
    }

    /// Answer a popup message; resolves to the reply object
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> js_sys::Promise {
        let dispatcher = self.dispatcher.clone();
        let armed = self.armed.clone();

        future_to_promise(async move {
            let response = match serde_wasm_bindgen::from_value::<Command>(message) {
                Ok(command) => dispatcher.handle_command(command).await,
                Err(e) => {
                    log::warn!("Unknown message: {}", e);
                    CommandResponse::failure("unknown_action".to_string())
                }
            };
            arm(dispatcher, armed);
            to_js(&response).map_err(JsValue::from)
        })
    }
}

impl Background {
    fn dispatch(&self, event: HostEvent) {
        let dispatcher = self.dispatcher.clone();
        let armed = self.armed.clone();

        spawn_local(async move {
            dispatcher.handle_event(event, now()).await;
            arm(dispatcher, armed);
        });
    }
}

/// Make sure a wake-up is pending for the scheduler's next deadline
///
/// Called again after every run, so a task held back by a running twin is
/// armed once that twin finishes.
fn arm(dispatcher: Rc<Dispatcher>, armed: Rc<Cell<Option<Millis>>>) {
    let Some(deadline) = dispatcher.next_deadline() else {
        return;
    };
    if armed.get().is_some_and(|at| at <= deadline) {
        return;
    }
    armed.set(Some(deadline));

    spawn_local(async move {
        // Even a zero delay goes through the host timer so pending JS work can run
        let delay = deadline.saturating_sub(now());
        sleep(delay as f64).await;
        if armed.get() == Some(deadline) {
            armed.set(None);
        }
        dispatcher.run_due(now()).await;
        arm(dispatcher, armed);
    });
}
