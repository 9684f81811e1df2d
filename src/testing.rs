/// In-memory collaborators for tests
use async_trait::async_trait;
use futures::executor::block_on;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::color::ColorExtractor;
use crate::error::{HostError, HostResult, StorageError};
use crate::host::TabStore;
use crate::storage::{KeyValueStore, SettingsStore};
use crate::tab_data::{GroupColor, GroupId, GroupUpdate, Rgb, Tab, TabGroup, TabId, WindowId};

/// A mutating call received by [`FakeHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Group { tab_ids: Vec<TabId>, group_id: Option<GroupId> },
    Ungroup(Vec<TabId>),
    Update(GroupId, GroupUpdate),
}

#[derive(Default)]
struct HostState {
    tabs: BTreeMap<TabId, Tab>,
    groups: BTreeMap<GroupId, TabGroup>,
    next_group_id: GroupId,
    mutations: Vec<Mutation>,
    vanish_on_add: HashSet<GroupId>,
    fail_next: Option<HostError>,
}

impl HostState {
    /// The host drops groups that lost their last tab
    fn prune_empty_groups(&mut self) {
        let used: HashSet<GroupId> = self.tabs.values().filter_map(|t| t.group_id).collect();
        self.groups.retain(|id, _| used.contains(id));
    }

    fn take_failure(&mut self) -> HostResult<()> {
        match self.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Tab/group store that behaves like the browser and records every mutation
pub struct FakeHost {
    state: RefCell<HostState>,
}

impl FakeHost {
    pub fn new() -> FakeHost {
        FakeHost {
            state: RefCell::new(HostState {
                next_group_id: 100,
                ..HostState::default()
            }),
        }
    }

    pub fn add_tab(&self, tab: Tab) {
        self.state.borrow_mut().tabs.insert(tab.id, tab);
    }

    /// Create a group holding existing tabs
    pub fn add_group(&self, window_id: WindowId, title: &str, color: GroupColor, tab_ids: &[TabId]) -> GroupId {
        let mut state = self.state.borrow_mut();
        let id = state.next_group_id;
        state.next_group_id += 1;
        state.groups.insert(
            id,
            TabGroup {
                id,
                window_id,
                title: title.to_string(),
                color,
            },
        );
        for tab_id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(tab_id) {
                tab.group_id = Some(id);
            }
        }
        id
    }

    pub fn navigate(&self, tab_id: TabId, url: &str) {
        if let Some(tab) = self.state.borrow_mut().tabs.get_mut(&tab_id) {
            tab.url = url.to_string();
        }
    }

    pub fn remove_tab(&self, tab_id: TabId) {
        let mut state = self.state.borrow_mut();
        state.tabs.remove(&tab_id);
        state.prune_empty_groups();
    }

    /// Make the group disappear right before the next attempt to add tabs to it
    pub fn delete_group_before_next_add(&self, group_id: GroupId) {
        self.state.borrow_mut().vanish_on_add.insert(group_id);
    }

    /// Fail the next mutating call with `error`
    pub fn fail_next_mutation(&self, error: HostError) {
        self.state.borrow_mut().fail_next = Some(error);
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.borrow().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.borrow_mut().mutations.clear();
    }

    pub fn tab_state(&self, tab_id: TabId) -> Option<Tab> {
        self.state.borrow().tabs.get(&tab_id).cloned()
    }

    pub fn all_groups(&self) -> Vec<TabGroup> {
        self.state.borrow().groups.values().cloned().collect()
    }

    pub fn group_titled(&self, window_id: WindowId, title: &str) -> Option<TabGroup> {
        self.state
            .borrow()
            .groups
            .values()
            .find(|g| g.window_id == window_id && g.title == title)
            .cloned()
    }

    pub fn members(&self, group_id: GroupId) -> Vec<TabId> {
        self.state
            .borrow()
            .tabs
            .values()
            .filter(|t| t.group_id == Some(group_id))
            .map(|t| t.id)
            .collect()
    }
}

#[async_trait(?Send)]
impl TabStore for FakeHost {
    async fn windows(&self) -> HostResult<Vec<WindowId>> {
        let state = self.state.borrow();
        let mut windows: Vec<WindowId> = state.tabs.values().map(|t| t.window_id).collect();
        windows.sort_unstable();
        windows.dedup();
        Ok(windows)
    }

    async fn tabs_in_window(&self, window_id: WindowId) -> HostResult<Vec<Tab>> {
        Ok(self
            .state
            .borrow()
            .tabs
            .values()
            .filter(|t| t.window_id == window_id)
            .cloned()
            .collect())
    }

    async fn tabs_in_group(&self, group_id: GroupId) -> HostResult<Vec<Tab>> {
        Ok(self
            .state
            .borrow()
            .tabs
            .values()
            .filter(|t| t.group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn tab(&self, tab_id: TabId) -> HostResult<Tab> {
        self.state
            .borrow()
            .tabs
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("No tab with id: {}.", tab_id)))
    }

    async fn groups(&self, window_id: Option<WindowId>) -> HostResult<Vec<TabGroup>> {
        Ok(self
            .state
            .borrow()
            .groups
            .values()
            .filter(|g| window_id.is_none_or(|w| g.window_id == w))
            .cloned()
            .collect())
    }

    async fn group(&self, group_id: GroupId) -> HostResult<TabGroup> {
        self.state
            .borrow()
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("No group with id: {}.", group_id)))
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> HostResult<GroupId> {
        let mut state = self.state.borrow_mut();
        state.mutations.push(Mutation::Group {
            tab_ids: tab_ids.to_vec(),
            group_id,
        });
        state.take_failure()?;

        if let Some(id) = group_id {
            if state.vanish_on_add.remove(&id) {
                state.groups.remove(&id);
                for tab in state.tabs.values_mut().filter(|t| t.group_id == Some(id)) {
                    tab.group_id = None;
                }
            }
        }

        let first = tab_ids
            .first()
            .and_then(|id| state.tabs.get(id))
            .cloned()
            .ok_or_else(|| HostError::NotFound("No tab with id.".to_string()))?;

        let target = match group_id {
            Some(id) => {
                if !state.groups.contains_key(&id) {
                    return Err(HostError::NotFound(format!("No group with id: {}.", id)));
                }
                id
            }
            None => {
                let id = state.next_group_id;
                state.next_group_id += 1;
                state.groups.insert(
                    id,
                    TabGroup {
                        id,
                        window_id: first.window_id,
                        title: String::new(),
                        color: GroupColor::Grey,
                    },
                );
                id
            }
        };

        for tab_id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(tab_id) {
                tab.group_id = Some(target);
            }
        }
        state.prune_empty_groups();
        Ok(target)
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.mutations.push(Mutation::Ungroup(tab_ids.to_vec()));
        state.take_failure()?;

        for tab_id in tab_ids {
            match state.tabs.get_mut(tab_id) {
                Some(tab) => tab.group_id = None,
                None => return Err(HostError::NotFound(format!("No tab with id: {}.", tab_id))),
            }
        }
        state.prune_empty_groups();
        Ok(())
    }

    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.mutations.push(Mutation::Update(group_id, update.clone()));
        state.take_failure()?;

        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| HostError::NotFound(format!("No group with id: {}.", group_id)))?;
        if let Some(title) = update.title {
            group.title = title;
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        Ok(())
    }
}

/// Key-value store backed by a JSON map
#[derive(Default)]
pub struct MemoryStore {
    values: RefCell<Map<String, Value>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn with_values(values: Value) -> MemoryStore {
        MemoryStore {
            values: RefCell::new(values.as_object().cloned().unwrap_or_default()),
            ..MemoryStore::default()
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        if self.fail_reads.get() {
            return Err(StorageError("read failed".to_string()));
        }
        let values = self.values.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError("write failed".to_string()));
        }
        self.values.borrow_mut().extend(items);
        Ok(())
    }
}

/// Color extractor with a canned answer that counts its calls
pub struct StubExtractor {
    sample: Option<Rgb>,
    calls: Cell<usize>,
}

impl StubExtractor {
    pub fn returning(sample: Rgb) -> StubExtractor {
        StubExtractor {
            sample: Some(sample),
            calls: Cell::new(0),
        }
    }

    pub fn failing() -> StubExtractor {
        StubExtractor {
            sample: None,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait(?Send)]
impl ColorExtractor for StubExtractor {
    async fn dominant_color(&self, _favicon_url: &str, _tab_id: Option<TabId>) -> Option<Rgb> {
        self.calls.set(self.calls.get() + 1);
        self.sample
    }
}

/// Settings store over an empty in-memory backend
pub fn settings_store() -> Rc<SettingsStore> {
    Rc::new(block_on(SettingsStore::load(Rc::new(MemoryStore::default()))))
}
