/// Per-pass tab inventory: grouping keys, buckets, and group membership
use std::collections::{BTreeMap, HashMap};

use crate::domain::grouping_key;
use crate::storage::Settings;
use crate::tab_data::{GroupId, Tab, TabGroup, TabId};

/// One window's tabs and groups, read once at the start of a pass
///
/// Membership is tracked locally as the pass mutates the host so later
/// steps do not need to query the host again.
pub struct WindowInventory {
    tabs: Vec<Tab>,
    groups: Vec<TabGroup>,
    keys: HashMap<TabId, String>,
    membership: HashMap<TabId, Option<GroupId>>,
}

impl WindowInventory {
    pub fn new(tabs: Vec<Tab>, groups: Vec<TabGroup>, settings: &Settings) -> WindowInventory {
        let keys = tabs
            .iter()
            .filter_map(|tab| grouping_key(&tab.url, settings).map(|key| (tab.id, key)))
            .collect();
        let membership = tabs.iter().map(|tab| (tab.id, tab.group_id)).collect();

        WindowInventory {
            tabs,
            groups,
            keys,
            membership,
        }
    }

    pub fn groups(&self) -> &[TabGroup] {
        &self.groups
    }

    pub fn key_of(&self, tab_id: TabId) -> Option<&str> {
        self.keys.get(&tab_id).map(String::as_str)
    }

    /// Every keyed tab with its key, in tab order
    pub fn observed_keys(&self) -> Vec<(TabId, String)> {
        self.tabs
            .iter()
            .filter_map(|tab| self.keys.get(&tab.id).map(|key| (tab.id, key.clone())))
            .collect()
    }

    /// Tabs bucketed by grouping key, keys sorted, tabs in window order
    pub fn buckets(&self) -> BTreeMap<String, Vec<TabId>> {
        self.tabs.iter().fold(BTreeMap::new(), |mut buckets, tab| {
            if let Some(key) = self.keys.get(&tab.id) {
                buckets.entry(key.clone()).or_insert_with(Vec::new).push(tab.id);
            }
            buckets
        })
    }

    pub fn group_of(&self, tab_id: TabId) -> Option<GroupId> {
        self.membership.get(&tab_id).copied().flatten()
    }

    pub fn members_of(&self, group_id: GroupId) -> Vec<TabId> {
        self.tabs
            .iter()
            .filter(|tab| self.group_of(tab.id) == Some(group_id))
            .map(|tab| tab.id)
            .collect()
    }

    /// Members of `group` whose key no longer maps to the group's title
    ///
    /// Members without a key are stray as well.
    pub fn stray_members(&self, group: &TabGroup, title_for: impl Fn(&str) -> String) -> Vec<TabId> {
        self.members_of(group.id)
            .into_iter()
            .filter(|tab_id| match self.key_of(*tab_id) {
                Some(key) => title_for(key) != group.title,
                None => true,
            })
            .collect()
    }

    /// Titled groups by title; the first group wins when titles collide
    pub fn groups_by_title(&self) -> HashMap<String, TabGroup> {
        self.groups
            .iter()
            .filter(|group| group.has_title())
            .fold(HashMap::new(), |mut by_title, group| {
                by_title.entry(group.title.clone()).or_insert_with(|| group.clone());
                by_title
            })
    }

    /// First tab of `tab_ids` that carries a favicon
    pub fn favicon_source(&self, tab_ids: &[TabId]) -> Option<(String, TabId)> {
        tab_ids.iter().find_map(|id| {
            self.tabs
                .iter()
                .find(|tab| tab.id == *id)
                .and_then(|tab| tab.favicon_url.clone().map(|url| (url, tab.id)))
        })
    }

    pub fn mark_ungrouped(&mut self, tab_ids: &[TabId]) {
        for tab_id in tab_ids {
            self.membership.insert(*tab_id, None);
        }
    }

    pub fn mark_grouped(&mut self, tab_ids: &[TabId], group_id: GroupId) {
        for tab_id in tab_ids {
            self.membership.insert(*tab_id, Some(group_id));
        }
    }
}

/// Groups holding exactly one tab, with that tab
pub fn singleton_groups(tabs: &[Tab]) -> Vec<(GroupId, TabId)> {
    let mut members: BTreeMap<GroupId, Vec<TabId>> = BTreeMap::new();
    for tab in tabs {
        if let Some(group_id) = tab.group_id {
            members.entry(group_id).or_default().push(tab.id);
        }
    }

    members
        .into_iter()
        .filter_map(|(group_id, ids)| match ids.as_slice() {
            [only] => Some((group_id, *only)),
            _ => None,
        })
        .collect()
}

/// Tabs other than `tab_id` whose key is `key`
pub fn siblings(tabs: &[Tab], tab_id: TabId, key: &str, settings: &Settings) -> Vec<Tab> {
    tabs.iter()
        .filter(|tab| tab.id != tab_id && grouping_key(&tab.url, settings).as_deref() == Some(key))
        .cloned()
        .collect()
}
