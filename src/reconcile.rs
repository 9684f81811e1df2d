/// Reconciliation of host tab groups against domain grouping keys
use std::rc::Rc;
use uuid::Uuid;

use crate::color::ColorResolver;
use crate::domain::{extract_hostname, matches_pattern};
use crate::error::HostResult;
use crate::host::TabStore;
use crate::operations::{WindowInventory, siblings, singleton_groups};
use crate::storage::SettingsStore;
use crate::tab_data::{GroupColor, GroupId, GroupUpdate, TabId, WindowId};
use crate::title::GroupTitleResolver;

/// Which windows a pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Window(WindowId),
    AllWindows,
}

/// Summary of one window pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub id: Uuid,
    pub window_id: WindowId,
    /// Grouping key of every keyed tab seen at the start of the pass
    pub observed_keys: Vec<(TabId, String)>,
    pub ungrouped: usize,
    pub added: usize,
    pub created: usize,
    pub dissolved: usize,
    /// Mutations that hit a vanished tab or group
    pub races: usize,
}

impl PassReport {
    fn new(window_id: WindowId) -> PassReport {
        PassReport {
            id: Uuid::new_v4(),
            window_id,
            observed_keys: Vec::new(),
            ungrouped: 0,
            added: 0,
            created: 0,
            dissolved: 0,
            races: 0,
        }
    }

    /// Whether the pass changed anything on the host
    pub fn changed(&self) -> bool {
        self.ungrouped + self.added + self.created + self.dissolved > 0
    }
}

/// Result of the single-tab fast path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPath {
    AddedTo(GroupId),
    Created(GroupId),
    AlreadyGrouped(GroupId),
    LeftUngrouped,
    TabGone,
}

/// Treat a "not found" answer as an absent target
fn tolerate<T>(result: HostResult<T>, context: &str) -> HostResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            log::warn!("{}: {}", context, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub struct ReconcileEngine {
    host: Rc<dyn TabStore>,
    settings: Rc<SettingsStore>,
    colors: Rc<ColorResolver>,
    titles: GroupTitleResolver,
}

impl ReconcileEngine {
    pub fn new(host: Rc<dyn TabStore>, settings: Rc<SettingsStore>, colors: Rc<ColorResolver>) -> ReconcileEngine {
        let titles = GroupTitleResolver::new(settings.clone());
        ReconcileEngine {
            host,
            settings,
            colors,
            titles,
        }
    }

    pub fn colors(&self) -> &ColorResolver {
        &self.colors
    }

    /// Run one pass per window in scope
    ///
    /// The first unexpected host error abandons the remaining windows.
    pub async fn reconcile(&self, scope: Scope) -> HostResult<Vec<PassReport>> {
        let windows = match scope {
            Scope::Window(window_id) => vec![window_id],
            Scope::AllWindows => self.host.windows().await?,
        };

        let mut reports = Vec::with_capacity(windows.len());
        for window_id in windows {
            reports.push(self.reconcile_window(window_id).await?);
        }
        Ok(reports)
    }

    /// Converge one window's groups toward one group per key with two or more tabs
    pub async fn reconcile_window(&self, window_id: WindowId) -> HostResult<PassReport> {
        let settings = self.settings.snapshot();
        let tabs = self.host.tabs_in_window(window_id).await?;
        let groups = self.host.groups(Some(window_id)).await?;
        let mut inventory = WindowInventory::new(tabs, groups, &settings);

        let mut report = PassReport::new(window_id);
        report.observed_keys = inventory.observed_keys();
        log::debug!("Pass {} over window {}", report.id, window_id);

        // Tabs that no longer belong to their titled group
        let titled: Vec<_> = inventory.groups().iter().filter(|g| g.has_title()).cloned().collect();
        for group in &titled {
            let strays = inventory.stray_members(group, |key| self.titles.resolve(key));
            if strays.is_empty() {
                continue;
            }
            match tolerate(self.host.ungroup_tabs(&strays).await, "Ungrouping stray tabs")? {
                Some(()) => {
                    inventory.mark_ungrouped(&strays);
                    report.ungrouped += strays.len();
                    log::info!("Ungrouped {} tabs from {} group", strays.len(), group.title);
                }
                None => report.races += 1,
            }
        }

        let by_title = inventory.groups_by_title();

        for (key, members) in inventory.buckets() {
            if members.len() < 2 {
                continue;
            }
            let title = self.titles.resolve(&key);
            let existing = by_title
                .get(&title)
                .map(|group| group.id)
                .filter(|id| !inventory.members_of(*id).is_empty());

            let Some(group_id) = existing else {
                self.create_group(&mut inventory, &key, &title, &members, &mut report).await?;
                continue;
            };

            let missing: Vec<TabId> = members
                .iter()
                .copied()
                .filter(|id| inventory.group_of(*id) != Some(group_id))
                .collect();
            if missing.is_empty() {
                continue;
            }

            match self.host.group_tabs(&missing, Some(group_id)).await {
                Ok(_) => {
                    inventory.mark_grouped(&missing, group_id);
                    report.added += missing.len();
                    log::info!("Added {} tabs to existing {} group", missing.len(), title);
                }
                Err(e) if e.is_not_found() => {
                    log::warn!("Group {} for {} vanished, creating a new one: {}", group_id, key, e);
                    report.races += 1;
                    self.create_group(&mut inventory, &key, &title, &members, &mut report).await?;
                }
                Err(e) => return Err(e),
            }
        }

        report.dissolved = self.dissolve_window_singletons(window_id).await?;
        Ok(report)
    }

    async fn create_group(
        &self,
        inventory: &mut WindowInventory,
        key: &str,
        title: &str,
        members: &[TabId],
        report: &mut PassReport,
    ) -> HostResult<()> {
        let Some(group_id) = tolerate(self.host.group_tabs(members, None).await, "Creating group")? else {
            report.races += 1;
            return Ok(());
        };
        inventory.mark_grouped(members, group_id);
        report.created += 1;

        let favicon = inventory.favicon_source(members);
        let color = self
            .colors
            .resolve(
                key,
                favicon.as_ref().map(|(url, _)| url.as_str()),
                favicon.as_ref().map(|(_, tab_id)| *tab_id),
            )
            .await;
        self.label_group(group_id, title, color).await?;

        log::info!("Created group {} for {} with {} tabs, color {}", group_id, key, members.len(), color);
        Ok(())
    }

    async fn label_group(&self, group_id: GroupId, title: &str, color: GroupColor) -> HostResult<()> {
        let update = GroupUpdate {
            title: Some(title.to_string()),
            color: Some(color),
        };
        tolerate(self.host.update_group(group_id, update).await, "Labeling new group")?;
        Ok(())
    }

    /// Ungroup the only tab of every one-tab group in scope
    ///
    /// Empty groups need no work: the host removes them itself.
    pub async fn dissolve_singletons(&self, scope: Scope) -> HostResult<usize> {
        let windows = match scope {
            Scope::Window(window_id) => vec![window_id],
            Scope::AllWindows => self.host.windows().await?,
        };

        let mut dissolved = 0;
        for window_id in windows {
            dissolved += self.dissolve_window_singletons(window_id).await?;
        }
        Ok(dissolved)
    }

    async fn dissolve_window_singletons(&self, window_id: WindowId) -> HostResult<usize> {
        let tabs = self.host.tabs_in_window(window_id).await?;

        let mut dissolved = 0;
        for (group_id, tab_id) in singleton_groups(&tabs) {
            if tolerate(self.host.ungroup_tabs(&[tab_id]).await, "Dissolving single-tab group")?.is_some() {
                log::info!("Single tab group {} ungrouped", group_id);
                dissolved += 1;
            }
        }
        Ok(dissolved)
    }

    /// React to one tab changing its grouping key
    ///
    /// The tab leaves a group that no longer matches it, then takes the
    /// fast path when it has a new key.
    pub async fn handle_domain_change(&self, tab_id: TabId, new_key: Option<&str>) -> HostResult<FastPath> {
        let Some(tab) = tolerate(self.host.tab(tab_id).await, "Looking up navigated tab")? else {
            return Ok(FastPath::TabGone);
        };

        if let Some(group_id) = tab.group_id {
            let group = tolerate(self.host.group(group_id).await, "Looking up group of navigated tab")?;
            let belongs = match (&group, new_key) {
                (Some(group), Some(key)) => group.title == self.titles.resolve(key),
                _ => false,
            };
            if group.is_some() && !belongs {
                if tolerate(self.host.ungroup_tabs(&[tab_id]).await, "Ungrouping navigated tab")?.is_none() {
                    return Ok(FastPath::TabGone);
                }
                log::info!("Tab {} ungrouped from group {}", tab_id, group_id);
            }
        }

        match new_key {
            Some(key) => self.regroup_single_tab(tab_id, key).await,
            None => Ok(FastPath::LeftUngrouped),
        }
    }

    /// Place one tab with the other tabs of its key, without a window pass
    pub async fn regroup_single_tab(&self, tab_id: TabId, key: &str) -> HostResult<FastPath> {
        let Some(tab) = tolerate(self.host.tab(tab_id).await, "Looking up tab to regroup")? else {
            return Ok(FastPath::TabGone);
        };
        let settings = self.settings.snapshot();
        let window_tabs = self.host.tabs_in_window(tab.window_id).await?;
        let same_key = siblings(&window_tabs, tab_id, key, &settings);
        let title = self.titles.resolve(key);

        let groups = self.host.groups(Some(tab.window_id)).await?;
        if let Some(target) = groups.iter().find(|group| group.title == title) {
            if tab.group_id == Some(target.id) {
                return Ok(FastPath::AlreadyGrouped(target.id));
            }
            match self.host.group_tabs(&[tab_id], Some(target.id)).await {
                Ok(_) => {
                    log::info!("Tab {} added to existing {} group", tab_id, title);
                    return Ok(FastPath::AddedTo(target.id));
                }
                Err(e) if e.is_not_found() => {
                    log::warn!("Group {} for {} vanished, creating a new one: {}", target.id, key, e);
                }
                Err(e) => return Err(e),
            }
        }

        if same_key.is_empty() {
            log::debug!("Single tab for {}, not creating group", key);
            return Ok(FastPath::LeftUngrouped);
        }

        let tab_ids: Vec<TabId> = std::iter::once(tab_id).chain(same_key.iter().map(|t| t.id)).collect();
        let Some(group_id) = tolerate(self.host.group_tabs(&tab_ids, None).await, "Creating group")? else {
            return Ok(FastPath::TabGone);
        };

        let favicon_tab = std::iter::once(&tab)
            .chain(same_key.iter())
            .find(|t| t.favicon_url.is_some());
        let color = self
            .colors
            .resolve(
                key,
                favicon_tab.and_then(|t| t.favicon_url.as_deref()),
                favicon_tab.map(|t| t.id),
            )
            .await;
        self.label_group(group_id, &title, color).await?;

        log::info!("New group created for {} with {} tabs", key, tab_ids.len());
        Ok(FastPath::Created(group_id))
    }

    /// Recolor every group titled for `key`, with `color` or a freshly resolved one
    pub async fn recolor_groups(&self, key: &str, color: Option<GroupColor>) -> HostResult<usize> {
        let title = self.titles.resolve(key);
        let groups = self.host.groups(None).await?;

        let mut updated = 0;
        for group in groups.into_iter().filter(|g| g.title == title) {
            let color = match color {
                Some(color) => color,
                None => {
                    let members = tolerate(self.host.tabs_in_group(group.id).await, "Listing group members")?
                        .unwrap_or_default();
                    let source = members.iter().find(|t| t.favicon_url.is_some());
                    self.colors
                        .resolve(key, source.and_then(|t| t.favicon_url.as_deref()), source.map(|t| t.id))
                        .await
                }
            };
            if tolerate(self.host.update_group(group.id, GroupUpdate::color(color)).await, "Recoloring group")?
                .is_some()
            {
                log::info!("Updated group {} color for {}: {}", group.id, key, color);
                updated += 1;
            }
        }

        if updated == 0 {
            log::debug!("No groups found for domain: {}", key);
        }
        Ok(updated)
    }

    /// Rename every group titled `from`
    pub async fn retitle_groups(&self, from: &str, to: &str) -> HostResult<usize> {
        if from == to {
            return Ok(0);
        }
        let groups = self.host.groups(None).await?;

        let mut updated = 0;
        for group in groups.into_iter().filter(|g| g.title == from) {
            if tolerate(self.host.update_group(group.id, GroupUpdate::title(to)).await, "Retitling group")?
                .is_some()
            {
                log::info!("Renamed group {} from {} to {}", group.id, from, to);
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Ungroup every grouped tab whose hostname matches an exclusion pattern
    pub async fn ungroup_matching(&self, pattern: &str) -> HostResult<usize> {
        let groups = self.host.groups(None).await?;

        let mut ungrouped = 0;
        for group in groups {
            let Some(members) = tolerate(self.host.tabs_in_group(group.id).await, "Listing group members")? else {
                continue;
            };
            let matching: Vec<TabId> = members
                .iter()
                .filter(|tab| extract_hostname(&tab.url).is_some_and(|host| matches_pattern(&host, pattern)))
                .map(|tab| tab.id)
                .collect();
            if matching.is_empty() {
                continue;
            }
            if tolerate(self.host.ungroup_tabs(&matching).await, "Ungrouping excluded tabs")?.is_some() {
                log::info!("Ungrouped {} tabs from {} group", matching.len(), group.title);
                ungrouped += matching.len();
            }
        }
        Ok(ungrouped)
    }
}
