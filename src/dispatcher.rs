/// Host events and popup commands turned into reconciliation work
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::color::{ColorExtractor, ColorResolver};
use crate::config::EngineConfig;
use crate::domain::grouping_key;
use crate::error::{CommandError, HostResult};
use crate::host::TabStore;
use crate::reconcile::{ReconcileEngine, Scope};
use crate::scheduler::{Millis, Scheduler, Task};
use crate::storage::{KeyValueStore, Settings, SettingsChange, SettingsMutation, SettingsStore};
use crate::tab_data::{GroupColor, Tab, TabId, WindowId};

/// What changed on an updated tab
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TabChange {
    fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }
}

/// A lifecycle event from the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    TabCreated(Tab),
    TabUpdated { tab: Tab, change: TabChange },
    TabRemoved { tab_id: TabId, window_id: WindowId },
    /// Browser startup or extension install
    Startup,
}

/// A request from the popup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    GroupTabs,
    GroupTabsInWindow {
        #[serde(rename = "windowId")]
        window_id: WindowId,
    },
    ToggleAutoGroup {
        enabled: bool,
    },
    ToggleSubdomainGrouping {
        enabled: bool,
    },
    AddExcludedDomain {
        domain: String,
    },
    RemoveExcludedDomain {
        domain: String,
    },
    SetDomainColor {
        domain: String,
        #[serde(default)]
        color: String,
    },
    RemoveDomainColor {
        domain: String,
    },
    SetDomainName {
        domain: String,
        #[serde(default)]
        name: String,
    },
    RemoveDomainName {
        domain: String,
    },
    GetSettings,
    GetExcludedDomains,
    GetDomainColors,
}

/// Reply to a popup command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_colors: Option<BTreeMap<String, GroupColor>>,
}

impl CommandResponse {
    pub fn ok() -> CommandResponse {
        CommandResponse {
            success: true,
            ..CommandResponse::default()
        }
    }

    pub fn failure(reason: String) -> CommandResponse {
        CommandResponse {
            success: false,
            error: Some(reason),
            ..CommandResponse::default()
        }
    }
}

pub struct Dispatcher {
    config: EngineConfig,
    settings: Rc<SettingsStore>,
    engine: ReconcileEngine,
    /// Last grouping key seen per tab
    history: RefCell<HashMap<TabId, String>>,
    scheduler: RefCell<Scheduler>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig, settings: Rc<SettingsStore>, engine: ReconcileEngine) -> Dispatcher {
        Dispatcher {
            config,
            settings,
            engine,
            history: RefCell::new(HashMap::new()),
            scheduler: RefCell::new(Scheduler::new()),
        }
    }

    /// Load settings and wire the engine over the given collaborators
    pub async fn start(
        config: EngineConfig,
        host: Rc<dyn TabStore>,
        extractor: Rc<dyn ColorExtractor>,
        backend: Rc<dyn KeyValueStore>,
    ) -> Dispatcher {
        let settings = Rc::new(SettingsStore::load(backend).await);
        let colors = Rc::new(ColorResolver::new(
            settings.clone(),
            extractor,
            host.clone(),
            config.color_cache_capacity,
        ));
        let engine = ReconcileEngine::new(host, settings.clone(), colors);
        Dispatcher::new(config, settings, engine)
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn known_key(&self, tab_id: TabId) -> Option<String> {
        self.history.borrow().get(&tab_id).cloned()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.scheduler.borrow().next_deadline()
    }

    fn schedule(&self, task: Task, due_at: Millis) {
        if self.scheduler.borrow_mut().schedule(task, due_at) {
            log::debug!("Scheduled {:?} at {}", task, due_at);
        }
    }

    pub async fn handle_event(&self, event: HostEvent, now: Millis) {
        match event {
            HostEvent::TabCreated(tab) => {
                if self.settings.auto_group_enabled() {
                    self.schedule(Task::ReconcileWindow(tab.window_id), now + self.config.tab_created_delay_ms);
                }
            }
            HostEvent::TabUpdated { tab, change } => {
                if self.settings.auto_group_enabled() {
                    self.on_tab_updated(tab, change, now).await;
                }
            }
            HostEvent::TabRemoved { tab_id, .. } => {
                self.history.borrow_mut().remove(&tab_id);
                if self.settings.auto_group_enabled() {
                    self.schedule(Task::SweepAndReconcileAll, now + self.config.tab_removed_delay_ms);
                }
            }
            HostEvent::Startup => {
                self.settings.reload().await;
                if self.settings.auto_group_enabled() {
                    self.schedule(Task::ReconcileAll, now);
                }
            }
        }
    }

    async fn on_tab_updated(&self, tab: Tab, change: TabChange, now: Millis) {
        let url = match (&change.url, change.is_complete()) {
            (Some(url), _) => url.clone(),
            (None, true) => tab.url.clone(),
            (None, false) => return,
        };

        let new_key = self.settings.with(|settings| grouping_key(&url, settings));
        let old_key = self.known_key(tab.id);
        if new_key == old_key {
            log::debug!("Tab {} still on {:?}, skipping", tab.id, new_key);
            return;
        }

        {
            let mut history = self.history.borrow_mut();
            match &new_key {
                Some(key) => history.insert(tab.id, key.clone()),
                None => history.remove(&tab.id),
            };
        }

        if let Some(old_key) = old_key {
            log::info!("Tab {} domain changed from {} to {:?}", tab.id, old_key, new_key);
            if let Err(e) = self.engine.handle_domain_change(tab.id, new_key.as_deref()).await {
                log::error!("Error handling domain change of tab {}: {}", tab.id, e);
            }
        }

        self.schedule(
            Task::ReconcileWindow(tab.window_id),
            now + self.config.navigation_settle_delay_ms,
        );
    }

    /// Run every task due by `now`; returns how many ran
    ///
    /// Failed passes are logged and dropped; the next event schedules a new one.
    pub async fn run_due(&self, now: Millis) -> usize {
        let due = self.scheduler.borrow_mut().take_due(now);

        for task in &due {
            if !self.settings.auto_group_enabled() {
                log::debug!("Auto-grouping disabled, dropping {:?}", task);
            } else if let Err(e) = self.run_task(*task).await {
                log::error!("Reconciliation {:?} abandoned: {}", task, e);
            }
            self.scheduler.borrow_mut().finish(*task);
        }
        due.len()
    }

    async fn run_task(&self, task: Task) -> HostResult<()> {
        match task {
            Task::ReconcileWindow(window_id) => self.reconcile(Scope::Window(window_id)).await,
            Task::ReconcileAll => self.reconcile(Scope::AllWindows).await,
            Task::SweepAndReconcileAll => {
                self.engine.dissolve_singletons(Scope::AllWindows).await?;
                self.reconcile(Scope::AllWindows).await
            }
        }
    }

    async fn reconcile(&self, scope: Scope) -> HostResult<()> {
        let reports = self.engine.reconcile(scope).await?;

        let mut history = self.history.borrow_mut();
        for report in &reports {
            for (tab_id, key) in &report.observed_keys {
                history.entry(*tab_id).or_insert_with(|| key.clone());
            }
            if report.changed() {
                log::info!(
                    "Pass {} on window {}: {} ungrouped, {} added, {} groups created, {} dissolved",
                    report.id,
                    report.window_id,
                    report.ungrouped,
                    report.added,
                    report.created,
                    report.dissolved
                );
            }
        }
        Ok(())
    }

    pub async fn handle_command(&self, command: Command) -> CommandResponse {
        log::debug!("Command: {:?}", command);
        match self.execute(command).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Command failed: {}", e);
                CommandResponse::failure(e.reason())
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<CommandResponse, CommandError> {
        let mutation = match command {
            Command::GroupTabs => {
                self.reconcile(Scope::AllWindows).await?;
                return Ok(CommandResponse::ok());
            }
            Command::GroupTabsInWindow { window_id } => {
                self.reconcile(Scope::Window(window_id)).await?;
                return Ok(CommandResponse::ok());
            }
            Command::GetSettings => {
                return Ok(CommandResponse {
                    settings: Some(self.settings.snapshot()),
                    ..CommandResponse::ok()
                });
            }
            Command::GetExcludedDomains => return Ok(self.with_excluded_domains(CommandResponse::ok())),
            Command::GetDomainColors => return Ok(self.with_domain_colors(CommandResponse::ok())),
            Command::ToggleAutoGroup { enabled } => SettingsMutation::SetAutoGroup(enabled),
            Command::ToggleSubdomainGrouping { enabled } => SettingsMutation::SetSubdomainGrouping(enabled),
            Command::AddExcludedDomain { domain } => SettingsMutation::AddExcludedDomain(domain),
            Command::RemoveExcludedDomain { domain } => SettingsMutation::RemoveExcludedDomain(domain),
            Command::SetDomainColor { domain, color } => SettingsMutation::SetDomainColor { domain, color },
            Command::RemoveDomainColor { domain } => SettingsMutation::RemoveDomainColor(domain),
            Command::SetDomainName { domain, name } => SettingsMutation::SetDomainName { domain, name },
            Command::RemoveDomainName { domain } => SettingsMutation::RemoveDomainName(domain),
        };

        let change = self.settings.apply(mutation).await?;
        if let Err(e) = self.apply_change(&change).await {
            log::error!("Error updating groups after {:?}: {}", change, e);
        }

        let response = CommandResponse::ok();
        Ok(match change {
            SettingsChange::Excluded(_) | SettingsChange::Unexcluded(_) => self.with_excluded_domains(response),
            SettingsChange::ColorSet { .. } | SettingsChange::ColorRemoved(_) => self.with_domain_colors(response),
            _ => response,
        })
    }

    /// Bring existing groups in line with a settings change
    async fn apply_change(&self, change: &SettingsChange) -> HostResult<()> {
        match change {
            SettingsChange::AutoGroup(_) | SettingsChange::SubdomainGrouping(_) | SettingsChange::Unexcluded(_) => {}
            SettingsChange::Excluded(pattern) => {
                self.engine.ungroup_matching(pattern).await?;
            }
            SettingsChange::ColorSet { domain, color } => {
                self.engine.colors().invalidate(domain);
                self.engine.recolor_groups(domain, Some(*color)).await?;
            }
            SettingsChange::ColorRemoved(domain) => {
                self.engine.colors().invalidate(domain);
                self.engine.recolor_groups(domain, None).await?;
            }
            SettingsChange::Renamed { from, to, .. } => {
                self.engine.retitle_groups(from, to).await?;
            }
        }

        if self.settings.auto_group_enabled() {
            self.reconcile(Scope::AllWindows).await?;
        }
        Ok(())
    }

    fn with_excluded_domains(&self, response: CommandResponse) -> CommandResponse {
        CommandResponse {
            excluded_domains: Some(self.settings.with(|s| s.excluded_domains.clone())),
            ..response
        }
    }

    fn with_domain_colors(&self, response: CommandResponse) -> CommandResponse {
        CommandResponse {
            domain_colors: Some(self.settings.with(|s| s.domain_colors.clone())),
            ..response
        }
    }
}
