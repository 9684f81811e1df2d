/// Settings and their persistence in chrome.storage.local
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::domain::{is_valid_domain_pattern, normalize_pattern};
use crate::error::{SettingsError, StorageError};
use crate::tab_data::GroupColor;

pub const AUTO_GROUP_ENABLED: &str = "autoGroupEnabled";
pub const EXCLUDED_DOMAINS: &str = "excludedDomains";
pub const DOMAIN_COLORS: &str = "domainColors";
pub const DOMAIN_NAMES: &str = "domainNames";
pub const USE_SUBDOMAIN_GROUPING: &str = "useSubdomainGrouping";

const ALL_KEYS: [&str; 5] = [
    AUTO_GROUP_ENABLED,
    EXCLUDED_DOMAINS,
    DOMAIN_COLORS,
    DOMAIN_NAMES,
    USE_SUBDOMAIN_GROUPING,
];

/// Flat string-keyed store the settings are persisted to
#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError>;
    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError>;
}

/// User settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub auto_group_enabled: bool,
    pub excluded_domains: Vec<String>,
    pub domain_colors: BTreeMap<String, GroupColor>,
    pub domain_names: BTreeMap<String, String>,
    pub use_subdomain_grouping: bool,
}

impl Settings {
    pub fn new() -> Self {
        Settings {
            auto_group_enabled: true,
            excluded_domains: Vec::new(),
            domain_colors: BTreeMap::new(),
            domain_names: BTreeMap::new(),
            use_subdomain_grouping: false,
        }
    }

    /// Build settings from stored values; missing or malformed keys keep their defaults
    pub fn from_stored(stored: &Map<String, Value>) -> Self {
        let mut settings = Settings::new();

        if let Some(enabled) = stored.get(AUTO_GROUP_ENABLED).and_then(Value::as_bool) {
            settings.auto_group_enabled = enabled;
        }
        if let Some(enabled) = stored.get(USE_SUBDOMAIN_GROUPING).and_then(Value::as_bool) {
            settings.use_subdomain_grouping = enabled;
        }
        if let Some(value) = stored.get(EXCLUDED_DOMAINS) {
            settings.excluded_domains = decode(EXCLUDED_DOMAINS, value).unwrap_or_default();
        }
        if let Some(value) = stored.get(DOMAIN_COLORS) {
            settings.domain_colors = decode(DOMAIN_COLORS, value).unwrap_or_default();
        }
        if let Some(value) = stored.get(DOMAIN_NAMES) {
            settings.domain_names = decode(DOMAIN_NAMES, value).unwrap_or_default();
        }

        settings
    }

    /// Current value of one storage key
    pub fn stored_value(&self, key: &str) -> Option<Value> {
        match key {
            AUTO_GROUP_ENABLED => Some(Value::Bool(self.auto_group_enabled)),
            USE_SUBDOMAIN_GROUPING => Some(Value::Bool(self.use_subdomain_grouping)),
            EXCLUDED_DOMAINS => serde_json::to_value(&self.excluded_domains).ok(),
            DOMAIN_COLORS => serde_json::to_value(&self.domain_colors).ok(),
            DOMAIN_NAMES => serde_json::to_value(&self.domain_names).ok(),
            _ => None,
        }
    }

    pub fn add_excluded_domain(&mut self, pattern: &str) -> Result<String, SettingsError> {
        let pattern = validated_domain(pattern)?;
        if self.excluded_domains.contains(&pattern) {
            return Err(SettingsError::AlreadyExcluded(pattern));
        }
        self.excluded_domains.push(pattern.clone());
        Ok(pattern)
    }

    pub fn remove_excluded_domain(&mut self, pattern: &str) -> Result<String, SettingsError> {
        let pattern = normalize_pattern(pattern);
        let original_len = self.excluded_domains.len();
        self.excluded_domains.retain(|p| *p != pattern);
        if self.excluded_domains.len() < original_len {
            Ok(pattern)
        } else {
            Err(SettingsError::NotExcluded(pattern))
        }
    }

    pub fn set_domain_color(&mut self, domain: &str, color: &str) -> Result<(String, GroupColor), SettingsError> {
        let domain = validated_domain(domain)?;
        if color.trim().is_empty() {
            return Err(SettingsError::MissingColor);
        }
        let color: GroupColor = color
            .parse()
            .map_err(|_| SettingsError::InvalidColor(color.to_string()))?;
        self.domain_colors.insert(domain.clone(), color);
        Ok((domain, color))
    }

    pub fn remove_domain_color(&mut self, domain: &str) -> Result<String, SettingsError> {
        let domain = normalize_pattern(domain);
        match self.domain_colors.remove(&domain) {
            Some(_) => Ok(domain),
            None => Err(SettingsError::NoColorSet(domain)),
        }
    }

    /// Set an alias; returns the domain and the title its groups had before
    pub fn set_domain_name(&mut self, domain: &str, name: &str) -> Result<(String, String), SettingsError> {
        let domain = validated_domain(domain)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SettingsError::EmptyName);
        }
        let previous = self.title_for(&domain);
        self.domain_names.insert(domain.clone(), name.to_string());
        Ok((domain, previous))
    }

    /// Remove an alias; returns the domain and the alias that was removed
    pub fn remove_domain_name(&mut self, domain: &str) -> Result<(String, String), SettingsError> {
        let domain = normalize_pattern(domain);
        match self.domain_names.remove(&domain) {
            Some(previous) => Ok((domain, previous)),
            None => Err(SettingsError::NoNameSet(domain)),
        }
    }

    /// Display title for a grouping key
    pub fn title_for(&self, key: &str) -> String {
        self.domain_names
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

fn validated_domain(domain: &str) -> Result<String, SettingsError> {
    let domain = normalize_pattern(domain);
    if domain.is_empty() || !is_valid_domain_pattern(&domain) {
        return Err(SettingsError::InvalidDomain(domain));
    }
    Ok(domain)
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            log::warn!("Ignoring malformed stored {}: {}", key, e);
            None
        }
    }
}

/// A settings change requested by the user
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsMutation {
    SetAutoGroup(bool),
    SetSubdomainGrouping(bool),
    AddExcludedDomain(String),
    RemoveExcludedDomain(String),
    SetDomainColor { domain: String, color: String },
    RemoveDomainColor(String),
    SetDomainName { domain: String, name: String },
    RemoveDomainName(String),
}

/// What an applied mutation changed, for the follow-up group updates
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    AutoGroup(bool),
    SubdomainGrouping(bool),
    Excluded(String),
    Unexcluded(String),
    ColorSet { domain: String, color: GroupColor },
    ColorRemoved(String),
    Renamed { domain: String, from: String, to: String },
}

/// Process-wide settings, loaded once and mutated by commands
pub struct SettingsStore {
    current: RefCell<Settings>,
    backend: Rc<dyn KeyValueStore>,
}

impl SettingsStore {
    /// Load settings from the backend; read failures fall back to defaults
    pub async fn load(backend: Rc<dyn KeyValueStore>) -> SettingsStore {
        let store = SettingsStore {
            current: RefCell::new(Settings::new()),
            backend,
        };
        store.reload().await;
        store
    }

    pub async fn reload(&self) {
        let settings = match self.backend.get(&ALL_KEYS).await {
            Ok(stored) => Settings::from_stored(&stored),
            Err(e) => {
                log::error!("Error loading settings: {}", e);
                Settings::new()
            }
        };

        log::info!(
            "Settings loaded: auto-grouping {}, {} excluded domains, {} domain colors, {} domain names",
            settings.auto_group_enabled,
            settings.excluded_domains.len(),
            settings.domain_colors.len(),
            settings.domain_names.len()
        );
        *self.current.borrow_mut() = settings;
    }

    /// A copy of the current settings, stable for one reconciliation pass
    pub fn snapshot(&self) -> Settings {
        self.current.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        f(&self.current.borrow())
    }

    pub fn auto_group_enabled(&self) -> bool {
        self.current.borrow().auto_group_enabled
    }

    /// Apply a mutation in memory, then persist the key it touched
    ///
    /// Validation failures leave the settings unchanged. A failed write is
    /// logged and the in-memory value stays authoritative.
    pub async fn apply(&self, mutation: SettingsMutation) -> Result<SettingsChange, SettingsError> {
        let (change, key) = {
            let mut settings = self.current.borrow_mut();
            match mutation {
                SettingsMutation::SetAutoGroup(enabled) => {
                    settings.auto_group_enabled = enabled;
                    (SettingsChange::AutoGroup(enabled), AUTO_GROUP_ENABLED)
                }
                SettingsMutation::SetSubdomainGrouping(enabled) => {
                    settings.use_subdomain_grouping = enabled;
                    (SettingsChange::SubdomainGrouping(enabled), USE_SUBDOMAIN_GROUPING)
                }
                SettingsMutation::AddExcludedDomain(pattern) => {
                    let pattern = settings.add_excluded_domain(&pattern)?;
                    (SettingsChange::Excluded(pattern), EXCLUDED_DOMAINS)
                }
                SettingsMutation::RemoveExcludedDomain(pattern) => {
                    let pattern = settings.remove_excluded_domain(&pattern)?;
                    (SettingsChange::Unexcluded(pattern), EXCLUDED_DOMAINS)
                }
                SettingsMutation::SetDomainColor { domain, color } => {
                    let (domain, color) = settings.set_domain_color(&domain, &color)?;
                    (SettingsChange::ColorSet { domain, color }, DOMAIN_COLORS)
                }
                SettingsMutation::RemoveDomainColor(domain) => {
                    let domain = settings.remove_domain_color(&domain)?;
                    (SettingsChange::ColorRemoved(domain), DOMAIN_COLORS)
                }
                SettingsMutation::SetDomainName { domain, name } => {
                    let (domain, from) = settings.set_domain_name(&domain, &name)?;
                    let to = settings.title_for(&domain);
                    (SettingsChange::Renamed { domain, from, to }, DOMAIN_NAMES)
                }
                SettingsMutation::RemoveDomainName(domain) => {
                    let (domain, from) = settings.remove_domain_name(&domain)?;
                    let to = domain.clone();
                    (SettingsChange::Renamed { domain, from, to }, DOMAIN_NAMES)
                }
            }
        };

        self.persist(key).await;
        log::info!("Settings changed: {:?}", change);
        Ok(change)
    }

    async fn persist(&self, key: &str) {
        let Some(value) = self.with(|settings| settings.stored_value(key)) else {
            return;
        };
        let mut items = Map::new();
        items.insert(key.to_string(), value);

        if let Err(e) = self.backend.set(items).await {
            log::error!("Failed to persist {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use futures::executor::block_on;
    use serde_json::json;

    fn store_with(values: Value) -> Rc<MemoryStore> {
        Rc::new(MemoryStore::with_values(values))
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new();
        assert!(settings.auto_group_enabled);
        assert!(!settings.use_subdomain_grouping);
        assert!(settings.excluded_domains.is_empty());
        assert!(settings.domain_colors.is_empty());
    }

    #[test]
    fn test_from_stored_keeps_defaults_for_missing_and_malformed_keys() {
        let stored = json!({
            "autoGroupEnabled": false,
            "excludedDomains": ["a.com", "*.b.com"],
            "domainColors": {"a.com": "magenta"},
            "domainNames": {"c.com": "Work"},
        });
        let settings = Settings::from_stored(stored.as_object().unwrap());

        assert!(!settings.auto_group_enabled);
        assert_eq!(settings.excluded_domains, vec!["a.com", "*.b.com"]);
        assert!(settings.domain_colors.is_empty());
        assert_eq!(settings.domain_names.get("c.com"), Some(&"Work".to_string()));
        assert!(!settings.use_subdomain_grouping);
    }

    #[test]
    fn test_add_excluded_domain() {
        let mut settings = Settings::new();

        assert_eq!(settings.add_excluded_domain("  Example.COM "), Ok("example.com".to_string()));
        assert_eq!(
            settings.add_excluded_domain("example.com"),
            Err(SettingsError::AlreadyExcluded("example.com".to_string()))
        );
        assert!(matches!(settings.add_excluded_domain(""), Err(SettingsError::InvalidDomain(_))));
        assert!(matches!(
            settings.add_excluded_domain("not a domain"),
            Err(SettingsError::InvalidDomain(_))
        ));
        assert_eq!(settings.excluded_domains, vec!["example.com"]);
    }

    #[test]
    fn test_remove_excluded_domain() {
        let mut settings = Settings::new();
        settings.add_excluded_domain("*.a.com").unwrap();

        assert_eq!(settings.remove_excluded_domain("*.a.com"), Ok("*.a.com".to_string()));
        assert_eq!(
            settings.remove_excluded_domain("*.a.com"),
            Err(SettingsError::NotExcluded("*.a.com".to_string()))
        );
    }

    #[test]
    fn test_set_domain_color_validation() {
        let mut settings = Settings::new();

        assert_eq!(settings.set_domain_color("a.com", ""), Err(SettingsError::MissingColor));
        assert_eq!(
            settings.set_domain_color("a.com", "orange"),
            Err(SettingsError::InvalidColor("orange".to_string()))
        );
        assert_eq!(
            settings.set_domain_color("a.com", "red"),
            Ok(("a.com".to_string(), GroupColor::Red))
        );
        assert_eq!(settings.domain_colors.get("a.com"), Some(&GroupColor::Red));
    }

    #[test]
    fn test_domain_names() {
        let mut settings = Settings::new();

        assert_eq!(settings.set_domain_name("a.com", "   "), Err(SettingsError::EmptyName));
        assert_eq!(
            settings.set_domain_name("a.com", "Alpha"),
            Ok(("a.com".to_string(), "a.com".to_string()))
        );
        assert_eq!(
            settings.set_domain_name("a.com", "Beta"),
            Ok(("a.com".to_string(), "Alpha".to_string()))
        );
        assert_eq!(settings.title_for("a.com"), "Beta");
        assert_eq!(
            settings.remove_domain_name("a.com"),
            Ok(("a.com".to_string(), "Beta".to_string()))
        );
        assert_eq!(settings.title_for("a.com"), "a.com");
    }

    #[test]
    fn test_store_loads_persisted_values() {
        let backend = store_with(json!({"autoGroupEnabled": false, "useSubdomainGrouping": true}));
        let store = block_on(SettingsStore::load(backend));

        assert!(!store.auto_group_enabled());
        assert!(store.snapshot().use_subdomain_grouping);
    }

    #[test]
    fn test_store_load_failure_uses_defaults() {
        let backend = store_with(json!({"autoGroupEnabled": false}));
        backend.fail_reads(true);
        let store = block_on(SettingsStore::load(backend));

        assert_eq!(store.snapshot(), Settings::new());
    }

    #[test]
    fn test_apply_persists_changed_key() {
        let backend = store_with(json!({}));
        let store = block_on(SettingsStore::load(backend.clone()));

        let change = block_on(store.apply(SettingsMutation::AddExcludedDomain("a.com".to_string())));

        assert_eq!(change, Ok(SettingsChange::Excluded("a.com".to_string())));
        assert_eq!(backend.value(EXCLUDED_DOMAINS), Some(json!(["a.com"])));
        assert_eq!(backend.value(AUTO_GROUP_ENABLED), None);
    }

    #[test]
    fn test_apply_rejected_mutation_changes_nothing() {
        let backend = store_with(json!({}));
        let store = block_on(SettingsStore::load(backend.clone()));

        let result = block_on(store.apply(SettingsMutation::RemoveDomainColor("a.com".to_string())));

        assert_eq!(result, Err(SettingsError::NoColorSet("a.com".to_string())));
        assert_eq!(backend.value(DOMAIN_COLORS), None);
        assert_eq!(store.snapshot(), Settings::new());
    }

    #[test]
    fn test_apply_keeps_memory_value_when_write_fails() {
        let backend = store_with(json!({}));
        let store = block_on(SettingsStore::load(backend.clone()));
        backend.fail_writes(true);

        let change = block_on(store.apply(SettingsMutation::SetAutoGroup(false)));

        assert_eq!(change, Ok(SettingsChange::AutoGroup(false)));
        assert!(!store.auto_group_enabled());
        assert_eq!(backend.value(AUTO_GROUP_ENABLED), None);
    }

    #[test]
    fn test_apply_rename_reports_previous_title() {
        let backend = store_with(json!({"domainNames": {"a.com": "Alpha"}}));
        let store = block_on(SettingsStore::load(backend));

        let change = block_on(store.apply(SettingsMutation::SetDomainName {
            domain: "a.com".to_string(),
            name: "Beta".to_string(),
        }));
        assert_eq!(
            change,
            Ok(SettingsChange::Renamed {
                domain: "a.com".to_string(),
                from: "Alpha".to_string(),
                to: "Beta".to_string(),
            })
        );

        let change = block_on(store.apply(SettingsMutation::RemoveDomainName("a.com".to_string())));
        assert_eq!(
            change,
            Ok(SettingsChange::Renamed {
                domain: "a.com".to_string(),
                from: "Beta".to_string(),
                to: "a.com".to_string(),
            })
        );
    }

    #[test]
    fn test_serialization() {
        let mut settings = Settings::new();
        settings.set_domain_color("a.com", "blue").unwrap();

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["domainColors"]["a.com"], "blue");
        assert_eq!(json["autoGroupEnabled"], true);

        let deserialized: Settings = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized, settings);
    }
}
