/// Group color resolution: manual overrides, cache, favicon sampling, hash fallback
use async_trait::async_trait;
use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

use crate::host::TabStore;
use crate::storage::SettingsStore;
use crate::tab_data::{GroupColor, Rgb, TabId};

/// Representative RGB value of each group color, in matching order
const PALETTE: [(GroupColor, Rgb); 8] = [
    (GroupColor::Red, Rgb::new(255, 67, 54)),
    (GroupColor::Pink, Rgb::new(233, 30, 99)),
    (GroupColor::Purple, Rgb::new(156, 39, 176)),
    (GroupColor::Blue, Rgb::new(33, 150, 243)),
    (GroupColor::Cyan, Rgb::new(0, 188, 212)),
    (GroupColor::Green, Rgb::new(76, 175, 80)),
    (GroupColor::Yellow, Rgb::new(255, 235, 59)),
    (GroupColor::Grey, Rgb::new(158, 158, 158)),
];

/// Colors indexed by the key hash
const HASH_COLORS: [GroupColor; 8] = [
    GroupColor::Blue,
    GroupColor::Red,
    GroupColor::Yellow,
    GroupColor::Green,
    GroupColor::Pink,
    GroupColor::Purple,
    GroupColor::Cyan,
    GroupColor::Grey,
];

/// Samples the dominant color of a favicon
///
/// Implementations return `None` on timeout or failure; the resolver never
/// sees an error from this collaborator.
#[async_trait(?Send)]
pub trait ColorExtractor {
    async fn dominant_color(&self, favicon_url: &str, tab_id: Option<TabId>) -> Option<Rgb>;
}

/// Nearest palette color by Euclidean RGB distance; the first minimum wins
pub fn nearest_group_color(sample: &Rgb) -> GroupColor {
    let mut best = PALETTE[0].0;
    let mut min_distance = f64::INFINITY;

    for (color, rgb) in PALETTE.iter() {
        let distance = sample.distance(rgb);
        if distance < min_distance {
            min_distance = distance;
            best = *color;
        }
    }

    best
}

/// 32-bit rolling hash over UTF-16 code units, wrapping on overflow
pub fn key_hash(key: &str) -> i32 {
    key.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Deterministic color for a key with no better source
pub fn hash_color(key: &str) -> GroupColor {
    let index = key_hash(key).unsigned_abs() as usize % HASH_COLORS.len();
    HASH_COLORS[index]
}

fn is_fetchable_favicon(url: &str) -> bool {
    !url.is_empty() && !url.starts_with("chrome://") && !url.starts_with("chrome-extension://")
}

pub struct ColorResolver {
    settings: Rc<SettingsStore>,
    extractor: Rc<dyn ColorExtractor>,
    host: Rc<dyn TabStore>,
    cache: RefCell<LruCache<String, GroupColor>>,
}

impl ColorResolver {
    pub fn new(
        settings: Rc<SettingsStore>,
        extractor: Rc<dyn ColorExtractor>,
        host: Rc<dyn TabStore>,
        capacity: usize,
    ) -> ColorResolver {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        ColorResolver {
            settings,
            extractor,
            host,
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    /// Resolve the display color for a grouping key
    ///
    /// Order: manual override, cache, favicon sample, key hash. The result
    /// is cached for the key.
    pub async fn resolve(&self, key: &str, favicon_url: Option<&str>, tab_id: Option<TabId>) -> GroupColor {
        if let Some(color) = self.settings.with(|s| s.domain_colors.get(key).copied()) {
            log::debug!("Using manual color for {}: {}", key, color);
            self.cache.borrow_mut().put(key.to_string(), color);
            return color;
        }

        if let Some(color) = self.cache.borrow_mut().get(key).copied() {
            return color;
        }

        let sampled = match self.favicon_for(favicon_url, tab_id).await {
            Some(url) => self.extractor.dominant_color(&url, tab_id).await,
            None => None,
        };

        let color = match sampled {
            Some(rgb) => {
                let color = nearest_group_color(&rgb);
                log::info!("Extracted color for {}: RGB({},{},{}) -> {}", key, rgb.r, rgb.g, rgb.b, color);
                color
            }
            None => hash_color(key),
        };

        self.cache.borrow_mut().put(key.to_string(), color);
        color
    }

    /// Drop the cached color for a key
    pub fn invalidate(&self, key: &str) {
        self.cache.borrow_mut().pop(key);
    }

    pub fn cached(&self, key: &str) -> Option<GroupColor> {
        self.cache.borrow().peek(key).copied()
    }

    async fn favicon_for(&self, favicon_url: Option<&str>, tab_id: Option<TabId>) -> Option<String> {
        let url = match (favicon_url, tab_id) {
            (Some(url), _) => Some(url.to_string()),
            (None, Some(tab_id)) => match self.host.tab(tab_id).await {
                Ok(tab) => tab.favicon_url,
                Err(e) => {
                    log::debug!("Could not refetch favicon of tab {}: {}", tab_id, e);
                    None
                }
            },
            (None, None) => None,
        };
        url.filter(|url| is_fetchable_favicon(url))
    }
}
