/// Data structures shared between the engine and the host bridge
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TabId = i32;
pub type WindowId = i32;
pub type GroupId = i32;

/// Information about a browser tab, as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "favIconUrl", skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    /// `None` when the tab sits outside any group
    #[serde(default, rename = "groupId", with = "group_id")]
    pub group_id: Option<GroupId>,
}

impl Tab {
    pub fn new(id: TabId, window_id: WindowId, url: &str) -> Tab {
        Tab {
            id,
            window_id,
            url: url.to_string(),
            favicon_url: None,
            group_id: None,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Tab {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_favicon(mut self, favicon_url: &str) -> Tab {
        self.favicon_url = Some(favicon_url.to_string());
        self
    }
}

/// A tab group owned by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: GroupId,
    pub window_id: WindowId,
    #[serde(default)]
    pub title: String,
    pub color: GroupColor,
}

impl TabGroup {
    pub fn has_title(&self) -> bool {
        !self.title.is_empty()
    }
}

/// Changes requested for an existing group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<GroupColor>,
}

impl GroupUpdate {
    pub fn title(title: &str) -> GroupUpdate {
        GroupUpdate {
            title: Some(title.to_string()),
            color: None,
        }
    }

    pub fn color(color: GroupColor) -> GroupUpdate {
        GroupUpdate {
            title: None,
            color: Some(color),
        }
    }
}

/// The eight colors the host accepts for a tab group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
}

impl GroupColor {
    pub const ALL: [GroupColor; 8] = [
        GroupColor::Grey,
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
        }
    }

    /// CSS color used by the popup to render a swatch
    pub fn css(&self) -> &'static str {
        match self {
            GroupColor::Grey => "#9aa0a6",
            GroupColor::Blue => "#4285f4",
            GroupColor::Red => "#ea4335",
            GroupColor::Yellow => "#fbbc04",
            GroupColor::Green => "#34a853",
            GroupColor::Pink => "#ff8bcb",
            GroupColor::Purple => "#9c27b0",
            GroupColor::Cyan => "#00bcd4",
        }
    }
}

impl fmt::Display for GroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupColor::ALL
            .iter()
            .find(|color| color.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown group color: {}", s))
    }
}

/// A dominant color sampled from a favicon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    pub fn distance(&self, other: &Rgb) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

/// The host reports ungrouped tabs with group id -1
mod group_id {
    use super::GroupId;
    use serde::{Deserialize, Deserializer, Serializer};

    const NONE: GroupId = -1;

    pub fn serialize<S: Serializer>(value: &Option<GroupId>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(value.unwrap_or(NONE))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<GroupId>, D::Error> {
        let raw = Option::<GroupId>::deserialize(deserializer)?;
        Ok(raw.filter(|id| *id != NONE))
    }
}
