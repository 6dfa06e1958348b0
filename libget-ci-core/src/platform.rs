use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Console platforms served by the libget repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Switch,
    #[serde(rename = "wiiu")]
    WiiU,
}

/// Avatar used by the Discord webhook for every platform.
pub const ANNOUNCE_AVATAR_URL: &str =
    "https://switch.cdn.fortheusers.org/packages/appstore/icon.png";

impl Platform {
    /// Slug used in URLs (`switch`, `wiiu`).
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::Switch => "switch",
            Platform::WiiU => "wiiu",
        }
    }

    /// Human-facing name used in announcements.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Switch => "Switch",
            Platform::WiiU => "WiiU",
        }
    }

    /// Root of the published repository for this platform.
    pub fn cdn_url(&self) -> String {
        format!("https://{}.cdn.fortheusers.org", self.slug())
    }

    /// Discord embed colour.
    pub fn embed_color(&self) -> u32 {
        match self {
            Platform::Switch => 0xe60012,
            Platform::WiiU => 0x0098c6,
        }
    }

    /// Public store page for a package.
    pub fn store_page(&self, package: &str) -> String {
        format!("https://hb-app.store/{}/{}", self.slug(), package)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown platform {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "switch" => Ok(Platform::Switch),
            "wiiu" => Ok(Platform::WiiU),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}
