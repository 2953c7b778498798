use std::fmt;
use std::str::FromStr;

use crate::source_db::SourceDef;

/// Player names that identify a web browser (case-insensitive substrings).
const BROWSER_PLAYERS: &[&str] = &[
    "chromium",
    "chrome",
    "firefox",
    "brave",
    "edge",
    "opera",
    "vivaldi",
    "librewolf",
    "waterfox",
    "plasma-browser-integration",
];

/// Which sources adapters should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    NoBrowser,
    /// Only dedicated media apps. Currently the same set as `NoBrowser`.
    AppsOnly,
}

impl SourceFilter {
    /// Whether a source with this raw name (and database entry, if known)
    /// passes the filter.
    pub fn allows(self, raw_name: &str, def: Option<&SourceDef>) -> bool {
        match self {
            Self::All => true,
            Self::NoBrowser | Self::AppsOnly => !is_browser(raw_name, def),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::NoBrowser => "no-browser",
            Self::AppsOnly => "apps-only",
        }
    }
}

impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "no-browser" | "no_browser" => Ok(Self::NoBrowser),
            "apps-only" | "apps_only" => Ok(Self::AppsOnly),
            other => Err(format!(
                "unknown filter '{other}', expected all, no-browser or apps-only"
            )),
        }
    }
}

/// A source is a browser if the database says so, or if its name contains a
/// known browser identifier.
pub fn is_browser(raw_name: &str, def: Option<&SourceDef>) -> bool {
    if def.is_some_and(|d| d.is_browser) {
        return true;
    }
    let lower = raw_name.to_lowercase();
    BROWSER_PLAYERS.iter().any(|b| lower.contains(b))
}
