use serde::{Deserialize, Serialize};

/// Embedded source database.
const EMBEDDED_DB: &str = include_str!("../data/sources.toml");

/// A known media source and how each platform identifies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    /// Display name reported to clients (e.g., "Spotify").
    pub name: String,
    /// MPRIS identity or bus name substrings (Linux).
    #[serde(default)]
    pub mpris_identities: Vec<String>,
    /// SMTC AppUserModelId substrings (Windows).
    #[serde(default)]
    pub smtc_app_ids: Vec<String>,
    /// Android package names (Android, WayDroid).
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub is_browser: bool,
}

#[derive(Debug, Deserialize)]
struct SourceDbFile {
    #[serde(rename = "source", default)]
    sources: Vec<SourceDef>,
}

/// Database of known media sources.
#[derive(Debug, Clone, Default)]
pub struct SourceDatabase {
    pub sources: Vec<SourceDef>,
}

impl SourceDatabase {
    /// Load the embedded source database.
    pub fn embedded() -> Self {
        Self::from_toml(EMBEDDED_DB).expect("embedded sources.toml should be valid")
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let db: SourceDbFile = toml::from_str(toml_str)?;
        Ok(Self {
            sources: db.sources,
        })
    }

    /// Merge a user database into this one.
    /// Sources with matching names are replaced; new sources are appended.
    pub fn merge_user(&mut self, user_db: &SourceDatabase) {
        for user_source in &user_db.sources {
            if let Some(existing) = self.sources.iter_mut().find(|s| s.name == user_source.name) {
                *existing = user_source.clone();
            } else {
                self.sources.push(user_source.clone());
            }
        }
    }

    /// Embedded database with the user's `sources.toml` merged on top, if present.
    pub fn load(user_path: &std::path::Path) -> Self {
        let mut db = Self::embedded();
        match std::fs::read_to_string(user_path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(user) => {
                    tracing::info!(path = %user_path.display(), count = user.sources.len(), "Loaded user sources");
                    db.merge_user(&user);
                }
                Err(e) => {
                    tracing::warn!(path = %user_path.display(), error = %e, "Ignoring invalid user sources file");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %user_path.display(), error = %e, "Could not read user sources file");
            }
        }
        db
    }

    /// Find a source by MPRIS identity (case-insensitive substring match).
    pub fn find_by_mpris(&self, identity: &str) -> Option<&SourceDef> {
        let identity_lower = identity.to_lowercase();
        self.sources.iter().find(|s| {
            s.mpris_identities
                .iter()
                .any(|id| identity_lower.contains(&id.to_lowercase()))
        })
    }

    /// Find a source by SMTC app id (case-insensitive substring match).
    pub fn find_by_smtc(&self, app_id: &str) -> Option<&SourceDef> {
        let app_id_lower = app_id.to_lowercase();
        self.sources.iter().find(|s| {
            s.smtc_app_ids
                .iter()
                .any(|id| app_id_lower.contains(&id.to_lowercase()))
        })
    }

    /// Find a source by Android package name (exact match).
    pub fn find_by_package(&self, package: &str) -> Option<&SourceDef> {
        self.sources
            .iter()
            .find(|s| s.packages.iter().any(|p| p == package))
    }
}
