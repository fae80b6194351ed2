//! Named DSN profiles.
//!
//! ```toml
//! [profiles.local]
//! dsn = "root@tcp(127.0.0.1:8080)/main?interpolateParams=true"
//!
//! [profiles.prod]
//! dsn = "app:secret@tcp(db.internal)/ledger?tls=true"
//! description = "production ledger"
//! ```
//!
//! Stored at `<config dir>/mdb/config.toml`. A DSN argument of the form
//! `@name` is replaced by the named profile's DSN.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MdbError, MdbResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub dsn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profiles {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Profiles {
    /// Default location of the profile file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mdb").join("config.toml"))
    }

    pub fn from_toml(content: &str) -> MdbResult<Self> {
        toml::from_str(content)
            .map_err(|e| MdbError::config(format!("invalid profile file: {}", e)))
    }

    pub fn load(path: &Path) -> MdbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from the default path; a missing file yields no profiles.
    pub fn load_default() -> MdbResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Expand `@name` to the profile's DSN; any other string is returned as is.
    pub fn resolve(&self, target: &str) -> MdbResult<String> {
        match target.strip_prefix('@') {
            Some(name) => self
                .get(name)
                .map(|p| p.dsn.clone())
                .ok_or_else(|| MdbError::config(format!("unknown profile: {}", name))),
            None => Ok(target.to_string()),
        }
    }
}
