use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MigrationError;
use crate::naming::{root_namespace_for, to_slash};

const DEFAULT_STALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;

/// Run settings, loadable from YAML. Every field has a default.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrationConfig {
    pub root_namespace: Option<String>,
    pub ignore: IgnoreRules,
    pub static_extensions: Vec<String>,
    pub watchdog: WatchdogConfig,
    /// JSON control-template catalog replacing embedded entries tag by tag.
    pub templates: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            root_namespace: None,
            ignore: IgnoreRules::default(),
            static_extensions: [
                "css", "js", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "bmp", "webp",
                "woff", "woff2", "ttf", "eot", "otf", "htm", "html", "txt", "pdf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            watchdog: WatchdogConfig::default(),
            templates: None,
        }
    }
}

impl MigrationConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, MigrationError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, MigrationError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| MigrationError::Config(format!("{}: {err}", path.display())))?;
        let mut config = Self::from_yaml_str(&raw).map_err(|err| err.context(path.display()))?;
        // Catalog paths are relative to the config file.
        if let (Some(templates), Some(dir)) = (config.templates.as_mut(), path.parent()) {
            if templates.is_relative() {
                *templates = dir.join(&*templates);
            }
        }
        Ok(config)
    }

    pub fn root_namespace(&self, project_root: &Path) -> String {
        self.root_namespace
            .clone()
            .filter(|namespace| !namespace.trim().is_empty())
            .unwrap_or_else(|| root_namespace_for(project_root))
    }

    pub fn is_static(&self, relative: &Path) -> bool {
        let Some(extension) = relative.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.static_extensions
            .iter()
            .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

/// Discovery filter. Accept rules are checked first and win over deny rules.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IgnoreRules {
    /// Path substrings that are always discovered.
    pub accept: Vec<String>,
    /// Path substrings that are never discovered.
    pub deny: Vec<String>,
    /// File-name suffixes that are never discovered.
    pub deny_suffixes: Vec<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            accept: Vec::new(),
            deny: ["/bin/", "/obj/", "/.vs/", "/.git/", "/packages/", "/node_modules/"]
                .into_iter()
                .map(String::from)
                .collect(),
            deny_suffixes: [".designer.cs", ".csproj", ".sln", ".user", ".suo"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl IgnoreRules {
    /// Matches against the project-relative path in `/a/b.ext` form, case
    /// insensitively.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let candidate = format!("/{}", to_slash(relative)).to_ascii_lowercase();
        let matches = |pattern: &String| candidate.contains(&pattern.to_ascii_lowercase());
        if self.accept.iter().any(matches) {
            return false;
        }
        if self.deny.iter().any(matches) {
            return true;
        }
        self.deny_suffixes
            .iter()
            .any(|suffix| candidate.ends_with(&suffix.to_ascii_lowercase()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub stall_timeout_ms: u64,
    pub check_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }
}

impl WatchdogConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Never zero; `tokio::time::interval` rejects a zero period.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}
