use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::PipelineError;

const BUILTIN_RULES: &str = include_str!("versions.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct VersionRule {
    pub id: String,
    pub pack_format: u32,
    pub rules: String,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    version: Vec<VersionRule>,
}

/// Version id -> prompt rule block. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct VersionRuleSet {
    by_id: BTreeMap<String, VersionRule>,
}

impl VersionRuleSet {
    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        let file: RuleFile = toml::from_str(text)
            .map_err(|e| PipelineError::Configuration(format!("invalid version rules: {e}")))?;
        let mut set = Self::default();
        set.extend(file.version);
        Ok(set)
    }

    /// The table compiled into the binary.
    pub fn builtin() -> &'static VersionRuleSet {
        static BUILTIN: OnceLock<VersionRuleSet> = OnceLock::new();
        BUILTIN.get_or_init(|| match Self::from_toml(BUILTIN_RULES) {
            Ok(set) => set,
            Err(e) => {
                tracing::error!("built-in version rules are unreadable: {e}");
                VersionRuleSet::default()
            }
        })
    }

    /// Built-in table plus the entries of `path`; entries in the file win.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut set = Self::builtin().clone();
        if let Some(p) = path {
            let text = fs_err::read_to_string(p)
                .map_err(|e| PipelineError::Configuration(e.to_string()))?;
            let extra = Self::from_toml(&text)?;
            set.extend(extra.by_id.into_values());
        }
        Ok(set)
    }

    fn extend(&mut self, rules: impl IntoIterator<Item = VersionRule>) {
        for rule in rules {
            self.by_id.insert(rule.id.clone(), rule);
        }
    }

    /// Rule block for `version`, or "" when the version is not in the table.
    pub fn block(&self, version: &str) -> &str {
        self.by_id
            .get(version.trim())
            .map(|r| r.rules.trim())
            .unwrap_or("")
    }

    pub fn get(&self, version: &str) -> Option<&VersionRule> {
        self.by_id.get(version.trim())
    }

    pub fn versions(&self) -> impl Iterator<Item = &VersionRule> {
        self.by_id.values()
    }
}
