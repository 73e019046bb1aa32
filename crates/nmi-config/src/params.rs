//! The four reason-code list parameters and where they come from.
//!
//! Each list may be supplied on the kernel-style command line
//! (`nmimgr.events_panic=...`), through `NMIMGR_EVENTS_*` environment
//! variables, in the JSON config file, or directly by the caller.

use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Prefix used on the boot command line.
pub const CMDLINE_PREFIX: &str = "nmimgr.";

/// Raw, unparsed list parameters. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panic: Option<String>,
}

impl TriageParams {
    pub fn get(&self, category: Category) -> Option<&str> {
        match category {
            Category::Ignore => self.ignore.as_deref(),
            Category::Debug => self.debug.as_deref(),
            Category::Drop => self.drop.as_deref(),
            Category::Panic => self.panic.as_deref(),
        }
    }

    pub fn set(&mut self, category: Category, list: impl Into<String>) {
        let slot = match category {
            Category::Ignore => &mut self.ignore,
            Category::Debug => &mut self.debug,
            Category::Drop => &mut self.drop,
            Category::Panic => &mut self.panic,
        };
        *slot = Some(list.into());
    }

    /// Builder-style setter.
    pub fn with(mut self, category: Category, list: impl Into<String>) -> Self {
        self.set(category, list);
        self
    }

    /// Extract `nmimgr.events_*=` parameters from a boot command line.
    ///
    /// Unrelated words are ignored; a later occurrence of a key overrides an
    /// earlier one.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut params = Self::default();
        for word in cmdline.split_whitespace() {
            let Some(rest) = word.strip_prefix(CMDLINE_PREFIX) else {
                continue;
            };
            let Some((key, value)) = rest.split_once('=') else {
                continue;
            };
            if let Some(category) = Category::ALL.iter().find(|c| c.param_name() == key) {
                params.set(*category, value);
            }
        }
        params
    }

    /// Read `NMIMGR_EVENTS_IGNORE` and friends through `lookup`.
    ///
    /// Takes the lookup as a function so tests don't touch the process
    /// environment.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut params = Self::default();
        for category in Category::ALL {
            if let Some(value) = lookup(&env_var_name(category)) {
                params.set(category, value);
            }
        }
        params
    }

    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Fill every unset list from `fallback`. `self` wins where both are set.
    pub fn or(mut self, fallback: &TriageParams) -> Self {
        for category in Category::ALL {
            if self.get(category).is_none() {
                if let Some(list) = fallback.get(category) {
                    self.set(category, list);
                }
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.get(*c).is_none())
    }
}

/// Environment variable carrying the list for `category`.
pub fn env_var_name(category: Category) -> String {
    format!("NMIMGR_{}", category.param_name().to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn cmdline_extracts_known_keys() {
        let params = TriageParams::from_cmdline(
            "BOOT_IMAGE=/vmlinuz ro quiet nmimgr.events_panic=61,62 nmimgr.events_drop=1-4 crashkernel=256M",
        );
        assert_eq!(params.panic.as_deref(), Some("61,62"));
        assert_eq!(params.drop.as_deref(), Some("1-4"));
        assert_eq!(params.ignore, None);
        assert_eq!(params.debug, None);
    }

    #[test]
    fn cmdline_later_key_overrides_earlier() {
        let params =
            TriageParams::from_cmdline("nmimgr.events_ignore=1 nmimgr.events_ignore=2,3");
        assert_eq!(params.ignore.as_deref(), Some("2,3"));
    }

    #[test]
    fn cmdline_ignores_unknown_and_bare_keys() {
        let params = TriageParams::from_cmdline("nmimgr.events_bogus=1 nmimgr.events_panic other.events_panic=9");
        assert!(params.is_empty());
    }

    #[test]
    fn env_lookup_uses_uppercase_names() {
        let env: HashMap<&str, &str> = [("NMIMGR_EVENTS_DEBUG", "5-7")].into_iter().collect();
        let params = TriageParams::from_env_with(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(params.debug.as_deref(), Some("5-7"));
        assert_eq!(env_var_name(Category::Panic), "NMIMGR_EVENTS_PANIC");
    }

    #[test]
    fn or_keeps_primary_values() {
        let primary = TriageParams::default().with(Category::Panic, "1");
        let fallback = TriageParams::default()
            .with(Category::Panic, "2")
            .with(Category::Drop, "3");
        let merged = primary.or(&fallback);
        assert_eq!(merged.panic.as_deref(), Some("1"));
        assert_eq!(merged.drop.as_deref(), Some("3"));
    }
}
