use std::path::PathBuf;

use log::warn;
use serde::Deserialize;
use serde_json::Value;

/// Environment variable consulted when the client does not name a store.
pub const STORE_ENV: &str = "DT_LSP_STORE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// JSON file holding the company library collection.
    pub store_path: Option<PathBuf>,
}

impl Settings {
    /// Read settings from `initializationOptions` or a
    /// `didChangeConfiguration` payload. Both `{"dt": {...}}` and the flat
    /// form are accepted. Returns `None` when the payload carries no settings
    /// of ours (another extension's section, `{}`, `null`) or cannot be
    /// parsed, so the caller keeps what it has.
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        let value = value?;
        let section = match value.get("dt") {
            Some(section) => section,
            None if value.get("storePath").is_some() => value,
            None => return None,
        };
        match serde_json::from_value(section.clone()) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("ignoring invalid settings: {e}");
                None
            }
        }
    }

    /// Fill unset fields from the environment.
    pub fn with_env_fallback(mut self) -> Self {
        if self.store_path.is_none() {
            self.store_path = std::env::var_os(STORE_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
        }
        self
    }

    /// Settings to switch to after a `didChangeConfiguration` payload, or
    /// `None` when the payload leaves the current settings in place.
    pub fn updated(&self, value: &Value) -> Option<Self> {
        let next = Self::from_value(Some(value))?.with_env_fallback();
        (next != *self).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_section() {
        let v = json!({"dt": {"storePath": "/tmp/companies.json"}});
        let s = Settings::from_value(Some(&v)).unwrap();
        assert_eq!(s.store_path, Some(PathBuf::from("/tmp/companies.json")));
    }

    #[test]
    fn flat_section() {
        let v = json!({"storePath": "lib.json", "other": 1});
        let s = Settings::from_value(Some(&v)).unwrap();
        assert_eq!(s.store_path, Some(PathBuf::from("lib.json")));
    }

    #[test]
    fn empty_section_clears_path() {
        let v = json!({"dt": {}});
        assert_eq!(Settings::from_value(Some(&v)), Some(Settings::default()));
        let v = json!({"dt": {"storePath": null}});
        assert_eq!(Settings::from_value(Some(&v)), Some(Settings::default()));
    }

    #[test]
    fn unrelated_payloads_carry_no_settings() {
        assert_eq!(Settings::from_value(None), None);
        for v in [json!({"editor": {"tabSize": 4}}), json!({}), json!(null), json!("x")] {
            assert_eq!(Settings::from_value(Some(&v)), None, "{v}");
        }
    }

    #[test]
    fn invalid_settings_are_ignored() {
        let v = json!({"storePath": 42});
        assert_eq!(Settings::from_value(Some(&v)), None);
        let v = json!({"dt": {"storePath": [1]}});
        assert_eq!(Settings::from_value(Some(&v)), None);
    }

    #[test]
    fn explicit_path_beats_env() {
        let s = Settings {
            store_path: Some(PathBuf::from("explicit.json")),
        }
        .with_env_fallback();
        assert_eq!(s.store_path, Some(PathBuf::from("explicit.json")));
    }

    #[test]
    fn unrelated_change_keeps_current_store() {
        let current = Settings::from_value(Some(&json!({"storePath": "/srv/companies.json"})))
            .unwrap()
            .with_env_fallback();
        for v in [json!({"editor": {"tabSize": 4}}), json!({}), json!(null)] {
            assert_eq!(current.updated(&v), None, "{v}");
        }
        let same = json!({"dt": {"storePath": "/srv/companies.json"}});
        assert_eq!(current.updated(&same), None);

        let moved = json!({"dt": {"storePath": "/srv/other.json"}});
        let next = current.updated(&moved).unwrap();
        assert_eq!(next.store_path, Some(PathBuf::from("/srv/other.json")));
    }
}
