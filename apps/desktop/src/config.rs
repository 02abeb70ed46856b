use std::{collections::HashMap, fs, time::Duration};

pub const SETTINGS_FILE: &str = "desktop.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub anisette_server: String,
    pub two_factor_timeout_secs: u64,
    pub simulated_step_delay_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anisette_server: "ani.sidestore.io".into(),
            two_factor_timeout_secs: 120,
            simulated_step_delay_ms: 250,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn two_factor_timeout(&self) -> Duration {
        Duration::from_secs(self.two_factor_timeout_secs)
    }

    pub fn simulated_step_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_step_delay_ms)
    }

    /// Applies a flat `key = "value"` table. A malformed table is ignored.
    pub fn merge_file(&mut self, raw: &str) {
        let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
            return;
        };
        self.merge(|key| file_cfg.get(key).cloned());
    }

    /// Applies `APP__<KEY>` variables from `lookup`.
    pub fn merge_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.merge(|key| lookup(&format!("APP__{}", key.to_ascii_uppercase())));
    }

    fn merge(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("anisette_server") {
            self.anisette_server = v;
        }
        if let Some(v) = get("two_factor_timeout_secs") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.two_factor_timeout_secs = parsed;
            }
        }
        if let Some(v) = get("simulated_step_delay_ms") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.simulated_step_delay_ms = parsed;
            }
        }
        if let Some(v) = get("log_filter") {
            self.log_filter = v;
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        settings.merge_file(&raw);
    }
    settings.merge_env(|key| std::env::var(key).ok());

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
