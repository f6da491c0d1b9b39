use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

/// Configuration for the daily step sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub api_base_url: String,
    pub user_id: String,
    /// Local time of day at which reconciliation fires, "HH:MM".
    pub trigger_time: String,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub sensor_timeout_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stridesync.app".into(),
            user_id: String::new(),
            trigger_time: "00:00".into(),
            max_attempts: 5,
            retry_backoff_secs: 180,
            sensor_timeout_ms: 3000,
        }
    }
}

impl SyncSettings {
    /// Parsed trigger time of day; malformed values fall back to midnight.
    pub fn trigger_time_of_day(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.trigger_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&self.trigger_time, "%H:%M:%S"))
            .unwrap_or_else(|_| {
                log::warn!(
                    "invalid trigger_time '{}', falling back to 00:00",
                    self.trigger_time
                );
                NaiveTime::MIN
            })
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SyncSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            SyncSettings::default()
        };

        let store = Self {
            path,
            data: RwLock::new(data),
        };
        // Write defaults back on first run so the file is there to edit.
        if !store.path.exists() {
            store.persist(&store.data.read().unwrap())?;
        }
        Ok(store)
    }

    pub fn sync(&self) -> SyncSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update_sync(&self, settings: SyncSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &SyncSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl SettingsStore {
    #[allow(dead_code)]
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: SyncSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn defaults_match_pipeline_contract() {
        let settings = SyncSettings::default();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.retry_backoff(), Duration::from_secs(180));
        assert_eq!(settings.sensor_timeout(), Duration::from_millis(3000));
        assert_eq!(settings.trigger_time_of_day(), NaiveTime::MIN);
    }

    #[test]
    fn trigger_time_parses_hh_mm() {
        let settings = SyncSettings {
            trigger_time: "23:55".into(),
            ..SyncSettings::default()
        };
        let t = settings.trigger_time_of_day();
        assert_eq!((t.hour(), t.minute()), (23, 55));
    }

    #[test]
    fn malformed_trigger_time_falls_back_to_midnight() {
        let settings = SyncSettings {
            trigger_time: "late".into(),
            ..SyncSettings::default()
        };
        assert_eq!(settings.trigger_time_of_day(), NaiveTime::MIN);
    }

    #[test]
    fn store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = store.sync();
        settings.user_id = "user-42".into();
        settings.trigger_time = "06:30".into();
        store.update_sync(settings).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        let loaded = reopened.sync();
        assert_eq!(loaded.user_id, "user-42");
        assert_eq!(loaded.trigger_time, "06:30");
    }
}
