use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::meeting::{MeetingDraft, MeetingZone, DEFAULT_MEETING_MINUTES};

pub const SETTINGS_FILE: &str = "outreach.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub backend_url: String,
    /// Upper bound for one outstanding call or meeting request; `0` waits
    /// indefinitely.
    pub action_timeout_seconds: u64,
    pub meeting_outcome_capacity: usize,
    /// Fixed UTC offset for meeting input such as `+05:30`. Unset means the
    /// system local zone.
    pub meeting_timezone: Option<String>,
    pub senior_name: String,
    pub meeting_duration_minutes: u32,
    pub meeting_title: String,
    pub meeting_description: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let draft = MeetingDraft::default();
        Self {
            backend_url: "http://localhost:8000".into(),
            action_timeout_seconds: 30,
            meeting_outcome_capacity: 256,
            meeting_timezone: None,
            senior_name: draft.senior_name,
            meeting_duration_minutes: DEFAULT_MEETING_MINUTES,
            meeting_title: draft.title,
            meeting_description: draft.description,
        }
    }
}

impl ClientSettings {
    pub fn action_timeout(&self) -> Option<Duration> {
        (self.action_timeout_seconds > 0).then(|| Duration::from_secs(self.action_timeout_seconds))
    }

    pub fn meeting_zone(&self) -> MeetingZone {
        self.meeting_timezone
            .as_deref()
            .and_then(MeetingZone::parse)
            .unwrap_or_default()
    }

    /// Draft every newly opened meeting form starts from.
    pub fn meeting_template(&self) -> MeetingDraft {
        MeetingDraft {
            senior_name: self.senior_name.clone(),
            meeting_time: String::new(),
            duration_minutes: self.meeting_duration_minutes,
            title: self.meeting_title.clone(),
            description: self.meeting_description.clone(),
        }
    }
}

/// One source of overrides. Unset fields leave the previous layer alone.
#[derive(Debug, Default, Deserialize)]
struct SettingsLayer {
    backend_url: Option<String>,
    action_timeout_seconds: Option<u64>,
    meeting_outcome_capacity: Option<usize>,
    meeting_timezone: Option<String>,
    senior_name: Option<String>,
    meeting_duration_minutes: Option<u32>,
    meeting_title: Option<String>,
    meeting_description: Option<String>,
}

impl SettingsLayer {
    fn apply(self, settings: &mut ClientSettings, source: &str) {
        if let Some(raw) = self.backend_url {
            match normalize_backend_url(&raw) {
                Ok(url) => settings.backend_url = url,
                Err(err) => warn!(source, error = %err, "config: ignoring backend url"),
            }
        }
        if let Some(seconds) = self.action_timeout_seconds {
            settings.action_timeout_seconds = seconds;
        }
        if let Some(capacity) = self.meeting_outcome_capacity {
            if capacity == 0 {
                warn!(source, "config: ignoring zero meeting outcome capacity");
            } else {
                settings.meeting_outcome_capacity = capacity;
            }
        }
        if let Some(raw) = self.meeting_timezone {
            if MeetingZone::parse(&raw).is_some() {
                settings.meeting_timezone = Some(raw.trim().to_string());
            } else {
                warn!(source, value = %raw, "config: ignoring meeting timezone");
            }
        }
        if let Some(name) = self.senior_name {
            settings.senior_name = name;
        }
        if let Some(minutes) = self.meeting_duration_minutes {
            settings.meeting_duration_minutes = minutes;
        }
        if let Some(title) = self.meeting_title {
            settings.meeting_title = title;
        }
        if let Some(description) = self.meeting_description {
            settings.meeting_description = description;
        }
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

/// Defaults, then the TOML file at `path` if it exists, then environment
/// values read through `lookup`.
pub fn load_settings_from<F>(path: &Path, lookup: F) -> ClientSettings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<SettingsLayer>(&raw) {
            Ok(layer) => layer.apply(&mut settings, "file"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config: ignoring settings file")
            }
        }
    }

    apply_env_overrides(&mut settings, lookup);
    settings
}

/// Later names win: `APP__BACKEND_URL` over `BACKEND_URL` over
/// `VITE_BACKEND_URL`.
pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let mut layer = SettingsLayer::default();
    for name in ["VITE_BACKEND_URL", "BACKEND_URL", "APP__BACKEND_URL"] {
        if let Some(value) = read(name) {
            SettingsLayer {
                backend_url: Some(value),
                ..Default::default()
            }
            .apply(settings, name);
        }
    }

    if let Some(value) = read("APP__ACTION_TIMEOUT_SECONDS") {
        match value.trim().parse::<u64>() {
            Ok(seconds) => layer.action_timeout_seconds = Some(seconds),
            Err(err) => warn!(%value, error = %err, "config: ignoring APP__ACTION_TIMEOUT_SECONDS"),
        }
    }
    if let Some(value) = read("APP__MEETING_OUTCOME_CAPACITY") {
        match value.trim().parse::<usize>() {
            Ok(capacity) => layer.meeting_outcome_capacity = Some(capacity),
            Err(err) => {
                warn!(%value, error = %err, "config: ignoring APP__MEETING_OUTCOME_CAPACITY")
            }
        }
    }
    layer.meeting_timezone = read("APP__MEETING_TIMEZONE");
    layer.apply(settings, "env");
}

/// Accepts absolute http(s) URLs and strips the trailing slash.
pub fn normalize_backend_url(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    let url = Url::parse(raw).with_context(|| format!("invalid backend url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("backend url '{raw}' must use http or https");
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
