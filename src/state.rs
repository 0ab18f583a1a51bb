//! Shared session state and runtime settings.
//!
//! One `SharedState` exists per process, created Idle at startup and handed
//! by `Arc` to the ingestion session, the reminder scheduler, and the HTTP
//! surface. All fields live behind a single mutex so every settings read is
//! a point-in-time snapshot — the session never sees half of a concurrent
//! settings update.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

/// Connection lifecycle of the (single) ingestion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Operator-tunable behavior, mutable at runtime through `/api/settings`.
///
/// List entries are stored lowercased; all membership checks are
/// case-insensitive. Entries arriving through deserialization (the config
/// file's `settings:` section) are normalized the same way as `list_add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tts_enabled: bool,
    pub read_comments: bool,
    pub read_joins: bool,
    pub read_follows: bool,
    pub read_gifts: bool,
    pub read_shares: bool,
    pub read_subscribes: bool,
    pub read_questions: bool,
    pub read_polls: bool,
    pub filter_commands: bool,
    pub filter_host: bool,
    pub reminder_interval_minutes: u64,
    pub min_gift_value: u64,
    #[serde(deserialize_with = "lowercased_set")]
    pub blacklist: BTreeSet<String>,
    #[serde(deserialize_with = "lowercased_set")]
    pub whitelist: BTreeSet<String>,
}

fn lowercased_set<'de, D>(de: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeSet::<String>::deserialize(de)?;
    Ok(raw.into_iter().map(|s| s.to_lowercase()).collect())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            read_comments: true,
            read_joins: true,
            read_follows: true,
            read_gifts: true,
            read_shares: true,
            read_subscribes: true,
            read_questions: true,
            read_polls: false,
            filter_commands: true,
            filter_host: true,
            reminder_interval_minutes: 5,
            min_gift_value: 0,
            blacklist: BTreeSet::new(),
            whitelist: BTreeSet::new(),
        }
    }
}

impl Settings {
    pub fn is_blacklisted(&self, user: &str) -> bool {
        self.blacklist.contains(&user.to_lowercase())
    }

    /// True when the whitelist admits this user. An empty whitelist admits
    /// everyone.
    pub fn whitelist_admits(&self, user: &str) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(&user.to_lowercase())
    }
}

/// Partial settings update from `/api/settings`. Every field is optional;
/// keys we do not recognize are silently ignored on deserialization, so old
/// control pages can keep posting fields we no longer carry.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub tts_enabled: Option<bool>,
    pub read_comments: Option<bool>,
    pub read_joins: Option<bool>,
    pub read_follows: Option<bool>,
    pub read_gifts: Option<bool>,
    pub read_shares: Option<bool>,
    pub read_subscribes: Option<bool>,
    pub read_questions: Option<bool>,
    pub read_polls: Option<bool>,
    pub filter_commands: Option<bool>,
    pub filter_host: Option<bool>,
    pub reminder_interval_minutes: Option<u64>,
    pub min_gift_value: Option<u64>,
}

/// Which moderation list an API call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListName {
    Blacklist,
    Whitelist,
}

struct Inner {
    status: SessionStatus,
    host_nickname: String,
    last_update: f64,
    settings: Settings,
    last_gift: Option<Instant>,
}

/// JSON view of the state for `/api/status` (log items are attached by the
/// handler).
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub status: SessionStatus,
    pub host_nickname: String,
    pub last_update: f64,
    pub settings: Settings,
}

pub struct SharedState {
    inner: Mutex<Inner>,
}

fn now_unix() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl SharedState {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: SessionStatus::Idle,
                host_nickname: String::new(),
                last_update: now_unix(),
                settings,
                last_gift: None,
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().status
    }

    pub fn set_status(&self, status: SessionStatus) {
        let mut inner = self.inner.lock().unwrap();
        if inner.status != status {
            info!("Session status: {} → {}", inner.status, status);
        }
        inner.status = status;
        inner.last_update = now_unix();
    }

    pub fn host_nickname(&self) -> String {
        self.inner.lock().unwrap().host_nickname.clone()
    }

    pub fn set_host_nickname(&self, nickname: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.host_nickname = nickname.to_string();
        inner.last_update = now_unix();
    }

    /// Point-in-time copy of the settings. One lock acquisition, so a
    /// concurrent update can never be observed half-applied.
    pub fn settings(&self) -> Settings {
        self.inner.lock().unwrap().settings.clone()
    }

    /// Merge recognized fields of a partial update. Returns the resulting
    /// settings.
    pub fn update_settings(&self, update: SettingsUpdate) -> Settings {
        let mut inner = self.inner.lock().unwrap();
        let s = &mut inner.settings;

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = update.$field { s.$field = v; })*
            };
        }
        merge!(
            tts_enabled,
            read_comments,
            read_joins,
            read_follows,
            read_gifts,
            read_shares,
            read_subscribes,
            read_questions,
            read_polls,
            filter_commands,
            filter_host,
            min_gift_value,
        );
        if let Some(v) = update.reminder_interval_minutes {
            // Interval must stay positive; a zero would spin the scheduler.
            s.reminder_interval_minutes = v.max(1);
        }

        inner.last_update = now_unix();
        inner.settings.clone()
    }

    pub fn list_entries(&self, list: ListName) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let set = match list {
            ListName::Blacklist => &inner.settings.blacklist,
            ListName::Whitelist => &inner.settings.whitelist,
        };
        set.iter().cloned().collect()
    }

    /// Idempotent insert. Returns false when the entry was already present.
    pub fn list_add(&self, list: ListName, user: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let set = match list {
            ListName::Blacklist => &mut inner.settings.blacklist,
            ListName::Whitelist => &mut inner.settings.whitelist,
        };
        let added = set.insert(user.to_lowercase());
        inner.last_update = now_unix();
        added
    }

    /// Idempotent removal. Returns false when the entry was absent.
    pub fn list_remove(&self, list: ListName, user: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let set = match list {
            ListName::Blacklist => &mut inner.settings.blacklist,
            ListName::Whitelist => &mut inner.settings.whitelist,
        };
        let removed = set.remove(&user.to_lowercase());
        inner.last_update = now_unix();
        removed
    }

    /// Record that a qualifying (threshold-passing) gift just arrived.
    pub fn note_gift(&self) {
        self.inner.lock().unwrap().last_gift = Some(Instant::now());
    }

    /// Reset gift recency to "now", used at session start so the first
    /// reminder waits out a full quiet window.
    pub fn reset_gift_clock(&self) {
        self.note_gift();
    }

    /// Seconds since the last qualifying gift, or None if none was ever seen.
    pub fn secs_since_last_gift(&self) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .last_gift
            .map(|t| t.elapsed().as_secs())
    }

    pub fn view(&self) -> StateView {
        let inner = self.inner.lock().unwrap();
        StateView {
            status: inner.status,
            host_nickname: inner.host_nickname.clone(),
            last_update: inner.last_update,
            settings: inner.settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_given_settings() {
        let state = SharedState::new(Settings::default());
        assert_eq!(state.status(), SessionStatus::Idle);
        assert!(state.host_nickname().is_empty());
        assert!(state.settings().tts_enabled);
    }

    #[test]
    fn settings_update_merges_only_provided_fields() {
        let state = SharedState::new(Settings::default());
        let update = SettingsUpdate {
            tts_enabled: Some(false),
            min_gift_value: Some(10),
            ..Default::default()
        };
        let merged = state.update_settings(update);
        assert!(!merged.tts_enabled);
        assert_eq!(merged.min_gift_value, 10);
        // Untouched field keeps its value.
        assert!(merged.read_comments);
    }

    #[test]
    fn unknown_keys_in_update_are_ignored() {
        let update: SettingsUpdate = serde_json::from_str(
            r#"{"tts_enabled": false, "frobnicate": true, "read_colors": 3}"#,
        )
        .unwrap();
        let state = SharedState::new(Settings::default());
        let merged = state.update_settings(update);
        assert!(!merged.tts_enabled);
        assert!(merged.read_comments);
    }

    #[test]
    fn reminder_interval_is_clamped_positive() {
        let state = SharedState::new(Settings::default());
        let merged = state.update_settings(SettingsUpdate {
            reminder_interval_minutes: Some(0),
            ..Default::default()
        });
        assert_eq!(merged.reminder_interval_minutes, 1);
    }

    #[test]
    fn lists_are_case_insensitive_and_idempotent() {
        let state = SharedState::new(Settings::default());
        assert!(state.list_add(ListName::Blacklist, "Troll"));
        assert!(!state.list_add(ListName::Blacklist, "TROLL"));
        assert!(state.settings().is_blacklisted("troll"));
        assert!(state.settings().is_blacklisted("tRoLl"));

        assert!(state.list_remove(ListName::Blacklist, "troll"));
        assert!(!state.list_remove(ListName::Blacklist, "troll"));
        assert!(!state.settings().is_blacklisted("troll"));
    }

    #[test]
    fn deserialized_list_entries_are_lowercased() {
        let settings: Settings = serde_yml::from_str(
            "blacklist:\n  - Troll\nwhitelist:\n  - Friend\n",
        )
        .unwrap();

        assert!(settings.blacklist.contains("troll"));
        assert!(settings.is_blacklisted("troll"));
        assert!(settings.is_blacklisted("TROLL"));
        assert!(settings.whitelist_admits("friend"));
        assert!(settings.whitelist_admits("FRIEND"));
        assert!(!settings.whitelist_admits("stranger"));
    }

    #[test]
    fn empty_whitelist_admits_everyone() {
        let state = SharedState::new(Settings::default());
        assert!(state.settings().whitelist_admits("anyone"));

        state.list_add(ListName::Whitelist, "Friend");
        let s = state.settings();
        assert!(s.whitelist_admits("friend"));
        assert!(s.whitelist_admits("FRIEND"));
        assert!(!s.whitelist_admits("stranger"));
    }

    #[tokio::test(start_paused = true)]
    async fn gift_recency_tracks_paused_time() {
        let state = SharedState::new(Settings::default());
        assert_eq!(state.secs_since_last_gift(), None);

        state.note_gift();
        tokio::time::advance(std::time::Duration::from_secs(42)).await;
        assert_eq!(state.secs_since_last_gift(), Some(42));
    }
}
