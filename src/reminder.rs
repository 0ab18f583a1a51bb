//! Quiet-window gift reminder scheduler.
//!
//! One task per connected session. Sleeps for the configured interval; on
//! wake, if no qualifying gift arrived within the quiet window, logs a
//! reminder record and queues a high-priority narration naming the host.
//! Cancellation is a synchronous token trip raced against the sleep: once
//! requested, no new reminder starts, while an emission already past the
//! check runs to completion.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event_log::{EventKind, EventLog};
use crate::narrator::{Narrate, Priority};
use crate::state::SharedState;

pub struct ReminderScheduler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ReminderScheduler {
    pub fn spawn(
        shared: Arc<SharedState>,
        log: Arc<EventLog>,
        narrator: Arc<dyn Narrate>,
        quiet_window: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                // Interval is re-read every cycle so a settings change takes
                // effect without a reconnect.
                let minutes = shared.settings().reminder_interval_minutes.max(1);
                let interval = Duration::from_secs(minutes * 60);

                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if task_token.is_cancelled() {
                    break;
                }

                let quiet_for = shared.secs_since_last_gift();
                let due = quiet_for.map_or(true, |s| s >= quiet_window.as_secs());
                if !due {
                    debug!("Reminder skipped, gift {quiet_for:?}s ago");
                    continue;
                }

                let host = shared.host_nickname();
                let host = if host.is_empty() { "the host".to_string() } else { host };
                let message =
                    format!("It has been quiet for a while. Send {host} a gift to show support!");
                info!("Reminder: {message}");

                log.append(EventKind::Reminder, json!({ "message": message }));
                if shared.settings().tts_enabled {
                    narrator.enqueue(&message, Priority::High);
                }
            }
            debug!("Reminder scheduler stopped");
        });

        Self { token, handle }
    }

    /// Request cancellation. Synchronous; no reminder fires after this
    /// returns, except one whose emission had already begun.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}
