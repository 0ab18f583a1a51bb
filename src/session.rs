//! Ingestion session: one live connection to the chat source.
//!
//! Lifecycle: Idle → Connecting → Connected → Idle (graceful) or Error
//! (connection failure). At most one session exists at a time, enforced by
//! `SessionManager`. Inbound events flow through a classification step that
//! decides, against a point-in-time settings snapshot, whether an event is
//! logged and whether it is narrated; the decision is an explicit value so
//! the filter pipeline is testable without audio or network.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ai::Respond;
use crate::event_log::{EventKind, EventLog};
use crate::narrator::{Narrate, Priority};
use crate::reminder::ReminderScheduler;
use crate::source::{ChatEvent, ChatSource};
use crate::state::{SessionStatus, Settings, SharedState};

/// Everything a session needs, cloned into its task at start.
#[derive(Clone)]
pub struct SessionDeps {
    pub shared: Arc<SharedState>,
    pub log: Arc<EventLog>,
    pub narrator: Arc<dyn Narrate>,
    pub ai: Arc<dyn Respond>,
    pub source: Arc<dyn ChatSource>,
    pub quiet_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("session already active")]
    AlreadyActive,
    #[error("username required")]
    UsernameRequired,
}

/// Owns the single session slot. Start requests are serialized through one
/// lock and checked against the live task handle, so two concurrent starts
/// can never both spawn.
pub struct SessionManager {
    deps: SessionDeps,
    active: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            active: Mutex::new(None),
        }
    }

    /// Launch a session for `username`. Returns immediately; connection
    /// outcome is observable via the status endpoint.
    pub fn start(&self, username: &str) -> Result<(), StartError> {
        let username = username.trim().trim_start_matches('@');
        if username.is_empty() {
            return Err(StartError::UsernameRequired);
        }

        let mut active = self.active.lock().unwrap();
        if let Some(handle) = active.as_ref() {
            if !handle.is_finished() {
                return Err(StartError::AlreadyActive);
            }
        }
        if matches!(
            self.deps.shared.status(),
            SessionStatus::Connecting | SessionStatus::Connected
        ) {
            return Err(StartError::AlreadyActive);
        }

        // Claim the slot before the spawn so a racing start sees Connecting.
        self.deps.shared.set_status(SessionStatus::Connecting);
        let deps = self.deps.clone();
        let room = username.to_string();
        *active = Some(tokio::spawn(async move {
            run_session(deps, room).await;
        }));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// Run one session to completion: connect, consume events, tear down.
pub async fn run_session(deps: SessionDeps, room: String) {
    let SessionDeps {
        shared,
        log,
        narrator,
        ai,
        source,
        quiet_window,
    } = deps;

    shared.set_status(SessionStatus::Connecting);

    let mut rx = match source.connect(&room).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Failed to connect to @{room}: {e}");
            shared.set_status(SessionStatus::Error);
            log.append(
                EventKind::Status,
                json!({ "message": format!("Connection failed: {e}") }),
            );
            return;
        }
    };

    // Best-effort nickname lookup; the room id stands in when it fails.
    let host = match source.room_info(&room).await {
        Ok(info) => info.nickname.unwrap_or_else(|| format!("@{room}")),
        Err(e) => {
            warn!("Room metadata lookup failed for @{room}: {e}");
            format!("@{room}")
        }
    };

    shared.set_host_nickname(&host);
    shared.set_status(SessionStatus::Connected);
    shared.reset_gift_clock();
    log.append(
        EventKind::Status,
        json!({ "message": format!("Connected to {host}!") }),
    );
    if shared.settings().tts_enabled {
        narrator.enqueue(&format!("Connected to {host}'s live stream."), Priority::Normal);
    }

    let reminder = ReminderScheduler::spawn(
        shared.clone(),
        log.clone(),
        narrator.clone(),
        quiet_window,
    );

    let mut ctx = SessionCtx {
        shared: shared.clone(),
        log: log.clone(),
        narrator,
        ai,
        host,
        credited_likes: HashSet::new(),
        credited_shares: HashSet::new(),
    };

    let mut failure = None;
    while let Some(item) = rx.recv().await {
        match item {
            Ok(event) => ctx.handle_event(event).await,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // De-duplication sets die with ctx at the end of this scope.
    reminder.cancel();

    match failure {
        Some(e) => {
            shared.set_status(SessionStatus::Error);
            log.append(
                EventKind::Status,
                json!({ "message": format!("Connection lost: {e}") }),
            );
        }
        None => {
            shared.set_status(SessionStatus::Idle);
            log.append(EventKind::Status, json!({ "message": "Disconnected." }));
        }
    }
    if shared.settings().tts_enabled {
        ctx.narrator
            .enqueue("Disconnected from the live stream.", Priority::High);
    }
}

/// Why an event was dropped by the filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HostJoin,
    Blacklisted,
    NotWhitelisted,
    BelowGiftMinimum,
    AlreadyCredited,
}

/// Planned narration for an event that passed its filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub text: String,
    pub priority: Priority,
    /// Comments may have their narration replaced by an AI reply.
    pub ai_eligible: bool,
}

/// Explicit filter decision for one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skip(SkipReason),
    Log {
        kind: EventKind,
        payload: serde_json::Value,
        narration: Option<Narration>,
    },
}

pub struct SessionCtx {
    shared: Arc<SharedState>,
    log: Arc<EventLog>,
    narrator: Arc<dyn Narrate>,
    ai: Arc<dyn Respond>,
    host: String,
    credited_likes: HashSet<String>,
    credited_shares: HashSet<String>,
}

impl SessionCtx {
    async fn handle_event(&mut self, event: ChatEvent) {
        let settings = self.shared.settings();
        let is_gift = matches!(event, ChatEvent::Gift { .. });

        match self.classify(&settings, event) {
            Outcome::Skip(reason) => debug!("Event skipped: {reason:?}"),
            Outcome::Log {
                kind,
                payload,
                narration,
            } => {
                if is_gift {
                    self.shared.note_gift();
                }

                let (payload, narration) = match narration {
                    Some(n) if n.ai_eligible && self.ai.is_enabled() => {
                        self.with_ai_reply(payload, n).await
                    }
                    other => (payload, other),
                };

                self.log.append(kind, payload);
                if let Some(n) = narration {
                    self.narrator.enqueue(&n.text, n.priority);
                }
            }
        }
    }

    /// Ask the AI for a reply to a narratable comment; on success the reply
    /// replaces the spoken text and lands in the record payload. Any failure
    /// leaves the original narration untouched.
    async fn with_ai_reply(
        &self,
        mut payload: serde_json::Value,
        narration: Narration,
    ) -> (serde_json::Value, Option<Narration>) {
        let user = payload["user"].as_str().unwrap_or_default().to_string();
        let text = payload["text"].as_str().unwrap_or_default().to_string();

        match self.ai.reply_to_comment(&user, &text).await {
            Some(reply) => {
                payload["ai_response"] = json!(reply.clone());
                (
                    payload,
                    Some(Narration {
                        text: reply,
                        ..narration
                    }),
                )
            }
            None => (payload, Some(narration)),
        }
    }

    /// Apply the filter pipeline and build the log/narration plan.
    /// Mutates the per-session de-duplication sets for like/share credit.
    fn classify(&mut self, s: &Settings, event: ChatEvent) -> Outcome {
        let narrate = |enabled: bool, text: String, priority: Priority| {
            (s.tts_enabled && enabled).then_some(Narration {
                text,
                priority,
                ai_eligible: false,
            })
        };

        match event {
            ChatEvent::Comment { user, text } => {
                if s.is_blacklisted(&user) {
                    return Outcome::Skip(SkipReason::Blacklisted);
                }
                if !s.whitelist_admits(&user) {
                    return Outcome::Skip(SkipReason::NotWhitelisted);
                }

                let is_command = text.starts_with('!') || text.starts_with('/');
                let suppressed = s.filter_commands && is_command;
                let narration = (!suppressed)
                    .then(|| narrate(s.read_comments, format!("{user} says: {text}"), Priority::Normal))
                    .flatten()
                    .map(|n| Narration {
                        ai_eligible: true,
                        ..n
                    });

                Outcome::Log {
                    kind: EventKind::Comment,
                    payload: json!({ "user": user, "text": text }),
                    narration,
                }
            }

            ChatEvent::Gift {
                user,
                gift_name,
                quantity,
                unit_value,
            } => {
                let value = unit_value.saturating_mul(quantity);
                if value < s.min_gift_value {
                    return Outcome::Skip(SkipReason::BelowGiftMinimum);
                }
                let gift = if gift_name.is_empty() { "a gift".to_string() } else { gift_name };
                let text = format!("{user} sent {quantity} x {gift}, thank you!");
                Outcome::Log {
                    kind: EventKind::Gift,
                    payload: json!({
                        "user": user,
                        "gift": gift,
                        "quantity": quantity,
                        "value": value,
                    }),
                    narration: narrate(s.read_gifts, text, Priority::High),
                }
            }

            ChatEvent::Join { user } => {
                if s.filter_host && user.to_lowercase() == self.host.to_lowercase() {
                    return Outcome::Skip(SkipReason::HostJoin);
                }
                let text = format!("{user} joined the stream.");
                Outcome::Log {
                    kind: EventKind::Join,
                    payload: json!({ "user": user }),
                    narration: narrate(s.read_joins, text, Priority::Normal),
                }
            }

            ChatEvent::Follow { user } => {
                let text = format!("{user} just followed!");
                Outcome::Log {
                    kind: EventKind::Follow,
                    payload: json!({ "user": user }),
                    narration: narrate(s.read_follows, text, Priority::Normal),
                }
            }

            ChatEvent::Share { user } => {
                if !self.credited_shares.insert(user.to_lowercase()) {
                    return Outcome::Skip(SkipReason::AlreadyCredited);
                }
                let text = format!("{user} shared the stream!");
                Outcome::Log {
                    kind: EventKind::Share,
                    payload: json!({ "user": user }),
                    narration: narrate(s.read_shares, text, Priority::Normal),
                }
            }

            ChatEvent::Like { user, count } => {
                if !self.credited_likes.insert(user.to_lowercase()) {
                    return Outcome::Skip(SkipReason::AlreadyCredited);
                }
                let text = format!("{user} liked the stream!");
                Outcome::Log {
                    kind: EventKind::Like,
                    payload: json!({ "user": user, "count": count }),
                    // Engagement events share the read_shares flag.
                    narration: narrate(s.read_shares, text, Priority::Normal),
                }
            }

            ChatEvent::Subscribe { user } => {
                let text = format!("{user} just subscribed!");
                Outcome::Log {
                    kind: EventKind::Subscribe,
                    payload: json!({ "user": user }),
                    narration: narrate(s.read_subscribes, text, Priority::High),
                }
            }

            ChatEvent::Question { user, text } => {
                let spoken = format!("{user} asks: {text}");
                Outcome::Log {
                    kind: EventKind::Question,
                    payload: json!({ "user": user, "text": text }),
                    narration: narrate(s.read_questions, spoken, Priority::Normal),
                }
            }

            ChatEvent::Poll { question } => Outcome::Log {
                kind: EventKind::Poll,
                payload: json!({ "question": question }),
                narration: narrate(
                    s.read_polls,
                    format!("A poll started: {question}"),
                    Priority::Normal,
                ),
            },

            ChatEvent::StreamEnd => Outcome::Log {
                kind: EventKind::LiveEnd,
                payload: json!({ "message": "The live stream has ended." }),
                narration: narrate(true, "The live stream has ended.".to_string(), Priority::High),
            },
        }
    }
}
