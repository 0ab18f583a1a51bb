use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use live_narrator::source::{ChatEvent, ChatSource, RoomInfo, SourceError};
use tokio::sync::mpsc;

/// Scripted chat source. Delivers a fixed list of items and then either
/// closes the channel (graceful end) or keeps it open until `close()` so
/// tests can hold a session in the Connected state.
pub struct MockChatSource {
    pub nickname: Option<String>,
    pub room_info_fails: bool,
    pub connect_fails: bool,
    script: Mutex<Vec<Result<ChatEvent, SourceError>>>,
    keep_open: bool,
    open_tx: Mutex<Option<mpsc::Sender<Result<ChatEvent, SourceError>>>>,
}

impl MockChatSource {
    pub fn scripted(events: Vec<Result<ChatEvent, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            nickname: Some("HostNick".into()),
            room_info_fails: false,
            connect_fails: false,
            script: Mutex::new(events),
            keep_open: false,
            open_tx: Mutex::new(None),
        })
    }

    pub fn events(events: Vec<ChatEvent>) -> Arc<Self> {
        Self::scripted(events.into_iter().map(Ok).collect())
    }

    pub fn failing_connect() -> Arc<Self> {
        Arc::new(Self {
            nickname: None,
            room_info_fails: false,
            connect_fails: true,
            script: Mutex::new(Vec::new()),
            keep_open: false,
            open_tx: Mutex::new(None),
        })
    }

    pub fn held_open(events: Vec<ChatEvent>) -> Arc<Self> {
        Arc::new(Self {
            nickname: Some("HostNick".into()),
            room_info_fails: false,
            connect_fails: false,
            script: Mutex::new(events.into_iter().map(Ok).collect()),
            keep_open: true,
            open_tx: Mutex::new(None),
        })
    }

    pub fn without_nickname(events: Vec<ChatEvent>) -> Arc<Self> {
        Arc::new(Self {
            nickname: None,
            room_info_fails: true,
            connect_fails: false,
            script: Mutex::new(events.into_iter().map(Ok).collect()),
            keep_open: false,
            open_tx: Mutex::new(None),
        })
    }

    /// End a held-open stream gracefully.
    pub fn close(&self) {
        self.open_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl ChatSource for MockChatSource {
    async fn room_info(&self, _room: &str) -> Result<RoomInfo, SourceError> {
        if self.room_info_fails {
            return Err(SourceError::Stream("metadata unavailable".into()));
        }
        Ok(RoomInfo {
            nickname: self.nickname.clone(),
        })
    }

    async fn connect(
        &self,
        _room: &str,
    ) -> Result<mpsc::Receiver<Result<ChatEvent, SourceError>>, SourceError> {
        if self.connect_fails {
            return Err(SourceError::Stream("room not found".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        let script: Vec<_> = self.script.lock().unwrap().drain(..).collect();
        for item in script {
            tx.send(item).await.expect("receiver alive during script");
        }
        if self.keep_open {
            *self.open_tx.lock().unwrap() = Some(tx);
        }
        Ok(rx)
    }
}
