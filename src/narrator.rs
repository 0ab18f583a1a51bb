//! Narration sink: text → synthesized audio → playback.
//!
//! Requests are serialized through one worker task so utterances never
//! overlap. The queue is small and bounded: under a chat burst, excess
//! normal-priority requests are dropped (a high-priority arrival evicts a
//! queued normal one instead). Synthesis fetches MP3 bytes from an HTTP
//! endpoint with a bounded timeout; playback runs in `spawn_blocking` and
//! the temporary audio file is removed on every exit path.
//!
//! Nothing here ever propagates an error to a producer — narration is a
//! best-effort side branch of the event pipeline.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::TtsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

/// Producer-side seam for narration. The ingestion session and the reminder
/// scheduler only know this trait; tests substitute a recording mock.
pub trait Narrate: Send + Sync {
    /// Queue a message for speech. Must never block or fail.
    fn enqueue(&self, text: &str, priority: Priority);
}

#[derive(Debug, Clone)]
struct Request {
    text: String,
    priority: Priority,
}

pub struct Narrator {
    queue: Mutex<VecDeque<Request>>,
    notify: Notify,
    queue_limit: usize,
    endpoint: String,
    language: String,
    client: Client,
    file_seq: AtomicU64,
}

impl Narrator {
    /// Build the narrator and start its worker task.
    pub fn spawn(config: &TtsConfig) -> Arc<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let narrator = Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            queue_limit: config.queue_limit.max(1),
            endpoint: config.endpoint.clone(),
            language: config.language.clone(),
            client,
            file_seq: AtomicU64::new(0),
        });

        let worker = narrator.clone();
        tokio::spawn(async move {
            worker.run().await;
        });

        narrator
    }

    async fn run(&self) {
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(req) => self.speak_one(req).await,
                None => self.notify.notified().await,
            }
        }
    }

    async fn speak_one(&self, req: Request) {
        let t_start = Instant::now();
        let audio = match self.synthesize(&req.text).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Speech synthesis failed: {e}");
                return;
            }
        };

        // The guard removes the file on every exit path, including playback
        // failure and panics inside the blocking task.
        let path = self.temp_path();
        let _guard = match TempAudio::write(&path, &audio) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Failed to write audio file: {e}");
                return;
            }
        };

        let play_path = path.clone();
        let played = tokio::task::spawn_blocking(move || play_file(&play_path)).await;
        match played {
            Ok(Ok(())) => {
                let total_ms = t_start.elapsed().as_millis();
                debug!("Spoke {} chars in {total_ms}ms", req.text.len());
            }
            Ok(Err(e)) => warn!("Audio playback failed: {e}"),
            Err(e) => warn!("Playback task panicked: {e}"),
        }
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.language.as_str()),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("endpoint returned status {}", resp.status()));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("failed to read audio body: {e}"))?;
        if bytes.is_empty() {
            return Err("endpoint returned empty audio".into());
        }
        Ok(bytes.to_vec())
    }

    fn temp_path(&self) -> PathBuf {
        let n = self.file_seq.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("live-narrator-{}-{n}.mp3", std::process::id()))
    }

    #[cfg(test)]
    fn queued(&self) -> Vec<(String, Priority)> {
        self.queue
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.text.clone(), r.priority))
            .collect()
    }

    #[cfg(test)]
    fn push_for_test(&self, text: &str, priority: Priority) {
        self.enqueue_inner(text, priority);
    }

    fn enqueue_inner(&self, text: &str, priority: Priority) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.queue_limit {
            match priority {
                Priority::Normal => {
                    debug!("Narration queue full, dropping normal-priority message");
                    return;
                }
                Priority::High => {
                    // Make room by evicting a queued normal-priority item,
                    // oldest first; with none left, the oldest high goes.
                    if let Some(pos) = queue.iter().position(|r| r.priority == Priority::Normal) {
                        queue.remove(pos);
                    } else {
                        queue.pop_front();
                    }
                    info!("Narration queue full, evicted one message for high-priority");
                }
            }
        }
        queue.push_back(Request {
            text: text.to_string(),
            priority,
        });
        drop(queue);
        self.notify.notify_one();
    }
}

impl Narrate for Narrator {
    fn enqueue(&self, text: &str, priority: Priority) {
        self.enqueue_inner(text, priority);
    }
}

/// Temporary audio artifact, deleted on drop.
struct TempAudio {
    path: PathBuf,
}

impl TempAudio {
    fn write(path: &Path, bytes: &[u8]) -> Result<Self, String> {
        let mut file =
            std::fs::File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        file.write_all(bytes)
            .map_err(|e| format!("write {}: {e}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to remove {}: {e}", self.path.display());
        }
    }
}

/// Decode and play one audio file to completion. Blocking.
fn play_file(path: &Path) -> Result<(), String> {
    let stream = rodio::OutputStreamBuilder::open_default_stream()
        .map_err(|e| format!("failed to open audio output: {e}"))?;
    let sink = rodio::Sink::connect_new(stream.mixer());

    let file = std::fs::File::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
    let decoder = rodio::Decoder::new(std::io::BufReader::new(file))
        .map_err(|e| format!("failed to decode audio: {e}"))?;

    sink.append(decoder);
    sink.sleep_until_end();
    Ok(())
}
