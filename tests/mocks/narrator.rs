use std::sync::{Arc, Mutex};

use live_narrator::narrator::{Narrate, Priority};

/// Records every narration request instead of speaking.
#[derive(Default)]
pub struct MockNarrator {
    pub spoken: Mutex<Vec<(String, Priority)>>,
}

impl MockNarrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.spoken.lock().unwrap().len()
    }
}

impl Narrate for MockNarrator {
    fn enqueue(&self, text: &str, priority: Priority) {
        self.spoken.lock().unwrap().push((text.into(), priority));
    }
}
