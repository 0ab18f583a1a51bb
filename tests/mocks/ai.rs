use std::sync::Arc;

use async_trait::async_trait;
use live_narrator::ai::Respond;

/// Scripted reply generator. Always enabled; answers every comment with the
/// configured reply, or with nothing to exercise the fallback path.
pub struct MockAiResponder {
    reply: Option<String>,
}

impl MockAiResponder {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.into()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self { reply: None })
    }
}

#[async_trait]
impl Respond for MockAiResponder {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn reply_to_comment(&self, _user: &str, _text: &str) -> Option<String> {
        self.reply.clone()
    }
}
