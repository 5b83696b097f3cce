use super::{ImageProvider, ProviderResult};
use crate::error::ProviderFailure;
use crate::models::SourceProvider;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Scripted reply for [`MockImageProvider`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Image(Vec<u8>),
    Fail(String),
    /// Never answers; for exercising deadlines and cancellation.
    Hang,
}

/// In-memory provider that replays scripted replies and counts calls.
///
/// Replies are consumed in order; once the script runs out the last reply is
/// repeated. With no script at all every call fails.
#[derive(Clone)]
pub struct MockImageProvider {
    name: String,
    source: SourceProvider,
    replies: Arc<Mutex<Vec<MockReply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockImageProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: SourceProvider::OpenAiStyle,
            replies: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_source(mut self, source: SourceProvider) -> Self {
        self.source = source;
        self
    }

    pub fn with_image_response(self, image: Vec<u8>) -> Self {
        self.replies.lock().unwrap().push(MockReply::Image(image));
        self
    }

    pub fn with_failure(self, reason: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push(MockReply::Fail(reason.to_string()));
        self
    }

    pub fn hanging(self) -> Self {
        self.replies.lock().unwrap().push(MockReply::Hang);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn get_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Option<MockReply> {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            Some(replies.remove(0))
        } else {
            replies.first().cloned()
        }
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> SourceProvider {
        self.source
    }

    async fn attempt_generation(&self, prompt: &str) -> ProviderResult {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.next_reply() {
            Some(MockReply::Image(image)) => Ok(image),
            Some(MockReply::Fail(reason)) => Err(ProviderFailure::MalformedResponse(reason)),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(ProviderFailure::MalformedResponse(format!(
                "mock provider {} has no scripted reply",
                self.name
            ))),
        }
    }
}
