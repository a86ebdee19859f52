use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{CompletionRequest, CompletionResponse, Provider, ProviderError};

/// In-memory provider double. Queues canned responses (or failures); once
/// the queue drains, falls back to echoing the prompt so tests that don't
/// care about exact output still get a stable success.
pub struct MockProvider {
    name: String,
    queued: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    delay: Mutex<Duration>,
    calls: AtomicU32,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queued: Mutex::new(VecDeque::new()),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicU32::new(0),
        }
    }

    /// Schedules `result` to be returned by the next `complete()` call.
    pub fn push_result(&self, result: Result<CompletionResponse, ProviderError>) {
        self.queued.lock().push_back(result);
    }

    pub fn push_failure(&self, error: ProviderError) {
        self.push_result(Err(error));
    }

    /// Makes every subsequent `complete()` call sleep for `delay` before
    /// resolving, so tests can arrange for concurrent callers to overlap.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Number of times `complete()` has actually run to completion.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(queued) = self.queued.lock().pop_front() {
            return queued;
        }

        Ok(CompletionResponse {
            text: format!("mock response to: {}", request.prompt),
            prompt_tokens: (request.prompt.len() / 4).max(1) as u32,
            completion_tokens: 16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".to_string(),
            prompt: "hello".to_string(),
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn defaults_to_echoing_the_prompt() {
        let provider = MockProvider::new("mock");
        let response = provider.complete(&request()).await.unwrap();
        assert!(response.text.contains("hello"));
    }

    #[tokio::test]
    async fn returns_queued_failure_once() {
        let provider = MockProvider::new("mock");
        provider.push_failure(ProviderError::Timeout {
            provider: "mock".to_string(),
        });

        assert!(provider.complete(&request()).await.is_err());
        assert!(provider.complete(&request()).await.is_ok());
    }
}
