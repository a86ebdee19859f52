use genai::Client;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest};
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, Provider, ProviderError};

/// Provider backed by `genai`, which routes by model name to whichever
/// upstream API that model belongs to.
pub struct GenAiProvider {
    name: String,
    client: Client,
}

impl GenAiProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: Client::default(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for GenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let chat_request = ChatRequest::new(vec![ChatMessage::user(request.prompt.clone())]);

        let mut options = ChatOptions::default();
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            options = options.with_temperature(temperature as f64);
        }

        debug!(model = %request.model, "dispatching genai chat completion");

        let response = self
            .client
            .exec_chat(&request.model, chat_request, Some(&options))
            .await
            .map_err(|e| classify_genai_error(&self.name, &e))?;

        let text = response
            .first_text()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.name.clone(),
                message: "no text content in response".to_string(),
            })?
            .to_string();

        Ok(CompletionResponse {
            text,
            prompt_tokens: response.usage.prompt_tokens.unwrap_or(0) as u32,
            completion_tokens: response.usage.completion_tokens.unwrap_or(0) as u32,
        })
    }
}

fn classify_genai_error(provider: &str, error: &genai::Error) -> ProviderError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ProviderError::Timeout {
            provider: provider.to_string(),
        }
    } else if lower.contains("rate limit") || lower.contains("429") {
        ProviderError::RateLimited {
            provider: provider.to_string(),
        }
    } else {
        ProviderError::RequestFailed {
            provider: provider.to_string(),
            message,
        }
    }
}
