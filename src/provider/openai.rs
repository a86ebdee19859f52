use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, Provider, ProviderError};

/// Provider backed by `async-openai`, calling OpenAI's chat completions
/// endpoint directly.
pub struct OpenAiProvider {
    name: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Builds a provider from the `OPENAI_API_KEY` environment variable
    /// (the default `async-openai` config source).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
        }
    }

    pub fn with_api_key(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            name: name.into(),
            client: Client::with_config(config),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.clone())
                .build()
                .map_err(|e| ProviderError::RequestFailed {
                    provider: self.name.clone(),
                    message: e.to_string(),
                })?
                .into();

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&request.model).messages(vec![user_message]);
        if let Some(max_tokens) = request.max_tokens {
            builder.max_completion_tokens(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }

        let openai_request = builder.build().map_err(|e| ProviderError::RequestFailed {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;

        debug!(model = %request.model, "dispatching openai chat completion");

        let response = self.client.chat().create(openai_request).await.map_err(|e| {
            classify_openai_error(&self.name, &e)
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.name.clone(),
                message: "no choices in response".to_string(),
            })?;

        let text = choice.message.content.unwrap_or_default();
        let usage = response.usage.ok_or_else(|| ProviderError::InvalidResponse {
            provider: self.name.clone(),
            message: "response carried no usage accounting".to_string(),
        })?;

        Ok(CompletionResponse {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

fn classify_openai_error(provider: &str, error: &async_openai::error::OpenAIError) -> ProviderError {
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
