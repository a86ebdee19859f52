//! Upstream LLM providers: a narrow trait plus two real-world groundings
//! (`async-openai`, `genai`), mirroring the way the teacher keeps its
//! vector-store and storage backends behind a trait with a `Real`/`Mock`
//! split gated by `feature = "mock"`.

pub mod error;
pub mod genai_provider;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;


pub use error::ProviderError;
pub use genai_provider::GenAiProvider;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

/// A single-turn completion request. The pipeline deals only in flattened
/// prompt text, not full chat histories, so this is intentionally narrower
/// than either backing SDK's own request type.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A named upstream provider. Unlike [`crate::vectordb::VectorDbClient`]
/// (generic, fixed backend per pool), the set of providers is open — the
/// dispatcher holds a `Vec<Arc<dyn Provider>>` registered at startup — so
/// this trait goes through `async-trait` to stay object-safe, the same way
/// the teacher's `lifecycle::cloud` storage backend does.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}
