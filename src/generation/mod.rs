pub mod client;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;

pub use client::LlmClient;
pub use prompt::GenerationPrompt;

#[derive(Debug)]
pub enum GenerationError {
    /// The backing service could not be reached or answered with an error.
    Service(String),
    /// The service answered, but not with a usable item.
    MalformedOutput(String),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Service(msg) => write!(f, "generation service failure: {msg}"),
            GenerationError::MalformedOutput(msg) => write!(f, "malformed model output: {msg}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Produces the raw text for one study item. The production implementation
/// talks to an LLM endpoint; tests swap in a scripted double.
#[async_trait]
pub trait ItemGenerator: Send + Sync {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, GenerationError>;
}
