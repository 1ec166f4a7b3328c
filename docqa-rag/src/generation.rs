//! Language-model collaborator trait.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a rendered prompt into completion text.
///
/// One call, one completion. Retries and timeouts belong to the
/// implementation; callers treat the call as a single remote function.
/// Failures should be reported as [`RagError::Generation`](crate::RagError::Generation).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::Generator;
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl Generator for Echo {
///     async fn generate(&self, prompt: &str) -> docqa_rag::Result<String> {
///         Ok(prompt.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send `prompt` and return the completion verbatim.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str {
        "generator"
    }
}
