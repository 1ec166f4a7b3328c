//! Grounded prompt construction and answer generation.
//!
//! The [`AnswerComposer`] joins retrieved segment texts, nearest first, into a
//! context block, renders them with the question into a [`PromptTemplate`],
//! and hands the prompt to a [`Generator`]. The completion comes back
//! untouched.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::RetrievedSegment;
use crate::error::{RagError, Result};
use crate::generation::Generator;

/// Placed between consecutive segment texts in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// The instruction sent to the language model by default.
pub const DEFAULT_TEMPLATE: &str = "\
You are an intelligent assistant. Use the following context to answer the user's question.
If you don't know the answer, just say that you don't know. Do not try to make up an answer.

Context:
{context}

Question:
{question}

Answer:
";

/// An instruction template with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Use a custom template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] unless both `{context}` and `{question}` appear.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::Config(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in one left-to-right pass.
    ///
    /// Values are inserted verbatim and never rescanned, so a context that
    /// happens to contain `{question}` stays as written.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// Join segment texts in retrieval order with [`CONTEXT_SEPARATOR`].
pub fn build_context(retrieved: &[RetrievedSegment<'_>]) -> String {
    retrieved.iter().map(|r| r.segment.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Builds grounded prompts and delegates generation.
#[derive(Clone)]
pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
}

impl AnswerComposer {
    /// Create a composer using the default template.
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator, template: PromptTemplate::default() }
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Render the prompt for `query` over `retrieved` without calling the model.
    pub fn render_prompt(&self, query: &str, retrieved: &[RetrievedSegment<'_>]) -> String {
        self.template.render(&build_context(retrieved), query)
    }

    /// Render the prompt and make exactly one generation call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the model call fails.
    pub async fn compose(&self, query: &str, retrieved: &[RetrievedSegment<'_>]) -> Result<String> {
        let prompt = self.render_prompt(query, retrieved);
        debug!(
            generator = self.generator.name(),
            segments = retrieved.len(),
            prompt_len = prompt.len(),
            "generating answer"
        );

        let answer = self.generator.generate(&prompt).await.map_err(|e| {
            error!(generator = self.generator.name(), error = %e, "generation failed");
            match e {
                RagError::Generation { .. } => e,
                other => RagError::Generation {
                    provider: self.generator.name().to_string(),
                    message: other.to_string(),
                },
            }
        })?;

        info!(answer_len = answer.len(), "answer generated");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::document::Segment;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  raw completion\n".to_string())
        }
    }

    struct BrokenGenerator;

    #[async_trait]
    impl Generator for BrokenGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RagError::Extraction("socket closed".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn segment(id: usize, text: &str) -> Segment {
        Segment { id, text: text.to_string(), source_name: "doc".to_string() }
    }

    #[test]
    fn context_preserves_retrieval_order() {
        let (a, b) = (segment(4, "nearest"), segment(0, "second"));
        let retrieved = [
            RetrievedSegment { segment: &a, distance: 0.1 },
            RetrievedSegment { segment: &b, distance: 0.7 },
        ];
        assert_eq!(build_context(&retrieved), "nearest\n\n---\n\nsecond");
    }

    #[test]
    fn render_substitutes_once_and_verbatim() {
        let template = PromptTemplate::new("C:{context}|Q:{question}|{other}").unwrap();
        let rendered = template.render("mentions {question} literally", "why {context}?");
        assert_eq!(rendered, "C:mentions {question} literally|Q:why {context}?|{other}");
    }

    #[test]
    fn template_requires_both_placeholders() {
        assert!(matches!(PromptTemplate::new("only {context}"), Err(RagError::Config(_))));
        assert!(matches!(PromptTemplate::new("only {question}"), Err(RagError::Config(_))));
    }

    #[test]
    fn default_template_mentions_context_and_question() {
        let rendered = PromptTemplate::default().render("CTX", "QQ");
        assert!(rendered.contains("Context:\nCTX\n"));
        assert!(rendered.contains("Question:\nQQ\n"));
        assert!(rendered.ends_with("Answer:\n"));
    }

    #[tokio::test]
    async fn compose_returns_completion_verbatim() {
        let generator = Arc::new(RecordingGenerator::default());
        let composer = AnswerComposer::new(generator.clone());
        let seg = segment(0, "Paris is the capital of France.");
        let retrieved = [RetrievedSegment { segment: &seg, distance: 0.0 }];

        let answer = composer.compose("What is the capital of France?", &retrieved).await.unwrap();
        assert_eq!(answer, "  raw completion\n");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Paris is the capital of France."));
        assert!(prompts[0].contains("What is the capital of France?"));
    }

    #[tokio::test]
    async fn failures_become_generation_errors() {
        let composer = AnswerComposer::new(Arc::new(BrokenGenerator));
        let err = composer.compose("q", &[]).await.unwrap_err();
        match err {
            RagError::Generation { provider, message } => {
                assert_eq!(provider, "broken");
                assert!(message.contains("socket closed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
