//! Answer composition: prompt, bounded generation, citation linking

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::{GenerationParams, LlmProvider};
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{Answer, Grounding, RetrievedPassage};

use super::citation::link_citations;
use super::prompt::PromptBuilder;

/// Answer returned when retrieval found nothing to ground on
pub const INSUFFICIENT_GROUNDING_ANSWER: &str =
    "No relevant information was found in the indexed regulatory documents to answer this question.";

/// Characters of chunk text kept in a citation excerpt
const EXCERPT_CHARS: usize = 300;

/// Generates cited answers from retrieved passages
pub struct AnswerComposer {
    llm: Arc<dyn LlmProvider>,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        let timeout_secs = config.timeout_secs.max(1);
        // A timed-out attempt ends the call with GenerationTimeout
        let retry = RetryPolicy::new(config.max_retries, Duration::from_secs(config.retry_delay_secs))
            .with_attempt_timeout(Duration::from_secs(timeout_secs))
            .with_retry_timeouts(false);

        Self {
            llm,
            params: GenerationParams::from(config),
            retry,
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Compose an answer to `question` grounded in `passages`
    ///
    /// With no passages the LLM is not called and a fixed
    /// insufficient-grounding answer is returned.
    pub async fn compose(&self, question: &str, passages: &[RetrievedPassage]) -> Result<Answer> {
        if passages.is_empty() {
            tracing::info!("No passages retrieved, returning insufficient-grounding answer");
            return Ok(insufficient_grounding());
        }

        let prompt = PromptBuilder::build_rag_prompt(question, passages);
        tracing::debug!(
            "Generating answer with {} from {} passages ({} prompt chars)",
            self.llm.model(),
            passages.len(),
            prompt.len()
        );

        let completion = self.generate(&prompt).await?;
        let (text, citations, grounding) = link_citations(completion.trim(), passages, EXCERPT_CHARS)?;

        tracing::info!(
            "Answer composed: {} citations ({:?})",
            citations.len(),
            grounding
        );
        Ok(Answer {
            text,
            citations,
            grounding,
        })
    }

    /// Structured analysis of document `title` from its key passages
    pub async fn analyze(&self, title: &str, passages: &[RetrievedPassage]) -> Result<Answer> {
        if passages.is_empty() {
            tracing::info!("No key passages for '{}', skipping analysis", title);
            return Ok(insufficient_grounding());
        }

        let prompt = PromptBuilder::build_analysis_prompt(title, passages);
        let completion = self.generate(&prompt).await?;
        let (text, citations, grounding) = link_citations(completion.trim(), passages, EXCERPT_CHARS)?;

        tracing::info!("Analysis of '{}': {} citations ({:?})", title, citations.len(), grounding);
        Ok(Answer {
            text,
            citations,
            grounding,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let llm = &self.llm;
        let params = &self.params;

        let result = self
            .retry
            .run(llm.name(), || async move {
                let completion = llm.generate(prompt, params).await?;
                if completion.trim().is_empty() {
                    return Err(Error::provider(llm.name(), "empty completion"));
                }
                Ok(completion)
            })
            .await;

        result.map_err(|e| match e {
            RetryError::TimedOut { timeout, .. } => {
                tracing::error!("{} generation timed out after {:?}", llm.name(), timeout);
                Error::GenerationTimeout(timeout.as_secs())
            }
            RetryError::Exhausted { attempts, last } => Error::GenerationUnavailable(format!(
                "{} failed after {} attempts: {}",
                llm.name(),
                attempts,
                last
            )),
            RetryError::Fatal(e) => e,
        })
    }
}

fn insufficient_grounding() -> Answer {
    Answer {
        text: INSUFFICIENT_GROUNDING_ANSWER.to_string(),
        citations: Vec::new(),
        grounding: Grounding::InsufficientGrounding,
    }
}
