//! Answer generation with LLM and citation handling

pub mod citation;
mod composer;
pub mod prompt;

pub use citation::{excerpt, extract_markers, link_citations};
pub use composer::{AnswerComposer, INSUFFICIENT_GROUNDING_ANSWER};
pub use prompt::PromptBuilder;
