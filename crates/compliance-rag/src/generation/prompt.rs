//! Prompt templates for grounded compliance answers

use crate::types::RetrievedPassage;

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build numbered context blocks from retrieved passages
    ///
    /// Block `n` (1-based) is passage `n - 1`; the model cites it as `[n]`.
    pub fn build_context(passages: &[RetrievedPassage]) -> String {
        let mut context = String::new();

        for (i, passage) in passages.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {}\n\nContent:\n{}\n\n---\n\n",
                i + 1,
                Self::format_source_ref(passage),
                passage.chunk.text
            ));
        }

        context
    }

    /// Title plus regulation and jurisdiction labels
    fn format_source_ref(passage: &RetrievedPassage) -> String {
        let mut labels = Vec::new();
        if let Some(regulation) = &passage.regulation_id {
            labels.push(format!("Regulation: {}", regulation));
        }
        if let Some(jurisdiction) = &passage.jurisdiction_id {
            labels.push(format!("Jurisdiction: {}", jurisdiction));
        }

        if labels.is_empty() {
            passage.document_title.clone()
        } else {
            format!("{} ({})", passage.document_title, labels.join(", "))
        }
    }

    /// Build the full prompt with grounding and citation rules
    pub fn build_rag_prompt(question: &str, passages: &[RetrievedPassage]) -> String {
        format!(
            r#"You are an AI assistant specialized in regulatory compliance for financial institutions.

GROUNDING RULES:
1. ONLY use information that is explicitly stated in the CONTEXT below
2. If the context does not answer the question, say that the provided regulations do not cover it
3. Cite every statement with the number of its context block in square brackets, e.g. [1] or [2, 3]
4. Do NOT cite block numbers that are not listed in the context
5. Stay close to the regulatory wording; do not change its meaning

CONTEXT FROM REGULATIONS:
{context}
QUESTION: {question}

Provide a grounded answer with citations:"#,
            context = Self::build_context(passages),
            question = question.trim()
        )
    }

    /// Build a structured-analysis prompt over a document's key passages
    pub fn build_analysis_prompt(title: &str, passages: &[RetrievedPassage]) -> String {
        format!(
            r#"You are an AI assistant specialized in regulatory compliance for financial institutions.

Analyze the following key excerpts of the regulatory document "{title}".

Organize the information into these sections:
1. Regulations mentioned
2. Regulatory agencies involved
3. Compliance requirements
4. Key dates and deadlines
5. Related regulations and relationships
6. Risk assessment areas

GROUNDING RULES:
1. ONLY use information that is explicitly stated in the EXCERPTS below
2. Write "Not stated" for a section the excerpts do not cover
3. Cite every point with the number of its excerpt in square brackets, e.g. [1] or [2, 3]

EXCERPTS:
{context}
Provide the structured analysis with citations:"#,
            title = title.trim(),
            context = Self::build_context(passages)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;
    use uuid::Uuid;

    fn passage(title: &str, text: &str, regulation: Option<&str>, jurisdiction: Option<&str>) -> RetrievedPassage {
        let document_id = Uuid::new_v4();
        RetrievedPassage {
            chunk: Chunk {
                id: Chunk::id_for(document_id, 0),
                document_id,
                sequence_index: 0,
                start_offset: 0,
                end_offset: text.chars().count(),
                text: text.to_string(),
                token_count: 1,
            },
            score: 0.9,
            document_title: title.to_string(),
            regulation_id: regulation.map(String::from),
            jurisdiction_id: jurisdiction.map(String::from),
        }
    }

    #[test]
    fn test_context_blocks_are_numbered_and_labeled() {
        let passages = vec![
            passage("Capital Rule", "Banks hold 4.5% CET1.", Some("basel-iii"), Some("eu")),
            passage("Guidance", "Firms document controls.", None, None),
        ];
        let context = PromptBuilder::build_context(&passages);

        assert!(context.contains("[1] Capital Rule (Regulation: basel-iii, Jurisdiction: eu)"));
        assert!(context.contains("[2] Guidance\n"));
        assert!(context.find("[1]").unwrap() < context.find("[2]").unwrap());
    }

    #[test]
    fn test_prompt_contains_question_and_context() {
        let passages = vec![passage("AML", "Report suspicious activity.", Some("bsa"), None)];
        let prompt = PromptBuilder::build_rag_prompt("  When must SARs be filed? ", &passages);

        assert!(prompt.starts_with("You are an AI assistant specialized in regulatory compliance"));
        assert!(prompt.contains("QUESTION: When must SARs be filed?\n"));
        assert!(prompt.contains("Report suspicious activity."));
    }

    #[test]
    fn test_analysis_prompt_lists_excerpts() {
        let passages = vec![
            passage("Reg CC", "Funds must be available by the next business day.", Some("reg-cc"), Some("us")),
            passage("Reg CC", "Exception holds require notice.", Some("reg-cc"), Some("us")),
        ];
        let prompt = PromptBuilder::build_analysis_prompt(" Funds Availability ", &passages);

        assert!(prompt.contains("regulatory document \"Funds Availability\""));
        assert!(prompt.contains("4. Key dates and deadlines"));
        assert!(prompt.contains("[2] Reg CC (Regulation: reg-cc, Jurisdiction: us)"));
        assert!(prompt.ends_with("Provide the structured analysis with citations:"));
    }
}
