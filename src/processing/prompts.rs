//! Prompt templates for the query and summarize flows.

/// Answer returned when the context does not contain the requested information.
pub const NOT_FOUND_ANSWER: &str = "I could not find that information.";

/// Summary returned when a document has no stored chunks.
pub const DOCUMENT_NOT_FOUND: &str = "Document not found or is empty.";

const CONTEXT_HEADER: &str = "Context:\n";
const QUESTION_HEADER: &str = "\n\nQuestion:\n";
const ANSWER_HEADER: &str = "\n\nAnswer:";
const DOCUMENT_HEADER: &str = "Document Content:\n";
const SUMMARY_HEADER: &str = "\n\nSummary:";

/// Render the question-answering prompt.
pub fn build_query_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the following question using *only* the information in the context.\n\
         Your answer must be *extremely* concise. Do not add any extra words.\n\
         If the answer is not in the context, say \"{NOT_FOUND_ANSWER}\"\n\n\
         {CONTEXT_HEADER}{context}{QUESTION_HEADER}{question}{ANSWER_HEADER}\n"
    )
}

/// Render the document summarization prompt.
pub fn build_summary_prompt(context: &str) -> String {
    format!(
        "Provide a concise, professional summary of the document below.\n\
         Focus on key skills, professional history, or main points.\n\n\
         {DOCUMENT_HEADER}{context}{SUMMARY_HEADER}\n"
    )
}

/// Context and question recovered from a prompt rendered by this module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptSections<'a> {
    /// Context or document content embedded in the prompt.
    pub context: Option<&'a str>,
    /// Question, present only for query prompts.
    pub question: Option<&'a str>,
}

impl<'a> PromptSections<'a> {
    /// Split a rendered prompt back into its sections.
    pub fn parse(prompt: &'a str) -> Self {
        if let Some(body) = section_after(prompt, CONTEXT_HEADER)
            && let Some((context, rest)) = body.split_once(QUESTION_HEADER)
        {
            let question = rest.split_once(ANSWER_HEADER).map_or(rest, |(q, _)| q);
            return Self {
                context: Some(context.trim()),
                question: Some(question.trim()),
            };
        }

        if let Some(body) = section_after(prompt, DOCUMENT_HEADER) {
            let content = body.split_once(SUMMARY_HEADER).map_or(body, |(c, _)| c);
            return Self {
                context: Some(content.trim()),
                question: None,
            };
        }

        Self::default()
    }
}

fn section_after<'a>(prompt: &'a str, header: &str) -> Option<&'a str> {
    prompt
        .find(header)
        .map(|index| &prompt[index + header.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_prompt_embeds_context_question_and_fallback() {
        let prompt = build_query_prompt("Alice has 5 years.", "How long?");
        assert!(prompt.contains("using *only* the information in the context"));
        assert!(prompt.contains("say \"I could not find that information.\""));
        assert!(prompt.contains("Context:\nAlice has 5 years."));
        assert!(prompt.contains("Question:\nHow long?"));
        assert!(prompt.trim_end().ends_with("Answer:"));
    }

    #[test]
    fn summary_prompt_embeds_document() {
        let prompt = build_summary_prompt("Backend engineer.");
        assert!(prompt.starts_with("Provide a concise, professional summary"));
        assert!(prompt.contains("Document Content:\nBackend engineer."));
        assert!(prompt.trim_end().ends_with("Summary:"));
    }

    #[test]
    fn sections_round_trip_through_query_prompt() {
        let prompt = build_query_prompt("Alpha beta.", "Gamma?");
        let sections = PromptSections::parse(&prompt);
        assert_eq!(sections.context, Some("Alpha beta."));
        assert_eq!(sections.question, Some("Gamma?"));
    }

    #[test]
    fn sections_recover_summary_content() {
        let prompt = build_summary_prompt("Alpha beta.");
        let sections = PromptSections::parse(&prompt);
        assert_eq!(sections.context, Some("Alpha beta."));
        assert_eq!(sections.question, None);
    }

    #[test]
    fn unknown_prompt_has_no_sections() {
        assert_eq!(PromptSections::parse("hello"), PromptSections::default());
    }
}
