//! Context assembly for generation prompts.

/// Join retrieved chunk texts into a single prompt-safe context string.
///
/// Chunks are joined with a single space; newlines, carriage returns and pipe characters are
/// replaced with spaces so they cannot break the prompt layout. Returns `None` when there is
/// no content, so callers never hand an empty context to the generator.
pub fn assemble_context<S: AsRef<str>>(chunks: &[S]) -> Option<String> {
    let joined = chunks
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.trim().is_empty() {
        return None;
    }
    Some(joined.replace(['\n', '\r', '|'], " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_space_and_strips_disruptive_characters() {
        let context = assemble_context(&["Name | Role\nAlice | Engineer", "Berlin\r\noffice"])
            .expect("context");
        assert_eq!(context, "Name   Role Alice   Engineer Berlin  office");
        assert!(!context.contains(['\n', '\r', '|']));
    }

    #[test]
    fn empty_input_signals_no_content() {
        let empty: [&str; 0] = [];
        assert_eq!(assemble_context(&empty), None);
        assert_eq!(assemble_context(&["", "  \n"]), None);
    }

    #[test]
    fn single_chunk_is_preserved() {
        let chunks = vec!["Alice has 5 years of experience.".to_string()];
        assert_eq!(
            assemble_context(&chunks).as_deref(),
            Some("Alice has 5 years of experience.")
        );
    }
}
