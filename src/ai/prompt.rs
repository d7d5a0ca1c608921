use crate::models::SummaryLength;

pub fn build_prompt(book_name: &str, length: &SummaryLength, add_prompt: &str) -> String {
    let length_instruction = match length {
        SummaryLength::Short => "Keep it short: a single paragraph.".to_string(),
        SummaryLength::Medium => "Write a medium-length summary of three to four paragraphs.".to_string(),
        SummaryLength::Long => {
            "Write a long, detailed summary organised into sections covering the main themes, characters and arc of the book.".to_string()
        }
        SummaryLength::Other(label) => format!("Length: {label}."),
    };

    let mut prompt = format!(
        "Summarize the book \"{book_name}\". {length_instruction} Use clear, accessible language."
    );

    let add_prompt = add_prompt.trim();
    if !add_prompt.is_empty() {
        prompt.push_str("\n\nAdditional instructions: ");
        prompt.push_str(add_prompt);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_book_and_length_instruction() {
        let prompt = build_prompt("Dune", &SummaryLength::Short, "");
        assert!(prompt.contains("\"Dune\""));
        assert!(prompt.contains("single paragraph"));
        assert!(!prompt.contains("Additional instructions"));
    }

    #[test]
    fn appends_additional_instructions() {
        let prompt = build_prompt(
            "Emma",
            &SummaryLength::Other("two pages".into()),
            "  focus on the ending ",
        );
        assert!(prompt.contains("Length: two pages."));
        assert!(prompt.ends_with("Additional instructions: focus on the ending"));
    }
}
