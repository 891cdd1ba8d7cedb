//! Prompt templates for multiple-choice questions.

/// Marker that precedes the answer in a rendered question.
pub const ANSWER_DELIMITER: &str = "### Answer:";

/// Collection of prompts used to query the model.
pub struct Prompts;

impl Prompts {
    /// System prompt describing the task.
    pub fn system() -> &'static str {
        "You are a helpful medical assistant. You are given a medical image and a \
         multiple-choice question about it. Answer with the text of the single best option."
    }

    /// Render one question. The prompt ends with the answer delimiter so the
    /// model's continuation is the answer.
    pub fn question(question: &str, short_choices: &[String], long_choices: &[String]) -> String {
        let mut prompt = String::from("Question: ");
        prompt.push_str(question.trim());
        prompt.push('\n');

        for (i, long) in long_choices.iter().enumerate() {
            let label = short_choices
                .get(i)
                .cloned()
                .unwrap_or_else(|| option_label(i));
            prompt.push_str(&format!("{}: {}\n", label, long));
        }

        prompt.push_str(ANSWER_DELIMITER);
        prompt
    }
}

fn option_label(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => (index + 1).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_prompt() {
        let prompt = Prompts::question(
            "What organ is shown?",
            &["A".to_string(), "B".to_string()],
            &["Liver".to_string(), "Kidney".to_string()],
        );

        assert!(prompt.starts_with("Question: What organ is shown?\n"));
        assert!(prompt.contains("A: Liver\n"));
        assert!(prompt.contains("B: Kidney\n"));
        assert!(prompt.ends_with("### Answer:"));
    }

    #[test]
    fn test_labels_without_short_choices() {
        let prompt = Prompts::question("Q?", &[], &["Yes".to_string(), "No".to_string()]);
        assert!(prompt.contains("A: Yes\n"));
        assert!(prompt.contains("B: No\n"));
        assert_eq!(option_label(30), "31");
    }
}
