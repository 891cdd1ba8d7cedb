//! Maps free-text answers onto a closed multiple-choice option set.

use crate::error::{EvalError, Result};
use crate::matcher::find_best_match;

/// Special tokens a decoder may leave in its transcript.
const SPECIAL_TOKENS: &[&str] = &["<|endofchunk|>", "<image>", "<unk>", "<pad>", "<s>", "</s>"];

/// Score a compacted generation against the ground truth.
///
/// Both strings are resolved to their closest entry in `long_choices` and the
/// sample is correct when the two resolved indices coincide. `short_choices`
/// are not consulted.
pub fn score(
    generated_compact: &str,
    ground_truth: &str,
    _short_choices: &[String],
    long_choices: &[String],
) -> Result<bool> {
    let (_, predicted) = find_best_match(long_choices, generated_compact)?;
    let (_, expected) = find_best_match(long_choices, ground_truth)?;

    Ok(predicted == expected)
}

/// Remove decoder special tokens from a raw transcript.
pub fn clean_generation(raw: &str) -> String {
    SPECIAL_TOKENS
        .iter()
        .fold(raw.to_string(), |text, token| text.replace(token, ""))
}

/// Extract the answer that follows `delimiter` in a decoded generation.
///
/// Only the text between the first delimiter and the next one (if the model
/// kept going) is returned, trimmed.
pub fn extract_answer(raw: &str, delimiter: &str) -> Result<String> {
    let mut parts = raw.split(delimiter);
    parts.next();

    match parts.next() {
        Some(answer) => Ok(answer.trim().to_string()),
        None => Err(EvalError::MalformedGeneration(format!(
            "missing '{}' in generation: {}",
            delimiter,
            raw.trim()
        ))),
    }
}

/// The first `len` characters of an answer.
pub fn compact(answer: &str, len: usize) -> String {
    answer.chars().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_score_index_equality() {
        let short = choices(&["A", "B"]);
        let long = choices(&["Apple pie", "Banana split"]);

        assert!(score("A", "Apple pie", &short, &long).unwrap());
        assert!(score("Apple", "A", &short, &long).unwrap());
        assert!(!score("Banana", "Apple pie", &short, &long).unwrap());
    }

    #[test]
    fn test_score_empty_choices() {
        let err = score("A", "Apple", &[], &[]).unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }

    #[test]
    fn test_score_ignores_short_choice_count() {
        let long = choices(&["Apple", "Pear"]);
        assert!(score("Pear", "Pear", &choices(&["A"]), &long).unwrap());
        assert!(!score("Apple", "Pear", &choices(&["A", "B", "C"]), &long).unwrap());
    }

    #[test]
    fn test_extract_answer() {
        let raw = "Question: what is shown?\n### Answer: Pneumonia in the left lobe";
        assert_eq!(
            extract_answer(raw, "### Answer:").unwrap(),
            "Pneumonia in the left lobe"
        );
    }

    #[test]
    fn test_extract_answer_stops_at_next_delimiter() {
        let raw = "### Answer: Fracture ### Answer: Normal";
        assert_eq!(extract_answer(raw, "### Answer:").unwrap(), "Fracture");
    }

    #[test]
    fn test_extract_answer_missing_delimiter() {
        let err = extract_answer("I am not sure.", "### Answer:").unwrap_err();
        assert!(matches!(err, EvalError::MalformedGeneration(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_clean_generation() {
        let raw = "<s>Question?<image> ### Answer: Normal<|endofchunk|></s>";
        assert_eq!(clean_generation(raw), "Question? ### Answer: Normal");
    }

    #[test]
    fn test_compact_counts_chars() {
        assert_eq!(compact("Pneumonia", 6), "Pneumo");
        assert_eq!(compact("Nó", 6), "Nó");
        assert_eq!(compact("ülcérà", 3), "ülc");
    }
}
