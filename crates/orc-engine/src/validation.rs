//! Session creation validation: title, prompt length, resource bounds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

const MIN_MAX_DURATION_SECS: u32 = 60;
const MAX_MAX_DURATION_SECS: u32 = 86_400;
const MAX_PROMPT_LEN: usize = 10_000;

const GENERIC_TITLES: &[&str] = &[
    "test session",
    "new session",
    "untitled",
    "coding task",
    "development session",
];

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError {
            field: "title".to_string(),
            message: "title must not be empty".to_string(),
        });
    }

    let lowered = title.trim().to_lowercase();
    if GENERIC_TITLES.contains(&lowered.as_str()) {
        return Err(ValidationError {
            field: "title".to_string(),
            message: format!("title '{title}' is too generic, choose something descriptive"),
        });
    }

    Ok(())
}

pub fn validate_initial_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.is_empty() {
        return Err(ValidationError {
            field: "initial_prompt".to_string(),
            message: "initial_prompt must not be empty".to_string(),
        });
    }
    if prompt.len() > MAX_PROMPT_LEN {
        return Err(ValidationError {
            field: "initial_prompt".to_string(),
            message: format!("initial_prompt exceeds maximum length of {MAX_PROMPT_LEN}"),
        });
    }
    Ok(())
}

pub fn validate_max_duration(secs: u32) -> Result<(), ValidationError> {
    if !(MIN_MAX_DURATION_SECS..=MAX_MAX_DURATION_SECS).contains(&secs) {
        return Err(ValidationError {
            field: "max_duration".to_string(),
            message: format!(
                "max_duration must be between {MIN_MAX_DURATION_SECS} and {MAX_MAX_DURATION_SECS} seconds"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_max_duration_accepted_and_rejected() {
        assert!(validate_max_duration(60).is_ok());
        assert!(validate_max_duration(59).is_err());
        assert!(validate_max_duration(86_400).is_ok());
        assert!(validate_max_duration(86_401).is_err());
    }

    #[test]
    fn boundary_prompt_length() {
        assert!(validate_initial_prompt(&"a".repeat(10_000)).is_ok());
        assert!(validate_initial_prompt(&"a".repeat(10_001)).is_err());
    }

    #[test]
    fn generic_titles_rejected_case_insensitively() {
        assert!(validate_title("Test Session").is_err());
        assert!(validate_title("UNTITLED").is_err());
        assert!(validate_title("Implement resilient auth retries").is_ok());
    }
}
