//! Request validation utilities.
//!
//! These checks run before a request reaches the conversion capability or
//! the batch orchestrator. They are syntactic only.

use crate::types::{Error, Result, MAX_BATCH_ITEMS};

/// Validate that a string is not empty or whitespace.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Sanity check that input looks like markup: non-empty and containing
/// at least one `<` and one `>`. Not an HTML validator.
pub fn validate_html(html: &str) -> Result<()> {
    validate_non_empty(html, "html")?;
    if !html.contains('<') || !html.contains('>') {
        return Err(Error::validation("input is not valid HTML: no tags found"));
    }
    Ok(())
}

/// Validate input size against the configured cap.
pub fn validate_input_size(html: &str, max_bytes: usize) -> Result<()> {
    if html.len() > max_bytes {
        return Err(Error::validation(format!(
            "html is {} bytes, exceeds limit of {} bytes",
            html.len(),
            max_bytes
        )));
    }
    Ok(())
}

/// Validate batch length is in `1..=max` (and never above [`MAX_BATCH_ITEMS`]).
pub fn validate_batch_size(len: usize, max: usize) -> Result<()> {
    let max = max.min(MAX_BATCH_ITEMS);
    if len == 0 {
        return Err(Error::validation("items cannot be empty"));
    }
    if len > max {
        return Err(Error::validation(format!(
            "too many items: {} (maximum {})",
            len, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_sanity_check() {
        assert!(validate_html("<h1>Hello</h1>").is_ok());
        assert!(validate_html("a < b > c").is_ok());
        assert!(validate_html("").is_err());
        assert!(validate_html("   \n").is_err());
        assert!(validate_html("plain text").is_err());
        assert!(validate_html("<unterminated").is_err());
    }

    #[test]
    fn test_empty_message_names_field() {
        let err = validate_html("").unwrap_err();
        assert!(err.to_string().contains("html cannot be empty"));
    }

    #[test]
    fn test_input_size() {
        assert!(validate_input_size("<p>x</p>", 8).is_ok());
        assert!(validate_input_size("<p>xy</p>", 8).is_err());
    }

    #[test]
    fn test_batch_bounds() {
        assert!(validate_batch_size(0, 100).is_err());
        assert!(validate_batch_size(1, 100).is_ok());
        assert!(validate_batch_size(100, 100).is_ok());
        assert!(validate_batch_size(101, 100).is_err());
        assert!(validate_batch_size(11, 10).is_err());
        // Configured maximum cannot lift the hard ceiling.
        assert!(validate_batch_size(101, 500).is_err());
    }
}
