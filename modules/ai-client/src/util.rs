/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a response.
///
/// When the response wraps its payload in a fence, only the fenced body is
/// kept, even if the model added prose around it.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after_open = &trimmed[open + 3..];
    // Skip the info string (e.g. `json`) up to the end of the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let info = after_open[..body_start].trim();
    let body = if info.chars().all(|c| c.is_ascii_alphanumeric()) {
        &after_open[body_start..]
    } else {
        after_open
    };

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_truncate_within_bounds() {
        let text = "Hello";
        assert_eq!(truncate_to_char_boundary(text, 100), "Hello");
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn test_strip_code_blocks_with_surrounding_prose() {
        let response = "Hier die Analyse:\n```json\n{\"a\": 1}\n```\nViel Erfolg!";
        assert_eq!(strip_code_blocks(response), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_blocks_single_line_fence() {
        assert_eq!(strip_code_blocks("```{\"a\": 1}```"), "{\"a\": 1}");
    }
}
