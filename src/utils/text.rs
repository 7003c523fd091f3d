pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if max_bytes == 0 {
        return String::new();
    }
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Single-line preview of backend output for log lines.
pub fn output_preview(value: &str, max_bytes: usize) -> String {
    let flattened = value.replace("\r\n", "\\n").replace('\n', "\\n");
    if flattened.len() <= max_bytes {
        return flattened;
    }
    format!("{}...", truncate_utf8_prefix(&flattened, max_bytes))
}

/// Finds `needle` in `haystack` at byte level.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
