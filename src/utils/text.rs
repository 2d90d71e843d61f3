/// Cuts `value` to at most `max_bytes` without splitting a UTF-8 sequence.
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
    format!("{}... [{} bytes total]", &value[..end], value.len())
}

/// Decodes captured stream bytes the way the remote side intended them,
/// replacing invalid sequences instead of failing the whole request.
pub fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
