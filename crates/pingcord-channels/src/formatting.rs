//! Content splitting for messages that exceed the platform limit.

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Splits at the last newline inside each window and drops that newline;
/// a single line longer than the limit is hard-split. Text that already
/// fits (or a zero limit) comes back as one chunk.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => byte_idx,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };

        let window = &remaining[..limit];
        let split_at = match window.rfind('\n') {
            Some(i) if i > 0 => i,
            _ => limit,
        };

        chunks.push(window[..split_at].to_string());
        remaining = &remaining[split_at..];
        remaining = remaining.strip_prefix('\n').unwrap_or(remaining);
    }

    chunks
}
