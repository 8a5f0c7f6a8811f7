//! Text normalization applied to every harvested item.

/// Collapse whitespace runs, drop raw URLs, and clip to `max_chars`.
///
/// URLs are removed as whole tokens rather than left as bare hostnames;
/// the clip counts characters, not bytes, so multi-byte text never
/// splits mid-character.
pub fn clip_text(text: &str, max_chars: usize) -> String {
    if text.is_empty() || max_chars == 0 {
        return String::new();
    }

    let collapsed = text
        .split_whitespace()
        .filter(|tok| !tok.starts_with("http://") && !tok.starts_with("https://"))
        .collect::<Vec<_>>()
        .join(" ");

    let clipped: String = collapsed.chars().take(max_chars).collect();
    clipped.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_runs() {
        assert_eq!(clip_text("a  b\t\tc\n\nd", 100), "a b c d");
    }

    #[test]
    fn test_strips_raw_urls() {
        let t = "read this https://example.com/post?id=1 carefully";
        assert_eq!(clip_text(t, 100), "read this carefully");
        let t2 = "http://a.b first";
        assert_eq!(clip_text(t2, 100), "first");
    }

    #[test]
    fn test_clips_to_char_limit() {
        let out = clip_text("abcdefghij", 4);
        assert_eq!(out, "abcd");
    }

    #[test]
    fn test_clip_counts_chars_not_bytes() {
        let out = clip_text("高考志愿填报建议", 4);
        assert_eq!(out, "高考志愿");
    }

    #[test]
    fn test_trailing_space_trimmed_after_clip() {
        // Clip lands on the separator space.
        let out = clip_text("ab cd", 3);
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clip_text("", 10), "");
        assert_eq!(clip_text("   ", 10), "");
    }
}
