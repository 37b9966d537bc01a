use std::hash::{Hash, Hasher};

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

/// Whitespace-separated word count.
pub fn word_count(s: &str) -> u32 {
    s.split_whitespace().count() as u32
}

/// Lowercase URL-safe slug, capped at `max_len` bytes.
pub fn slugify(s: &str, max_len: usize) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in s.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= max_len {
            break;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Deterministic 8-hex-char digest, used to disambiguate slugged item ids.
pub fn short_hash(s: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    format!("{:08x}", hasher.finish() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "trade 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
        assert_eq!(truncate_to_char_boundary("short", 100), "short");
    }

    #[test]
    fn word_count_splits_on_whitespace() {
        assert_eq!(word_count("one  two\nthree"), 3);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn slugify_produces_url_safe_ids() {
        assert_eq!(slugify("Remarks on Trade & Tariffs!", 40), "remarks-on-trade-tariffs");
        assert_eq!(slugify("  --  ", 40), "");
    }

    #[test]
    fn short_hash_is_stable() {
        assert_eq!(short_hash("https://example.org/a"), short_hash("https://example.org/a"));
        assert_ne!(short_hash("https://example.org/a"), short_hash("https://example.org/b"));
        assert_eq!(short_hash("x").len(), 8);
    }
}
