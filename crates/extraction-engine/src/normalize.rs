//! Whitespace normalisation applied to every backend's output

/// Non-breaking and figure spaces that report generators like to emit
const SPACE_LIKE: [char; 3] = ['\u{00A0}', '\u{2007}', '\u{202F}'];

/// Replace space-like characters with plain spaces and expand tabs to four spaces
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            c if SPACE_LIKE.contains(&c) => out.push(' '),
            '\t' => out.push_str("    "),
            c => out.push(c),
        }
    }
    out
}

/// Number of characters left once surrounding whitespace is trimmed
pub fn meaningful_len(text: &str) -> usize {
    text.trim().chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_like_characters_become_spaces() {
        assert_eq!(
            normalize_text("POLICY\u{00A0}NO\u{2007}1\u{202F}2"),
            "POLICY NO 1 2"
        );
    }

    #[test]
    fn test_tabs_expand_to_four_spaces() {
        assert_eq!(normalize_text("a\tb"), "a    b");
    }

    #[test]
    fn test_meaningful_len_ignores_padding() {
        assert_eq!(meaningful_len("   \n abc \n\n"), 3);
        assert_eq!(meaningful_len("\n\t "), 0);
    }
}
