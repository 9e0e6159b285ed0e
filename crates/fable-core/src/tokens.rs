/// Rough token estimate used for memory budgets.
///
/// Every CJK character counts as one token; every other maximal run of
/// non-whitespace characters counts as one token.
pub fn estimate_token_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for ch in text.chars() {
        if is_cjk(ch) {
            count += 1;
            in_word = false;
        } else if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }
    count
}

/// Token estimate for several lines treated as one block.
pub fn estimate_block_tokens<S: AsRef<str>>(lines: &[S]) -> usize {
    lines.iter().map(|l| estimate_token_count(l.as_ref())).sum()
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3000..=0x303F      // CJK symbols and punctuation
        | 0x3040..=0x30FF    // Hiragana, Katakana
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0xFF00..=0xFFEF    // Half/full-width forms
        | 0x20000..=0x2FA1F  // Extensions B and later
    )
}
