//! Token estimation and term splitting for mixed CJK / Latin text.

/// Returns `true` for Han ideographs (unified, extension A, compatibility).
#[must_use]
pub const fn is_cjk(ch: char) -> bool {
    matches!(
        ch,
        '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{F900}'..='\u{FAFF}'
    )
}

/// Estimates the token count for a given text.
///
/// CJK ideographs cost roughly `1 / 1.3` tokens each and every other
/// character a quarter token: `floor(cjk / 1.3) + floor(other / 4)`, with a
/// floor of one token for any non-empty text.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), ch| {
        if is_cjk(ch) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });

    // floor(cjk / 1.3) computed exactly as floor(cjk * 10 / 13).
    (cjk * 10 / 13 + other / 4).max(1)
}

/// Splits text into scoring terms.
///
/// Each CJK ideograph is its own term; the remaining text is split on
/// whitespace, with ideographs acting as separators.
#[must_use]
pub fn terms(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if is_cjk(ch) || ch.is_whitespace() {
            if let Some(start) = run_start.take() {
                out.push(&text[start..idx]);
            }
            if is_cjk(ch) {
                out.push(&text[idx..idx + ch.len_utf8()]);
            }
        } else if run_start.is_none() {
            run_start = Some(idx);
        }
    }

    if let Some(start) = run_start {
        out.push(&text[start..]);
    }

    out
}
