const GERMAN_CHARS: [(char, &str); 7] = [
    ('Ä', "Ae"),
    ('Ö', "Oe"),
    ('Ü', "Ue"),
    ('ä', "ae"),
    ('ö', "oe"),
    ('ü', "ue"),
    ('ß', "ss"),
];

/// Generate an ASCII-only slug: lowercase letters and digits, word-like
/// runs joined by `-`. German umlauts are transliterated, all other
/// non-ASCII characters are dropped.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if let Some((_, replacement)) = GERMAN_CHARS.iter().find(|(k, _)| *k == c) {
            out.push_str(&replacement.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii() || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        }
        // other non-ASCII characters are dropped entirely
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
