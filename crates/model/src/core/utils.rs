use std::fmt::Write;

/// Hex-encodes binary data in the PostgreSQL `bytea` escape form (`\x...`).
pub fn encode_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + 2 * bytes.len());
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Escapes the characters that would split a delimited output line: CR and
/// LF become `\r` and `\n`, and every delimiter character is prefixed with a
/// backslash (a tab becomes `\t`). Everything else, backslashes included, is
/// kept as-is.
pub fn escape_line_text(value: &str, delimiter: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => escaped.push_str(r"\n"),
            '\r' => escaped.push_str(r"\r"),
            _ => escaped.push(ch),
        }
    }
    if !delimiter.is_empty() && escaped.contains(delimiter) {
        let replacement = delimiter
            .chars()
            .map(|c| match c {
                '\t' => r"\t".to_string(),
                other => format!("\\{other}"),
            })
            .collect::<String>();
        escaped = escaped.replace(delimiter, &replacement);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bytea() {
        assert_eq!(encode_bytea(&[]), "\\x");
        assert_eq!(encode_bytea(&[0x00, 0x1f, 0xff]), "\\x001fff");
    }

    #[test]
    fn test_escape_line_text() {
        assert_eq!(escape_line_text("a\tb", "\t"), r"a\tb");
        assert_eq!(escape_line_text("x,y", ","), r"x\,y");
        assert_eq!(escape_line_text("l1\nl2", "\t"), r"l1\nl2");
        assert_eq!(escape_line_text("plain", "\t"), "plain");
        assert_eq!(escape_line_text(r"C:\pa\ss", "\t"), r"C:\pa\ss");
    }
}
