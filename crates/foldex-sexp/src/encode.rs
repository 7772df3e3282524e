//! Helpers for building expression text.

/// Appends `#t` or `#f`.
pub fn encode_bool(out: &mut String, value: bool) {
    out.push_str(if value { "#t" } else { "#f" });
}

/// Appends `value` as a quoted string literal.
pub fn encode_string(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_string_escapes() {
        let mut out = String::new();
        encode_string(&mut out, "say \"hi\"\\");
        assert_eq!(out, r#""say \"hi\"\\""#);
    }

    #[test]
    fn test_encode_bool() {
        let mut out = String::from("(not ");
        encode_bool(&mut out, false);
        out.push(')');
        assert_eq!(out, "(not #f)");
    }
}
