//! Byte-level decoding of MI console strings and the free-form tokenizer
//! used for evaluation/watch output.
//!
//! Console strings arrive backslash-escaped inside double quotes and may
//! carry bytes in the OS locale encoding rather than UTF-8, so decoding
//! works on raw bytes. Conversion to `String` is lossy except for source
//! paths, which go through [`bytes_to_path`].

use std::path::PathBuf;

/// Decode C-style backslash escapes into raw bytes.
///
/// Supports the single-character escapes `\\ \" \' \? \a \b \f \n \r \t \v`
/// and up to three octal digits. An unknown escape drops the backslash and
/// keeps the following character verbatim.
pub fn decode_escapes(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'\\' && i + 1 < input.len() {
            i += 1;
            match input[i] {
                b'\'' => {
                    out.push(0x27);
                    i += 1;
                }
                b'"' => {
                    out.push(0x22);
                    i += 1;
                }
                b'?' => {
                    out.push(0x3f);
                    i += 1;
                }
                b'\\' => {
                    out.push(0x5c);
                    i += 1;
                }
                b'a' => {
                    out.push(0x07);
                    i += 1;
                }
                b'b' => {
                    out.push(0x08);
                    i += 1;
                }
                b'f' => {
                    out.push(0x0c);
                    i += 1;
                }
                b'n' => {
                    out.push(0x0a);
                    i += 1;
                }
                b'r' => {
                    out.push(0x0d);
                    i += 1;
                }
                b't' => {
                    out.push(0x09);
                    i += 1;
                }
                b'v' => {
                    out.push(0x0b);
                    i += 1;
                }
                b'0'..=b'7' => {
                    let mut len = 0;
                    while len < 3
                        && i + len < input.len()
                        && (b'0'..=b'7').contains(&input[i + len])
                    {
                        len += 1;
                    }
                    let mut value: u32 = 0;
                    for d in &input[i..i + len] {
                        value = value * 8 + u32::from(d - b'0');
                    }
                    out.push(value as u8);
                    i += len;
                }
                _ => {
                    // unknown escape: drop the backslash, keep the character
                }
            }
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

/// Encode raw bytes into the escaped form [`decode_escapes`] accepts.
/// Control bytes without a single-character escape use three octal digits
/// so a digit following the escape cannot extend it.
pub fn encode_escapes(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for &b in input {
        match b {
            0x22 => out.extend_from_slice(b"\\\""),
            0x5c => out.extend_from_slice(b"\\\\"),
            0x07 => out.extend_from_slice(b"\\a"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            0x0a => out.extend_from_slice(b"\\n"),
            0x0d => out.extend_from_slice(b"\\r"),
            0x09 => out.extend_from_slice(b"\\t"),
            0x0b => out.extend_from_slice(b"\\v"),
            b if b < 0x20 || b == 0x7f => {
                out.extend_from_slice(format!("\\{:03o}", b).as_bytes())
            }
            b => out.push(b),
        }
    }
    out
}

/// Best-effort text conversion for console display.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Convert decoded path bytes into a `PathBuf`, preserving non-UTF-8 locale
/// bytes on Unix. Backslash separators are normalized to forward slashes
/// before conversion, matching the normalization applied to every source
/// path that crosses the wire.
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    let normalized: Vec<u8> = bytes
        .iter()
        .map(|&b| if b == b'\\' { b'/' } else { b })
        .collect();
    #[cfg(unix)]
    {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(OsStr::from_bytes(&normalized))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&normalized).into_owned())
    }
}

fn is_ident_char(ch: char) -> bool {
    ch == '_' || ch == '.' || ch == '+' || ch == '-' || ch.is_ascii_alphanumeric() || !ch.is_ascii()
}

/// Split free-form evaluation output into the token stream consumed by the
/// watch-tree builder.
///
/// Whitespace is discarded. Single- and double-quoted runs keep their
/// closing quote and skip over backslash escapes without interpreting them;
/// `<...>` and `(...)` runs are kept whole; identifier/number runs are
/// maximal; anything else is a single-character token.
pub fn tokenize(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut result = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == ' ' || ch == '\t' || ch == '\r' || ch == '\n' {
            i += 1;
        } else if ch == '\'' || ch == '"' {
            let quote = ch;
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == quote {
                    i += 1;
                    break;
                } else if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                i += 1;
            }
            let end = i.min(chars.len());
            result.push(chars[start..end].iter().collect());
        } else if ch == '<' {
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == '>' {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let end = i.min(chars.len());
            result.push(chars[start..end].iter().collect());
        } else if ch == '(' {
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == ')' {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let end = i.min(chars.len());
            result.push(chars[start..end].iter().collect());
        } else if is_ident_char(ch) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            result.push(chars[start..i].iter().collect());
        } else {
            result.push(ch.to_string());
            i += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_single_character_escapes() {
        assert_eq!(
            decode_escapes(br#"a\tb\nc\\d\"e"#),
            b"a\tb\nc\\d\"e".to_vec()
        );
        assert_eq!(decode_escapes(br"\a\b\f\r\v\'\?"), vec![
            0x07, 0x08, 0x0c, 0x0d, 0x0b, 0x27, 0x3f
        ]);
    }

    #[test]
    fn decode_octal_escapes() {
        assert_eq!(decode_escapes(br"\101"), b"A".to_vec());
        // greedy over at most three digits; the fourth stays literal
        assert_eq!(decode_escapes(br"\1017"), b"A7".to_vec());
        assert_eq!(decode_escapes(br"\7x"), vec![0x07, b'x']);
    }

    #[test]
    fn decode_unknown_escape_keeps_character() {
        assert_eq!(decode_escapes(br"\x41"), b"x41".to_vec());
    }

    #[test]
    fn encode_decode_round_trips_locale_bytes() {
        // includes bytes that are not valid UTF-8 (e.g. GBK-encoded path text)
        let original: Vec<u8> = vec![
            b'C', b':', 0x5c, 0xc4, 0xe3, 0xba, 0xc3, b'.', b'c', 0x09, 0x01, b'"',
        ];
        assert_eq!(decode_escapes(&encode_escapes(&original)), original);
    }

    #[test]
    fn encode_decode_round_trips_all_bytes() {
        let original: Vec<u8> = (0u8..=255).collect();
        assert_eq!(decode_escapes(&encode_escapes(&original)), original);
    }

    #[test]
    fn path_bytes_are_normalized() {
        assert_eq!(
            bytes_to_path(br"C:\src\main.c"),
            PathBuf::from("C:/src/main.c")
        );
    }

    #[test]
    fn tokenize_aggregate() {
        assert_eq!(
            tokenize("{a = 1, b = {c = 2}}"),
            vec!["{", "a", "=", "1", ",", "b", "=", "{", "c", "=", "2", "}", "}"]
        );
    }

    #[test]
    fn tokenize_quoted_runs_keep_closing_quote() {
        assert_eq!(tokenize(r#""hello world" 'a'"#), vec![
            r#""hello world""#,
            "'a'"
        ]);
        // escaped quote inside the run does not terminate it
        assert_eq!(tokenize(r#""a\"b" x"#), vec![r#""a\"b""#, "x"]);
    }

    #[test]
    fn tokenize_bracketed_runs() {
        assert_eq!(
            tokenize("<repeats 3 times> (int *) 0x1000"),
            vec!["<repeats 3 times>", "(int *)", "0x1000"]
        );
    }

    #[test]
    fn tokenize_identifier_runs_accept_non_ascii() {
        assert_eq!(tokenize("počet = -1.5e+3"), vec!["počet", "=", "-1.5e+3"]);
    }

    #[test]
    fn tokenize_unterminated_quote_is_kept() {
        assert_eq!(tokenize("\"abc"), vec!["\"abc"]);
    }
}
